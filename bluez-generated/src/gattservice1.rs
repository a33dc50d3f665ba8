use dbus::arg;
use dbus::blocking;

pub const ORG_BLUEZ_GATT_SERVICE1_NAME: &str = "org.bluez.GattService1";

pub trait OrgBluezGattService1 {
    fn uuid(&self) -> Result<String, dbus::Error>;
    fn device(&self) -> Result<dbus::Path<'static>, dbus::Error>;
    fn primary(&self) -> Result<bool, dbus::Error>;
}

impl<'a, T: blocking::BlockingSender, C: ::std::ops::Deref<Target = T>> OrgBluezGattService1
    for blocking::Proxy<'a, C>
{
    fn uuid(&self) -> Result<String, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_GATT_SERVICE1_NAME, "UUID")
    }

    fn device(&self) -> Result<dbus::Path<'static>, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_GATT_SERVICE1_NAME, "Device")
    }

    fn primary(&self) -> Result<bool, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_GATT_SERVICE1_NAME, "Primary")
    }
}

/// Typed view over `org.bluez.GattService1` properties from `GetManagedObjects`.
pub struct OrgBluezGattService1Properties<'a>(pub &'a arg::PropMap);

impl<'a> OrgBluezGattService1Properties<'a> {
    pub fn from_interfaces(
        interfaces: &'a ::std::collections::HashMap<String, arg::PropMap>,
    ) -> Option<Self> {
        Some(Self(interfaces.get(ORG_BLUEZ_GATT_SERVICE1_NAME)?))
    }

    pub fn uuid(&self) -> Option<&String> {
        arg::prop_cast(self.0, "UUID")
    }

    pub fn device(&self) -> Option<&dbus::Path<'static>> {
        arg::prop_cast(self.0, "Device")
    }

    pub fn primary(&self) -> Option<bool> {
        arg::prop_cast(self.0, "Primary").copied()
    }
}
