#![allow(clippy::too_many_arguments)]
use dbus::arg;
use dbus::blocking;

pub const ORG_BLUEZ_GATT_DESCRIPTOR1_NAME: &str = "org.bluez.GattDescriptor1";

pub trait OrgBluezGattDescriptor1 {
    fn read_value(
        &self,
        options: ::std::collections::HashMap<&str, arg::Variant<Box<dyn arg::RefArg>>>,
    ) -> Result<Vec<u8>, dbus::Error>;
    fn write_value(
        &self,
        value: Vec<u8>,
        options: ::std::collections::HashMap<&str, arg::Variant<Box<dyn arg::RefArg>>>,
    ) -> Result<(), dbus::Error>;

    fn uuid(&self) -> Result<String, dbus::Error>;
    fn characteristic(&self) -> Result<dbus::Path<'static>, dbus::Error>;
    fn value(&self) -> Result<Vec<u8>, dbus::Error>;
    fn flags(&self) -> Result<Vec<String>, dbus::Error>;
}

impl<'a, T: blocking::BlockingSender, C: ::std::ops::Deref<Target = T>> OrgBluezGattDescriptor1
    for blocking::Proxy<'a, C>
{
    fn read_value(
        &self,
        options: ::std::collections::HashMap<&str, arg::Variant<Box<dyn arg::RefArg>>>,
    ) -> Result<Vec<u8>, dbus::Error> {
        self.method_call(ORG_BLUEZ_GATT_DESCRIPTOR1_NAME, "ReadValue", (options,))
    }

    fn write_value(
        &self,
        value: Vec<u8>,
        options: ::std::collections::HashMap<&str, arg::Variant<Box<dyn arg::RefArg>>>,
    ) -> Result<(), dbus::Error> {
        self.method_call(
            ORG_BLUEZ_GATT_DESCRIPTOR1_NAME,
            "WriteValue",
            (value, options),
        )
    }

    fn uuid(&self) -> Result<String, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_GATT_DESCRIPTOR1_NAME, "UUID")
    }

    fn characteristic(&self) -> Result<dbus::Path<'static>, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_GATT_DESCRIPTOR1_NAME, "Characteristic")
    }

    fn value(&self) -> Result<Vec<u8>, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_GATT_DESCRIPTOR1_NAME, "Value")
    }

    fn flags(&self) -> Result<Vec<String>, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_GATT_DESCRIPTOR1_NAME, "Flags")
    }
}

/// Typed view over `org.bluez.GattDescriptor1` properties from `GetManagedObjects`.
pub struct OrgBluezGattDescriptor1Properties<'a>(pub &'a arg::PropMap);

impl<'a> OrgBluezGattDescriptor1Properties<'a> {
    pub fn from_interfaces(
        interfaces: &'a ::std::collections::HashMap<String, arg::PropMap>,
    ) -> Option<Self> {
        Some(Self(interfaces.get(ORG_BLUEZ_GATT_DESCRIPTOR1_NAME)?))
    }

    pub fn uuid(&self) -> Option<&String> {
        arg::prop_cast(self.0, "UUID")
    }

    pub fn characteristic(&self) -> Option<&dbus::Path<'static>> {
        arg::prop_cast(self.0, "Characteristic")
    }

    pub fn value(&self) -> Option<&Vec<u8>> {
        arg::prop_cast(self.0, "Value")
    }
}
