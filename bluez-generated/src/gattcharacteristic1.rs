#![allow(clippy::too_many_arguments)]
use dbus::arg;
use dbus::blocking;

pub const ORG_BLUEZ_GATT_CHARACTERISTIC1_NAME: &str = "org.bluez.GattCharacteristic1";

pub trait OrgBluezGattCharacteristic1 {
    fn read_value(
        &self,
        options: ::std::collections::HashMap<&str, arg::Variant<Box<dyn arg::RefArg>>>,
    ) -> Result<Vec<u8>, dbus::Error>;
    fn write_value(
        &self,
        value: Vec<u8>,
        options: ::std::collections::HashMap<&str, arg::Variant<Box<dyn arg::RefArg>>>,
    ) -> Result<(), dbus::Error>;
    fn start_notify(&self) -> Result<(), dbus::Error>;
    fn stop_notify(&self) -> Result<(), dbus::Error>;

    fn uuid(&self) -> Result<String, dbus::Error>;
    fn service(&self) -> Result<dbus::Path<'static>, dbus::Error>;
    fn value(&self) -> Result<Vec<u8>, dbus::Error>;
    fn notifying(&self) -> Result<bool, dbus::Error>;
    fn flags(&self) -> Result<Vec<String>, dbus::Error>;
}

impl<'a, T: blocking::BlockingSender, C: ::std::ops::Deref<Target = T>>
    OrgBluezGattCharacteristic1 for blocking::Proxy<'a, C>
{
    fn read_value(
        &self,
        options: ::std::collections::HashMap<&str, arg::Variant<Box<dyn arg::RefArg>>>,
    ) -> Result<Vec<u8>, dbus::Error> {
        self.method_call(ORG_BLUEZ_GATT_CHARACTERISTIC1_NAME, "ReadValue", (options,))
    }

    fn write_value(
        &self,
        value: Vec<u8>,
        options: ::std::collections::HashMap<&str, arg::Variant<Box<dyn arg::RefArg>>>,
    ) -> Result<(), dbus::Error> {
        self.method_call(
            ORG_BLUEZ_GATT_CHARACTERISTIC1_NAME,
            "WriteValue",
            (value, options),
        )
    }

    fn start_notify(&self) -> Result<(), dbus::Error> {
        self.method_call(ORG_BLUEZ_GATT_CHARACTERISTIC1_NAME, "StartNotify", ())
    }

    fn stop_notify(&self) -> Result<(), dbus::Error> {
        self.method_call(ORG_BLUEZ_GATT_CHARACTERISTIC1_NAME, "StopNotify", ())
    }

    fn uuid(&self) -> Result<String, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_GATT_CHARACTERISTIC1_NAME, "UUID")
    }

    fn service(&self) -> Result<dbus::Path<'static>, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_GATT_CHARACTERISTIC1_NAME, "Service")
    }

    fn value(&self) -> Result<Vec<u8>, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_GATT_CHARACTERISTIC1_NAME, "Value")
    }

    fn notifying(&self) -> Result<bool, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_GATT_CHARACTERISTIC1_NAME, "Notifying")
    }

    fn flags(&self) -> Result<Vec<String>, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_GATT_CHARACTERISTIC1_NAME, "Flags")
    }
}

/// Typed view over `org.bluez.GattCharacteristic1` properties from `GetManagedObjects`.
pub struct OrgBluezGattCharacteristic1Properties<'a>(pub &'a arg::PropMap);

impl<'a> OrgBluezGattCharacteristic1Properties<'a> {
    pub fn from_interfaces(
        interfaces: &'a ::std::collections::HashMap<String, arg::PropMap>,
    ) -> Option<Self> {
        Some(Self(interfaces.get(ORG_BLUEZ_GATT_CHARACTERISTIC1_NAME)?))
    }

    pub fn uuid(&self) -> Option<&String> {
        arg::prop_cast(self.0, "UUID")
    }

    pub fn service(&self) -> Option<&dbus::Path<'static>> {
        arg::prop_cast(self.0, "Service")
    }

    pub fn notifying(&self) -> Option<bool> {
        arg::prop_cast(self.0, "Notifying").copied()
    }

    pub fn flags(&self) -> Option<&Vec<String>> {
        arg::prop_cast(self.0, "Flags")
    }

    pub fn value(&self) -> Option<&Vec<u8>> {
        arg::prop_cast(self.0, "Value")
    }
}
