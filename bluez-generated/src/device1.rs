#![allow(clippy::too_many_arguments)]
use dbus::arg;
use dbus::blocking;
use std::collections::HashMap;

pub const ORG_BLUEZ_DEVICE1_NAME: &str = "org.bluez.Device1";

pub trait OrgBluezDevice1 {
    fn connect(&self) -> Result<(), dbus::Error>;
    fn disconnect(&self) -> Result<(), dbus::Error>;
    fn pair(&self) -> Result<(), dbus::Error>;
    fn cancel_pairing(&self) -> Result<(), dbus::Error>;

    fn address(&self) -> Result<String, dbus::Error>;
    fn address_type(&self) -> Result<String, dbus::Error>;
    fn name(&self) -> Result<String, dbus::Error>;
    fn appearance(&self) -> Result<u16, dbus::Error>;
    fn uuids(&self) -> Result<Vec<String>, dbus::Error>;
    fn paired(&self) -> Result<bool, dbus::Error>;
    fn connected(&self) -> Result<bool, dbus::Error>;
    fn trusted(&self) -> Result<bool, dbus::Error>;
    fn adapter(&self) -> Result<dbus::Path<'static>, dbus::Error>;
    fn services_resolved(&self) -> Result<bool, dbus::Error>;
    fn rssi(&self) -> Result<i16, dbus::Error>;
    fn tx_power(&self) -> Result<i16, dbus::Error>;
    fn manufacturer_data(&self) -> Result<HashMap<u16, arg::Variant<Box<dyn arg::RefArg>>>, dbus::Error>;
    fn service_data(&self) -> Result<arg::PropMap, dbus::Error>;
}

impl<'a, T: blocking::BlockingSender, C: ::std::ops::Deref<Target = T>> OrgBluezDevice1
    for blocking::Proxy<'a, C>
{
    fn connect(&self) -> Result<(), dbus::Error> {
        self.method_call(ORG_BLUEZ_DEVICE1_NAME, "Connect", ())
    }

    fn disconnect(&self) -> Result<(), dbus::Error> {
        self.method_call(ORG_BLUEZ_DEVICE1_NAME, "Disconnect", ())
    }

    fn pair(&self) -> Result<(), dbus::Error> {
        self.method_call(ORG_BLUEZ_DEVICE1_NAME, "Pair", ())
    }

    fn cancel_pairing(&self) -> Result<(), dbus::Error> {
        self.method_call(ORG_BLUEZ_DEVICE1_NAME, "CancelPairing", ())
    }

    fn address(&self) -> Result<String, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_DEVICE1_NAME, "Address")
    }

    fn address_type(&self) -> Result<String, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_DEVICE1_NAME, "AddressType")
    }

    fn name(&self) -> Result<String, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_DEVICE1_NAME, "Name")
    }

    fn appearance(&self) -> Result<u16, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_DEVICE1_NAME, "Appearance")
    }

    fn uuids(&self) -> Result<Vec<String>, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_DEVICE1_NAME, "UUIDs")
    }

    fn paired(&self) -> Result<bool, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_DEVICE1_NAME, "Paired")
    }

    fn connected(&self) -> Result<bool, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_DEVICE1_NAME, "Connected")
    }

    fn trusted(&self) -> Result<bool, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_DEVICE1_NAME, "Trusted")
    }

    fn adapter(&self) -> Result<dbus::Path<'static>, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_DEVICE1_NAME, "Adapter")
    }

    fn services_resolved(&self) -> Result<bool, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_DEVICE1_NAME, "ServicesResolved")
    }

    fn rssi(&self) -> Result<i16, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_DEVICE1_NAME, "RSSI")
    }

    fn tx_power(&self) -> Result<i16, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_DEVICE1_NAME, "TxPower")
    }

    fn manufacturer_data(
        &self,
    ) -> Result<HashMap<u16, arg::Variant<Box<dyn arg::RefArg>>>, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_DEVICE1_NAME, "ManufacturerData")
    }

    fn service_data(&self) -> Result<arg::PropMap, dbus::Error> {
        use dbus::blocking::stdintf::org_freedesktop_dbus::Properties;
        self.get(ORG_BLUEZ_DEVICE1_NAME, "ServiceData")
    }
}

/// Typed view over `org.bluez.Device1` properties as returned by `GetManagedObjects`
/// or a `PropertiesChanged` payload.
pub struct OrgBluezDevice1Properties<'a>(pub &'a arg::PropMap);

impl<'a> OrgBluezDevice1Properties<'a> {
    pub fn from_interfaces(
        interfaces: &'a HashMap<String, arg::PropMap>,
    ) -> Option<Self> {
        Some(Self(interfaces.get(ORG_BLUEZ_DEVICE1_NAME)?))
    }

    pub fn address(&self) -> Option<&String> {
        arg::prop_cast(self.0, "Address")
    }

    pub fn address_type(&self) -> Option<&String> {
        arg::prop_cast(self.0, "AddressType")
    }

    pub fn name(&self) -> Option<&String> {
        arg::prop_cast(self.0, "Name")
    }

    pub fn uuids(&self) -> Option<&Vec<String>> {
        arg::prop_cast(self.0, "UUIDs")
    }

    pub fn paired(&self) -> Option<bool> {
        arg::prop_cast(self.0, "Paired").copied()
    }

    pub fn connected(&self) -> Option<bool> {
        arg::prop_cast(self.0, "Connected").copied()
    }

    pub fn services_resolved(&self) -> Option<bool> {
        arg::prop_cast(self.0, "ServicesResolved").copied()
    }

    pub fn rssi(&self) -> Option<i16> {
        arg::prop_cast(self.0, "RSSI").copied()
    }

    pub fn manufacturer_data(&self) -> Option<&HashMap<u16, arg::Variant<Box<dyn arg::RefArg>>>> {
        arg::prop_cast(self.0, "ManufacturerData")
    }

    pub fn service_data(&self) -> Option<&arg::PropMap> {
        arg::prop_cast(self.0, "ServiceData")
    }
}
