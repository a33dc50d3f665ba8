//! Hand-maintained, generated-style D-Bus bindings for the subset of BlueZ's
//! object tree a GATT central needs: adapters, devices, GATT services,
//! characteristics, descriptors, and the agent manager used for pairing.
//!
//! Each module follows the shape `dbus-codegen-rust --methodtype=sync` would
//! produce from BlueZ's own introspection XML, built against
//! `dbus::blocking::Proxy` rather than the daemon's autogenerated async
//! bindings, since nothing above this crate is allowed to be asynchronous.

pub mod adapter1;
pub mod agentmanager1;
pub mod device1;
pub mod gattcharacteristic1;
pub mod gattdescriptor1;
pub mod gattservice1;

pub use adapter1::{OrgBluezAdapter1, OrgBluezAdapter1Properties, ORG_BLUEZ_ADAPTER1_NAME};
pub use agentmanager1::{OrgBluezAgentManager1, ORG_BLUEZ_AGENT_MANAGER1_NAME};
pub use device1::{OrgBluezDevice1, OrgBluezDevice1Properties, ORG_BLUEZ_DEVICE1_NAME};
pub use gattcharacteristic1::{
    OrgBluezGattCharacteristic1, OrgBluezGattCharacteristic1Properties,
    ORG_BLUEZ_GATT_CHARACTERISTIC1_NAME,
};
pub use gattdescriptor1::{
    OrgBluezGattDescriptor1, OrgBluezGattDescriptor1Properties, ORG_BLUEZ_GATT_DESCRIPTOR1_NAME,
};
pub use gattservice1::{
    OrgBluezGattService1, OrgBluezGattService1Properties, ORG_BLUEZ_GATT_SERVICE1_NAME,
};

/// Well-known bus name and root object path of the BlueZ daemon.
pub const BLUEZ_SERVICE_NAME: &str = "org.bluez";
pub const BLUEZ_ROOT_PATH: &str = "/org/bluez";
