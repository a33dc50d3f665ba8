use crate::macaddress::MacAddress;
use crate::model::{GattCharacteristic, ScanResult};
use crate::status::GattStatus;
use std::sync::Arc;

/// Application callbacks for central-level events (§6, §9 "deep callback
/// interfaces" note). Each field is an independently optional closure rather
/// than a method on an inheritance-based interface; a central that doesn't
/// care about a given event simply leaves the field unset.
#[derive(Clone, Default)]
pub struct CentralCallback {
    pub on_connected_peripheral: Option<Arc<dyn Fn(MacAddress) + Send + Sync>>,
    pub on_connection_failed: Option<Arc<dyn Fn(MacAddress, GattStatus) + Send + Sync>>,
    pub on_disconnected_peripheral: Option<Arc<dyn Fn(MacAddress, GattStatus) + Send + Sync>>,
    pub on_discovered_peripheral: Option<Arc<dyn Fn(MacAddress, ScanResult) + Send + Sync>>,
    pub on_scan_started: Option<Arc<dyn Fn() + Send + Sync>>,
    pub on_scan_stopped: Option<Arc<dyn Fn() + Send + Sync>>,
    pub on_scan_failed: Option<Arc<dyn Fn(i32) + Send + Sync>>,
    pub on_pin_request: Option<Arc<dyn Fn(MacAddress) -> String + Send + Sync>>,
}

/// Application callbacks for peripheral-level events (§6).
#[derive(Clone, Default)]
pub struct PeripheralCallback {
    pub on_services_discovered: Option<Arc<dyn Fn(MacAddress) + Send + Sync>>,
    pub on_notification_state_update:
        Option<Arc<dyn Fn(MacAddress, GattCharacteristic, GattStatus) + Send + Sync>>,
    pub on_characteristic_update:
        Option<Arc<dyn Fn(MacAddress, Vec<u8>, GattCharacteristic, GattStatus) + Send + Sync>>,
    pub on_characteristic_write:
        Option<Arc<dyn Fn(MacAddress, Vec<u8>, GattCharacteristic, GattStatus) + Send + Sync>>,
    pub on_descriptor_read: Option<Arc<dyn Fn(MacAddress, Vec<u8>, GattStatus) + Send + Sync>>,
    pub on_descriptor_write: Option<Arc<dyn Fn(MacAddress, GattStatus) + Send + Sync>>,
    pub on_bonding_started: Option<Arc<dyn Fn(MacAddress) + Send + Sync>>,
    pub on_bonding_succeeded: Option<Arc<dyn Fn(MacAddress) + Send + Sync>>,
    pub on_bonding_failed: Option<Arc<dyn Fn(MacAddress) + Send + Sync>>,
    pub on_bond_lost: Option<Arc<dyn Fn(MacAddress) + Send + Sync>>,
    pub on_read_remote_rssi: Option<Arc<dyn Fn(MacAddress, i16, GattStatus) + Send + Sync>>,
}
