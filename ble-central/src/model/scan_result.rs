use crate::macaddress::MacAddress;
use crate::model::AddressType;
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

/// Per-address advertisement record produced by the scan engine (§3).
///
/// `name` and `service_uuids` are fixed at creation time; `rssi`,
/// `manufacturer_data` and `service_data` are updated in place as further
/// advertisements for the same address arrive. There is at most one live
/// `ScanResult` per address, dropped when a new discovery cycle starts.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanResult {
    pub name: Option<String>,
    pub address: MacAddress,
    pub address_type: Option<AddressType>,
    pub service_uuids: Vec<Uuid>,
    pub rssi: i16,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    pub service_data: HashMap<Uuid, Vec<u8>>,
    pub timestamp: Instant,
}

/// Default RSSI reported when the daemon omits it on `InterfacesAdded`.
pub const DEFAULT_RSSI: i16 = -100;

impl ScanResult {
    pub fn new(address: MacAddress, name: Option<String>, service_uuids: Vec<Uuid>) -> Self {
        ScanResult {
            name,
            address,
            address_type: None,
            service_uuids,
            rssi: DEFAULT_RSSI,
            manufacturer_data: HashMap::new(),
            service_data: HashMap::new(),
            timestamp: Instant::now(),
        }
    }

    /// Merges the mutable fields (`rssi`, `manufacturer_data`, `service_data`)
    /// from a later `PropertiesChanged` payload. `name` and `service_uuids`
    /// are never touched after creation (§3).
    pub fn merge_update(
        &mut self,
        rssi: Option<i16>,
        manufacturer_data: Option<HashMap<u16, Vec<u8>>>,
        service_data: Option<HashMap<Uuid, Vec<u8>>>,
    ) {
        if let Some(rssi) = rssi {
            self.rssi = rssi;
        }
        if let Some(manufacturer_data) = manufacturer_data {
            self.manufacturer_data.extend(manufacturer_data);
        }
        if let Some(service_data) = service_data {
            self.service_data.extend(service_data);
        }
        self.timestamp = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn merge_update_overwrites_only_mutable_fields() {
        let address = MacAddress::from_str("00:43:A8:23:10:F0").unwrap();
        let mut result = ScanResult::new(address, Some("Beurer BM57".to_string()), vec![]);
        result.rssi = -60;

        let mut manufacturer_data = HashMap::new();
        manufacturer_data.insert(41u16, vec![0x10, 0x20]);
        result.merge_update(Some(-50), Some(manufacturer_data.clone()), None);

        assert_eq!(result.rssi, -50);
        assert_eq!(result.manufacturer_data, manufacturer_data);
        assert_eq!(result.name.as_deref(), Some("Beurer BM57"));
    }
}
