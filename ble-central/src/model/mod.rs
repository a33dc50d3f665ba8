mod address_type;
mod connection_state;
mod gatt;
mod scan_result;

pub use address_type::{AddressType, ParseAddressTypeError};
pub use connection_state::ConnectionState;
pub use gatt::{
    CharacteristicProperties, GattCharacteristic, GattDescriptor, GattService, WriteType,
};
pub use scan_result::{ScanResult, DEFAULT_RSSI};
