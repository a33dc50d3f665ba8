//! A central-role Bluetooth Low Energy client built directly on BlueZ's
//! D-Bus API, without going through `bluetoothd`'s GATT-server side or any
//! of the platform-abstraction crates that sit above it.
//!
//! [`Central`] owns adapter selection, scanning and the set of known
//! [`Peripheral`]s; each `Peripheral` owns its own connection state, GATT
//! object cache and command queue. Application code is notified through
//! [`CentralCallback`] and [`PeripheralCallback`], not through traits to
//! implement, so a caller only sets the fields it cares about.

mod agent;
mod callbacks;
mod central;
mod connection;
mod dispatcher;
mod error;
mod executor;
mod filter;
mod handles;
mod macaddress;
mod model;
mod peripheral;
mod queue;
mod status;

pub use callbacks::{CentralCallback, PeripheralCallback};
pub use central::Central;
pub use connection::BusConnection;
pub use error::{BluetoothError, ErrorKind};
pub use filter::{ScanFilter, ScanOptions};
pub use macaddress::{is_valid_address, MacAddress, ParseMacAddressError};
pub use model::{
    AddressType, CharacteristicProperties, ConnectionState, GattCharacteristic, GattDescriptor,
    GattService, ParseAddressTypeError, ScanResult, WriteType, DEFAULT_RSSI,
};
pub use peripheral::Peripheral;
pub use status::GattStatus;
