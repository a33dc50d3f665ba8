//! The C3 bus interface adapter layer: one thin handle per BlueZ object
//! kind, each wrapping a proxy and the object's path. These narrow the
//! `bluez-generated` trait surface down to what `Central`/`Peripheral`
//! actually call, and translate `dbus::Error` into `BluetoothError` at the
//! boundary so nothing upstream of this module has to know about raw
//! D-Bus error names.

use crate::connection::BusConnection;
use crate::error::BluetoothError;
use bluez_generated::{
    OrgBluezAdapter1, OrgBluezDevice1, OrgBluezGattCharacteristic1, OrgBluezGattDescriptor1,
};
use dbus::arg::{PropMap, RefArg, Variant};
use dbus::Path;
use std::collections::HashMap;
use std::sync::Arc;

type WriteOptions<'a> = HashMap<&'a str, Variant<Box<dyn RefArg>>>;

pub(crate) struct AdapterHandle {
    bus: Arc<BusConnection>,
    path: Path<'static>,
}

impl AdapterHandle {
    pub(crate) fn new(bus: Arc<BusConnection>, path: Path<'static>) -> Self {
        AdapterHandle { bus, path }
    }

    pub(crate) fn path(&self) -> &Path<'static> {
        &self.path
    }

    pub(crate) fn start_discovery(&self) -> Result<(), BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).start_discovery()?)
    }

    pub(crate) fn stop_discovery(&self) -> Result<(), BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).stop_discovery()?)
    }

    pub(crate) fn set_discovery_filter(&self, properties: WriteOptions) -> Result<(), BluetoothError> {
        Ok(self
            .bus
            .proxy(self.path.clone())
            .set_discovery_filter(properties)?)
    }

    pub(crate) fn remove_device(&self, device: Path<'static>) -> Result<(), BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).remove_device(device)?)
    }

    pub(crate) fn powered(&self) -> Result<bool, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).powered()?)
    }

    pub(crate) fn set_powered(&self, value: bool) -> Result<(), BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).set_powered(value)?)
    }

    pub(crate) fn discovering(&self) -> Result<bool, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).discovering()?)
    }

    #[allow(dead_code)]
    pub(crate) fn address(&self) -> Result<String, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).address()?)
    }
}

pub(crate) struct DeviceHandle {
    bus: Arc<BusConnection>,
    path: Path<'static>,
}

impl DeviceHandle {
    pub(crate) fn new(bus: Arc<BusConnection>, path: Path<'static>) -> Self {
        DeviceHandle { bus, path }
    }

    #[allow(dead_code)]
    pub(crate) fn path(&self) -> &Path<'static> {
        &self.path
    }

    pub(crate) fn connect(&self) -> Result<(), BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).connect()?)
    }

    pub(crate) fn disconnect(&self) -> Result<(), BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).disconnect()?)
    }

    pub(crate) fn pair(&self) -> Result<(), BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).pair()?)
    }

    #[allow(dead_code)]
    pub(crate) fn address(&self) -> Result<String, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).address()?)
    }

    pub(crate) fn name(&self) -> Result<String, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).name()?)
    }

    pub(crate) fn rssi(&self) -> Result<i16, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).rssi()?)
    }

    pub(crate) fn manufacturer_data(
        &self,
    ) -> Result<HashMap<u16, Variant<Box<dyn RefArg>>>, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).manufacturer_data()?)
    }

    pub(crate) fn service_data(&self) -> Result<PropMap, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).service_data()?)
    }

    pub(crate) fn uuids(&self) -> Result<Vec<String>, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).uuids()?)
    }

    pub(crate) fn address_type(&self) -> Result<String, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).address_type()?)
    }

    #[allow(dead_code)]
    pub(crate) fn connected(&self) -> Result<bool, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).connected()?)
    }

    pub(crate) fn services_resolved(&self) -> Result<bool, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).services_resolved()?)
    }

    pub(crate) fn paired(&self) -> Result<bool, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).paired()?)
    }
}

pub(crate) struct CharacteristicHandle {
    bus: Arc<BusConnection>,
    path: Path<'static>,
}

impl CharacteristicHandle {
    pub(crate) fn new(bus: Arc<BusConnection>, path: Path<'static>) -> Self {
        CharacteristicHandle { bus, path }
    }

    #[allow(dead_code)]
    pub(crate) fn path(&self) -> &Path<'static> {
        &self.path
    }

    pub(crate) fn read_value(&self, options: WriteOptions) -> Result<Vec<u8>, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).read_value(options)?)
    }

    pub(crate) fn write_value(
        &self,
        value: Vec<u8>,
        options: WriteOptions,
    ) -> Result<(), BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).write_value(value, options)?)
    }

    pub(crate) fn start_notify(&self) -> Result<(), BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).start_notify()?)
    }

    pub(crate) fn stop_notify(&self) -> Result<(), BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).stop_notify()?)
    }

    pub(crate) fn uuid(&self) -> Result<String, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).uuid()?)
    }

    pub(crate) fn flags(&self) -> Result<Vec<String>, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).flags()?)
    }

    #[allow(dead_code)]
    pub(crate) fn notifying(&self) -> Result<bool, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).notifying()?)
    }
}

pub(crate) struct DescriptorHandle {
    bus: Arc<BusConnection>,
    path: Path<'static>,
}

impl DescriptorHandle {
    pub(crate) fn new(bus: Arc<BusConnection>, path: Path<'static>) -> Self {
        DescriptorHandle { bus, path }
    }

    pub(crate) fn uuid(&self) -> Result<String, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).uuid()?)
    }

    pub(crate) fn read_value(&self, options: WriteOptions) -> Result<Vec<u8>, BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).read_value(options)?)
    }

    pub(crate) fn write_value(
        &self,
        value: Vec<u8>,
        options: WriteOptions,
    ) -> Result<(), BluetoothError> {
        Ok(self.bus.proxy(self.path.clone()).write_value(value, options)?)
    }
}

