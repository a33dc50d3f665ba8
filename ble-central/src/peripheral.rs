use crate::agent::PairingAgent;
use crate::agent::PairingSink;
use crate::callbacks::{CentralCallback, PeripheralCallback};
use crate::central::Central;
use crate::connection::BusConnection;
use crate::dispatcher::{PeripheralSignalSink, SignalDispatcher};
use crate::error::ErrorKind;
use crate::executor::{ScheduledExecutor, TaskHandle};
use crate::handles::{AdapterHandle, CharacteristicHandle, DescriptorHandle, DeviceHandle};
use crate::macaddress::MacAddress;
use crate::model::{
    AddressType, CharacteristicProperties, ConnectionState, GattCharacteristic, GattDescriptor,
    GattService, WriteType,
};
use crate::queue::CommandQueue;
use crate::status::GattStatus;
use bluez_generated::{
    OrgBluezDevice1Properties, OrgBluezGattCharacteristic1Properties,
    OrgBluezGattDescriptor1Properties, OrgBluezGattService1Properties,
};
use dbus::arg::PropMap;
use dbus::Path;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use uuid::Uuid;

const SERVICE_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// The Peripheral controller (C9): one instance per connected-or-connecting
/// device, owning its own command queue (§4.2), its GATT object cache
/// (§4.10), and its connection/bonding state machine (§4.8, §4.11).
pub struct Peripheral {
    address: MacAddress,
    device_path: Path<'static>,
    adapter_path: Path<'static>,
    bus: Arc<BusConnection>,
    dispatcher: Arc<SignalDispatcher>,
    agent: Arc<PairingAgent>,
    command_queue: Arc<CommandQueue>,
    timeout_executor: Arc<ScheduledExecutor>,
    discovery_timeout: Mutex<Option<TaskHandle>>,
    state: Mutex<ConnectionState>,
    services: Mutex<Vec<GattService>>,
    notify_pending: Mutex<bool>,
    notifying: Mutex<HashSet<Path<'static>>>,
    name: Mutex<Option<String>>,
    address_type: Mutex<Option<AddressType>>,
    bonded: Mutex<bool>,
    last_connect_at: Mutex<Option<Instant>>,
    manufacturer_data: Mutex<HashMap<u16, Vec<u8>>>,
    service_data: Mutex<HashMap<Uuid, Vec<u8>>>,
    callback: Mutex<PeripheralCallback>,
    central_callback: Mutex<CentralCallback>,
    central: Weak<Central>,
    self_weak: Mutex<Weak<Peripheral>>,
}

impl Peripheral {
    pub(crate) fn new(
        address: MacAddress,
        adapter_path: Path<'static>,
        bus: Arc<BusConnection>,
        dispatcher: Arc<SignalDispatcher>,
        agent: Arc<PairingAgent>,
        central: Weak<Central>,
        callback: PeripheralCallback,
        central_callback: CentralCallback,
    ) -> Arc<Peripheral> {
        let device_path = Path::from(format!(
            "{}/{}",
            adapter_path,
            address.to_path_segment()
        ));
        let executor = Arc::new(ScheduledExecutor::new(format!("peripheral-{}", address)));
        let command_queue = Arc::new(CommandQueue::new(address.to_string(), executor));
        let timeout_executor = Arc::new(ScheduledExecutor::new(format!(
            "peripheral-{}-timeouts",
            address
        )));

        let peripheral = Arc::new(Peripheral {
            address: address.clone(),
            device_path,
            adapter_path,
            bus,
            dispatcher: dispatcher.clone(),
            agent: agent.clone(),
            command_queue,
            timeout_executor,
            discovery_timeout: Mutex::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
            services: Mutex::new(Vec::new()),
            notify_pending: Mutex::new(false),
            notifying: Mutex::new(HashSet::new()),
            name: Mutex::new(None),
            address_type: Mutex::new(None),
            bonded: Mutex::new(false),
            last_connect_at: Mutex::new(None),
            manufacturer_data: Mutex::new(HashMap::new()),
            service_data: Mutex::new(HashMap::new()),
            callback: Mutex::new(callback),
            central_callback: Mutex::new(central_callback),
            central,
            self_weak: Mutex::new(Weak::new()),
        });
        *peripheral.self_weak.lock().unwrap() = Arc::downgrade(&peripheral);

        // The dispatcher matches by substring against the raw bus path
        // (`dev_XX_XX_..`), not the colon-separated display form (§4.3).
        let signal_sink: Weak<dyn PeripheralSignalSink> = Arc::downgrade(&peripheral);
        dispatcher.register_peripheral(address.to_path_segment(), signal_sink);
        let pairing_sink: Weak<dyn PairingSink> = Arc::downgrade(&peripheral);
        agent.register_peripheral(address.to_string(), pairing_sink);

        peripheral
    }

    fn this(&self) -> Arc<Peripheral> {
        self.self_weak
            .lock()
            .unwrap()
            .upgrade()
            .expect("Peripheral outlives its own weak reference")
    }

    /// Continuous rescan must persist across (dis)connects (§4.5): every
    /// connect, disconnect, or connect-failure event on this peripheral
    /// gives the central a chance to resume a scan it was running for other
    /// peripherals or reconnect targets.
    fn notify_central_scan_restart(&self) {
        if let Some(central) = self.central.upgrade() {
            central.restart_scan_if_needed();
        }
    }

    pub fn address(&self) -> &MacAddress {
        &self.address
    }

    /// Alias for [`Peripheral::address`] matching §6's `get_address`.
    pub fn get_address(&self) -> &MacAddress {
        &self.address
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    /// Alias for [`Peripheral::state`] matching §6's `get_state`.
    pub fn get_state(&self) -> ConnectionState {
        self.state()
    }

    /// The device's advertised name, refreshed whenever a `Name` property
    /// update arrives while connected (§6 `get_name`).
    pub fn get_name(&self) -> Option<String> {
        self.name.lock().unwrap().clone()
    }

    /// Whether the device is currently bonded, tracked off the daemon's
    /// `Paired` property (§6 `is_paired`).
    pub fn is_paired(&self) -> bool {
        *self.bonded.lock().unwrap()
    }

    /// Whether `characteristic` currently has notifications/indications
    /// enabled, tracked off `Notifying` property changes (§6 `is_notifying`).
    pub fn is_notifying(&self, characteristic_uuid: Uuid) -> bool {
        match self.find_characteristic(characteristic_uuid) {
            Some(characteristic) => self.notifying.lock().unwrap().contains(&characteristic.path),
            None => false,
        }
    }

    pub fn services(&self) -> Vec<GattService> {
        self.services.lock().unwrap().clone()
    }

    /// Alias for [`Peripheral::services`] matching §6's `get_services`.
    pub fn get_services(&self) -> Vec<GattService> {
        self.services()
    }

    pub fn get_service(&self, uuid: Uuid) -> Option<GattService> {
        self.services.lock().unwrap().iter().find(|s| s.uuid == uuid).cloned()
    }

    pub fn get_characteristic(&self, service_uuid: Uuid, characteristic_uuid: Uuid) -> Option<GattCharacteristic> {
        self.services
            .lock()
            .unwrap()
            .iter()
            .find(|service| service.uuid == service_uuid)
            .and_then(|service| service.characteristic(characteristic_uuid).cloned())
    }

    /// The last manufacturer-specific advertisement data seen for this
    /// device (§6 [ADD]: BlueZ keeps advertising data on `Device1` after
    /// connection, so this remains readable post-connect).
    pub fn get_manufacturer_data(&self) -> HashMap<u16, Vec<u8>> {
        self.manufacturer_data.lock().unwrap().clone()
    }

    /// The last GATT service advertisement data seen for this device (§6
    /// [ADD], same rationale as `get_manufacturer_data`).
    pub fn get_service_data(&self) -> HashMap<Uuid, Vec<u8>> {
        self.service_data.lock().unwrap().clone()
    }

    /// The device's `AddressType` (public or random), if known (§6 [ADD]).
    pub fn device_address_type(&self) -> Option<AddressType> {
        *self.address_type.lock().unwrap()
    }

    /// The `Instant` of the most recent successful `Connect`, if any (§3
    /// `lastConnectAt`).
    pub fn last_connect_at(&self) -> Option<Instant> {
        *self.last_connect_at.lock().unwrap()
    }

    pub fn set_callback(&self, callback: PeripheralCallback) {
        *self.callback.lock().unwrap() = callback;
    }

    // --- connection lifecycle (§4.8) --------------------------------------

    pub fn connect(self: &Arc<Self>) {
        *self.state.lock().unwrap() = ConnectionState::Connecting;
        let peripheral = self.clone();
        self.command_queue.enqueue(move || {
            let device = DeviceHandle::new(peripheral.bus.clone(), peripheral.device_path.clone());
            match device.connect() {
                Ok(()) => {
                    debug!("{}: connected", peripheral.address);
                    *peripheral.state.lock().unwrap() = ConnectionState::Connected;
                    *peripheral.last_connect_at.lock().unwrap() = Some(Instant::now());
                    peripheral.refresh_device_snapshot();
                    if let Some(on_connected) = peripheral
                        .central_callback
                        .lock()
                        .unwrap()
                        .on_connected_peripheral
                        .clone()
                    {
                        on_connected(peripheral.address.clone());
                    }
                    peripheral.notify_central_scan_restart();
                    peripheral.begin_service_discovery();
                }
                Err(err) if ErrorKind::classify_bluetooth(&err) == ErrorKind::AlreadyConnected => {
                    // §4.8: synthesize Connected=true rather than treating
                    // an already-connected device as a failure.
                    debug!("{}: already connected", peripheral.address);
                    *peripheral.state.lock().unwrap() = ConnectionState::Connected;
                    *peripheral.last_connect_at.lock().unwrap() = Some(Instant::now());
                    peripheral.refresh_device_snapshot();
                    if let Some(on_connected) = peripheral
                        .central_callback
                        .lock()
                        .unwrap()
                        .on_connected_peripheral
                        .clone()
                    {
                        on_connected(peripheral.address.clone());
                    }
                    peripheral.notify_central_scan_restart();
                    peripheral.begin_service_discovery();
                }
                Err(err) => {
                    warn!("{}: connect failed: {}", peripheral.address, err);
                    *peripheral.state.lock().unwrap() = ConnectionState::Disconnected;
                    let status = ErrorKind::classify_bluetooth(&err).to_gatt_status(false);
                    if let Some(on_failed) = peripheral
                        .central_callback
                        .lock()
                        .unwrap()
                        .on_connection_failed
                        .clone()
                    {
                        on_failed(peripheral.address.clone(), status);
                    }
                    peripheral.notify_central_scan_restart();
                }
            }
            peripheral.command_queue.completed();
        });
    }

    /// Snapshots name/address-type/paired/advertisement data straight off
    /// `Device1` right after a successful connect, since BlueZ may not have
    /// emitted a `PropertiesChanged` carrying them and the application's
    /// `get_name`/`is_paired`/`get_manufacturer_data` accessors must reflect
    /// what's known as soon as `onConnectedPeripheral` fires.
    fn refresh_device_snapshot(&self) {
        let device = DeviceHandle::new(self.bus.clone(), self.device_path.clone());
        if let Ok(name) = device.name() {
            *self.name.lock().unwrap() = Some(name);
        }
        if let Ok(paired) = device.paired() {
            *self.bonded.lock().unwrap() = paired;
        }
        if let Ok(address_type) = device.address_type() {
            if let Ok(address_type) = address_type.parse() {
                *self.address_type.lock().unwrap() = Some(address_type);
            }
        }
        if let Ok(manufacturer_data) = device.manufacturer_data() {
            *self.manufacturer_data.lock().unwrap() =
                crate::central::convert_manufacturer_data(&manufacturer_data);
        }
        if let Ok(service_data) = device.service_data() {
            *self.service_data.lock().unwrap() =
                crate::central::convert_service_data(&service_data);
        }
    }

    pub fn disconnect(self: &Arc<Self>) {
        *self.state.lock().unwrap() = ConnectionState::Disconnecting;
        let peripheral = self.clone();
        self.command_queue.enqueue(move || {
            let device = DeviceHandle::new(peripheral.bus.clone(), peripheral.device_path.clone());
            if let Err(err) = device.disconnect() {
                warn!("{}: disconnect failed: {}", peripheral.address, err);
            }
            peripheral.command_queue.completed();
        });
    }

    fn begin_service_discovery(self: &Arc<Self>) {
        let peripheral = self.clone();
        let handle = self.timeout_executor.post_delayed(
            move || peripheral.service_discovery_timed_out(),
            SERVICE_DISCOVERY_TIMEOUT,
        );
        *self.discovery_timeout.lock().unwrap() = Some(handle);

        // Some peripherals have already resolved services by the time
        // Connect() returns; check immediately rather than waiting on a
        // signal that may never arrive.
        let device = DeviceHandle::new(self.bus.clone(), self.device_path.clone());
        if device.services_resolved().unwrap_or(false) {
            self.finish_service_discovery();
        }
    }

    fn service_discovery_timed_out(self: &Arc<Self>) {
        if self.services.lock().unwrap().is_empty() && self.state().is_connected() {
            warn!("{}: service discovery timed out", self.address);
            let device = DeviceHandle::new(self.bus.clone(), self.device_path.clone());
            if device.paired().unwrap_or(false) {
                if let Some(on_lost) = self.callback.lock().unwrap().on_bond_lost.clone() {
                    on_lost(self.address.clone());
                }
            }
            self.disconnect();
            if let Some(on_failed) = self
                .central_callback
                .lock()
                .unwrap()
                .on_connection_failed
                .clone()
            {
                on_failed(self.address.clone(), GattStatus::ConnTimeout);
            }
        }
    }

    fn finish_service_discovery(self: &Arc<Self>) {
        if let Some(handle) = self.discovery_timeout.lock().unwrap().take() {
            self.timeout_executor.cancel(handle);
        }
        match self.bus.get_managed_objects() {
            Ok(objects) => {
                let services = build_service_tree(&self.device_path, &objects);
                *self.services.lock().unwrap() = services;
            }
            Err(err) => {
                warn!("{}: GetManagedObjects failed during discovery: {}", self.address, err);
            }
        }
        if let Some(on_discovered) = self
            .callback
            .lock()
            .unwrap()
            .on_services_discovered
            .clone()
        {
            on_discovered(self.address.clone());
        }
    }

    // --- GATT operations (§4.9) --------------------------------------------

    fn find_characteristic(&self, uuid: Uuid) -> Option<GattCharacteristic> {
        self.services
            .lock()
            .unwrap()
            .iter()
            .find_map(|service| service.characteristic(uuid).cloned())
    }

    fn find_descriptor(&self, uuid: Uuid) -> Option<GattDescriptor> {
        self.services.lock().unwrap().iter().find_map(|service| {
            service
                .characteristics
                .iter()
                .find_map(|characteristic| characteristic.descriptor(uuid).cloned())
        })
    }

    fn find_characteristic_by_path(&self, path: &Path<'static>) -> Option<GattCharacteristic> {
        self.services.lock().unwrap().iter().find_map(|service| {
            service
                .characteristics
                .iter()
                .find(|characteristic| &characteristic.path == path)
                .cloned()
        })
    }

    pub fn read_characteristic(self: &Arc<Self>, uuid: Uuid) {
        let characteristic = match self.find_characteristic(uuid) {
            Some(characteristic) => characteristic,
            None => return,
        };
        if !characteristic
            .properties
            .contains(CharacteristicProperties::READ)
        {
            self.fire_characteristic_update(
                &characteristic,
                Vec::new(),
                GattStatus::ReadNotPermitted,
            );
            return;
        }
        let peripheral = self.clone();
        self.command_queue.enqueue(move || {
            let handle = CharacteristicHandle::new(peripheral.bus.clone(), characteristic.path.clone());
            match handle.read_value(HashMap::new()) {
                Ok(value) => peripheral.fire_characteristic_update(
                    &characteristic,
                    value,
                    GattStatus::Success,
                ),
                Err(err) => {
                    let status = ErrorKind::classify_bluetooth(&err).to_gatt_status(false);
                    peripheral.fire_characteristic_update(&characteristic, Vec::new(), status);
                }
            }
            peripheral.command_queue.completed();
        });
    }

    pub fn write_characteristic(self: &Arc<Self>, uuid: Uuid, value: Vec<u8>, write_type: WriteType) {
        let characteristic = match self.find_characteristic(uuid) {
            Some(characteristic) => characteristic,
            None => return,
        };
        if !characteristic
            .properties
            .contains(write_type.required_property())
        {
            self.fire_characteristic_write(&characteristic, value, GattStatus::WriteNotPermitted);
            return;
        }
        let peripheral = self.clone();
        self.command_queue.enqueue(move || {
            let handle = CharacteristicHandle::new(peripheral.bus.clone(), characteristic.path.clone());
            let mut options: HashMap<&str, dbus::arg::Variant<Box<dyn dbus::arg::RefArg>>> =
                HashMap::new();
            options.insert(
                "type",
                dbus::arg::Variant(Box::new(write_type.option_str().to_string())),
            );
            // §4.9/§3 `pendingWriteBytes`: the value is defensively copied
            // before the bus call so the callback's copy can never alias a
            // buffer the caller mutates afterwards.
            let pending_write_bytes = value.clone();
            match handle.write_value(value, options) {
                Ok(()) => peripheral.fire_characteristic_write(
                    &characteristic,
                    pending_write_bytes,
                    GattStatus::Success,
                ),
                Err(err) => {
                    let status = ErrorKind::classify_bluetooth(&err).to_gatt_status(true);
                    peripheral.fire_characteristic_write(&characteristic, pending_write_bytes, status);
                }
            }
            peripheral.command_queue.completed();
        });
    }

    pub fn set_notify(self: &Arc<Self>, uuid: Uuid, enable: bool) {
        let characteristic = match self.find_characteristic(uuid) {
            Some(characteristic) => characteristic,
            None => return,
        };
        let required = if enable {
            CharacteristicProperties::NOTIFY | CharacteristicProperties::INDICATE
        } else {
            CharacteristicProperties::empty()
        };
        if enable && (characteristic.properties & required).is_empty() {
            self.fire_notification_state_update(
                &characteristic,
                GattStatus::RequestNotSupported,
            );
            return;
        }
        let peripheral = self.clone();
        self.command_queue.enqueue(move || {
            let already_in_state = peripheral.notifying.lock().unwrap().contains(&characteristic.path) == enable;
            if already_in_state {
                // §4.9: only call StartNotify/StopNotify when a transition is
                // actually needed; BlueZ no-ops without emitting Notifying,
                // so completing from that signal would never happen here.
                peripheral.fire_notification_state_update(&characteristic, GattStatus::Success);
                peripheral.command_queue.completed();
                return;
            }
            let handle = CharacteristicHandle::new(peripheral.bus.clone(), characteristic.path.clone());
            let result = if enable {
                handle.start_notify()
            } else {
                handle.stop_notify()
            };
            match result {
                // §4.9: the daemon reports state via Notifying=true/false on
                // the characteristic path; the command completes from that
                // signal (see `PeripheralSignalSink`), not from this return.
                Ok(()) => {
                    *peripheral.notify_pending.lock().unwrap() = true;
                }
                Err(err) => {
                    let status = ErrorKind::classify_bluetooth(&err).to_gatt_status(false);
                    peripheral.fire_notification_state_update(&characteristic, status);
                    peripheral.command_queue.completed();
                }
            }
        });
    }

    pub fn read_descriptor(self: &Arc<Self>, uuid: Uuid) {
        let descriptor = match self.find_descriptor(uuid) {
            Some(descriptor) => descriptor,
            None => return,
        };
        let peripheral = self.clone();
        self.command_queue.enqueue(move || {
            let handle = DescriptorHandle::new(peripheral.bus.clone(), descriptor.path.clone());
            match handle.read_value(HashMap::new()) {
                Ok(value) => {
                    if let Some(on_read) = peripheral.callback.lock().unwrap().on_descriptor_read.clone()
                    {
                        on_read(peripheral.address.clone(), value, GattStatus::Success);
                    }
                }
                Err(err) => {
                    let status = ErrorKind::classify_bluetooth(&err).to_gatt_status(false);
                    if let Some(on_read) = peripheral.callback.lock().unwrap().on_descriptor_read.clone()
                    {
                        on_read(peripheral.address.clone(), Vec::new(), status);
                    }
                }
            }
            peripheral.command_queue.completed();
        });
    }

    pub fn write_descriptor(self: &Arc<Self>, uuid: Uuid, value: Vec<u8>) {
        let descriptor = match self.find_descriptor(uuid) {
            Some(descriptor) => descriptor,
            None => return,
        };
        let peripheral = self.clone();
        self.command_queue.enqueue(move || {
            let handle = DescriptorHandle::new(peripheral.bus.clone(), descriptor.path.clone());
            let result = handle.write_value(value.clone(), HashMap::new());
            let status = match result {
                Ok(()) => GattStatus::Success,
                Err(err) => ErrorKind::classify_bluetooth(&err).to_gatt_status(true),
            };
            if let Some(on_write) = peripheral.callback.lock().unwrap().on_descriptor_write.clone() {
                on_write(peripheral.address.clone(), status);
            }
            peripheral.command_queue.completed();
        });
    }

    pub fn read_remote_rssi(self: &Arc<Self>) {
        let peripheral = self.clone();
        self.command_queue.enqueue(move || {
            let device = DeviceHandle::new(peripheral.bus.clone(), peripheral.device_path.clone());
            let result = device.rssi();
            if let Some(on_rssi) = peripheral.callback.lock().unwrap().on_read_remote_rssi.clone() {
                match result {
                    Ok(rssi) => on_rssi(peripheral.address.clone(), rssi, GattStatus::Success),
                    Err(err) => {
                        let status = ErrorKind::classify_bluetooth(&err).to_gatt_status(false);
                        on_rssi(peripheral.address.clone(), 0, status);
                    }
                }
            }
            peripheral.command_queue.completed();
        });
    }

    // --- bonding (§4.7, §4.11) ---------------------------------------------

    pub fn create_bond(self: &Arc<Self>) {
        let peripheral = self.clone();
        self.command_queue.enqueue(move || {
            let device = DeviceHandle::new(peripheral.bus.clone(), peripheral.device_path.clone());
            match device.pair() {
                Ok(()) => {
                    if let Some(on_succeeded) =
                        peripheral.callback.lock().unwrap().on_bonding_succeeded.clone()
                    {
                        on_succeeded(peripheral.address.clone());
                    }
                }
                Err(err) => {
                    warn!("{}: pairing failed: {}", peripheral.address, err);
                    if let Some(on_failed) = peripheral.callback.lock().unwrap().on_bonding_failed.clone()
                    {
                        on_failed(peripheral.address.clone());
                    }
                }
            }
            peripheral.command_queue.completed();
        });
    }

    fn remove_if_unbonded(&self) {
        let device = DeviceHandle::new(self.bus.clone(), self.device_path.clone());
        if !device.paired().unwrap_or(true) {
            let adapter = AdapterHandle::new(self.bus.clone(), self.adapter_path.clone());
            if let Err(err) = adapter.remove_device(self.device_path.clone()) {
                debug!("{}: RemoveDevice after disconnect failed: {}", self.address, err);
            }
        }
    }
}

impl PairingSink for Peripheral {
    fn on_pairing_started(&self) {
        if let Some(on_started) = self.callback.lock().unwrap().on_bonding_started.clone() {
            on_started(self.address.clone());
        }
    }
}

impl PeripheralSignalSink for Peripheral {
    fn handle_properties_changed(&self, path: &Path<'static>, interface: &str, changed: &PropMap) {
        match interface {
            "org.bluez.Device1" => self.handle_device_properties_changed(changed),
            "org.bluez.GattCharacteristic1" => {
                self.handle_characteristic_properties_changed(path, changed)
            }
            _ => {}
        }
    }
}

impl Peripheral {
    fn handle_device_properties_changed(&self, changed: &PropMap) {
        let view = OrgBluezDevice1Properties(changed);

        if let Some(name) = view.name() {
            *self.name.lock().unwrap() = Some(name.clone());
        }
        if let Some(manufacturer_data) = view.manufacturer_data() {
            self.manufacturer_data
                .lock()
                .unwrap()
                .extend(crate::central::convert_manufacturer_data(manufacturer_data));
        }
        if let Some(service_data) = view.service_data() {
            self.service_data
                .lock()
                .unwrap()
                .extend(crate::central::convert_service_data(service_data));
        }

        if let Some(resolved) = view.services_resolved() {
            if resolved {
                self.this().finish_service_discovery();
            }
        }

        if let Some(connected) = view.connected() {
            if !connected {
                let was_solicited = self.state() == ConnectionState::Disconnecting;
                if !was_solicited {
                    debug!("{}: unsolicited disconnect", self.address);
                }
                *self.state.lock().unwrap() = ConnectionState::Disconnected;
                self.services.lock().unwrap().clear();
                self.notifying.lock().unwrap().clear();
                self.command_queue.clear();
                if let Some(handle) = self.discovery_timeout.lock().unwrap().take() {
                    self.timeout_executor.cancel(handle);
                }
                self.remove_if_unbonded();
                if !was_solicited {
                    if let Some(on_disconnected) = self
                        .central_callback
                        .lock()
                        .unwrap()
                        .on_disconnected_peripheral
                        .clone()
                    {
                        on_disconnected(self.address.clone(), GattStatus::ConnTerminatePeerUser);
                    }
                }
                self.notify_central_scan_restart();
            }
        }

        if let Some(paired) = view.paired() {
            *self.bonded.lock().unwrap() = paired;
            if !paired && self.state().is_connected() {
                if let Some(on_lost) = self.callback.lock().unwrap().on_bond_lost.clone() {
                    on_lost(self.address.clone());
                }
            }
        }
    }

    /// §4.9: `Value` changes deliver `onCharacteristicUpdate` independently
    /// of any in-flight read; `Notifying` changes deliver
    /// `onNotificationStateUpdate` and complete a pending `set_notify`
    /// command (§4.2: the GATT queue completes when the corresponding
    /// signal arrives, not when `StartNotify`/`StopNotify` merely returns).
    fn handle_characteristic_properties_changed(&self, path: &Path<'static>, changed: &PropMap) {
        let characteristic = match self.find_characteristic_by_path(path) {
            Some(characteristic) => characteristic,
            None => return,
        };
        let view = OrgBluezGattCharacteristic1Properties(changed);

        if let Some(value) = view.value() {
            self.fire_characteristic_update(&characteristic, value.clone(), GattStatus::Success);
        }

        if let Some(notifying) = view.notifying() {
            let mut notifying_set = self.notifying.lock().unwrap();
            if notifying {
                notifying_set.insert(characteristic.path.clone());
            } else {
                notifying_set.remove(&characteristic.path);
            }
            drop(notifying_set);

            self.fire_notification_state_update(&characteristic, GattStatus::Success);
            let mut pending = self.notify_pending.lock().unwrap();
            if *pending {
                *pending = false;
                drop(pending);
                self.command_queue.completed();
            }
        }
    }
}

impl Peripheral {
    fn fire_characteristic_update(
        &self,
        characteristic: &GattCharacteristic,
        value: Vec<u8>,
        status: GattStatus,
    ) {
        if let Some(on_update) = self.callback.lock().unwrap().on_characteristic_update.clone() {
            on_update(self.address.clone(), value, characteristic.clone(), status);
        }
    }

    fn fire_characteristic_write(
        &self,
        characteristic: &GattCharacteristic,
        value: Vec<u8>,
        status: GattStatus,
    ) {
        if let Some(on_write) = self.callback.lock().unwrap().on_characteristic_write.clone() {
            on_write(self.address.clone(), value, characteristic.clone(), status);
        }
    }

    fn fire_notification_state_update(
        &self,
        characteristic: &GattCharacteristic,
        status: GattStatus,
    ) {
        if let Some(on_update) = self
            .callback
            .lock()
            .unwrap()
            .on_notification_state_update
            .clone()
        {
            on_update(self.address.clone(), characteristic.clone(), status);
        }
    }
}

/// Builds the service/characteristic/descriptor tree for `device_path` out
/// of a full `GetManagedObjects` snapshot (§4.10).
fn build_service_tree(
    device_path: &Path<'static>,
    objects: &crate::connection::ManagedObjects,
) -> Vec<GattService> {
    let device_prefix: &str = device_path;

    let mut services: Vec<GattService> = Vec::new();
    for (path, interfaces) in objects {
        if !path.starts_with(device_prefix) {
            continue;
        }
        let service_props = match interfaces.get("org.bluez.GattService1") {
            Some(props) => props,
            None => continue,
        };
        let uuid = match OrgBluezGattService1Properties(service_props)
            .uuid()
            .and_then(|s| Uuid::from_str(s).ok())
        {
            Some(uuid) => uuid,
            None => continue,
        };
        services.push(GattService {
            uuid,
            path: path.clone(),
            characteristics: Vec::new(),
        });
    }

    for service in &mut services {
        let service_prefix: &str = &service.path;
        for (path, interfaces) in objects {
            if !path.starts_with(service_prefix) {
                continue;
            }
            let char_props = match interfaces.get("org.bluez.GattCharacteristic1") {
                Some(props) => props,
                None => continue,
            };
            let view = OrgBluezGattCharacteristic1Properties(char_props);
            let uuid = match view.uuid().and_then(|s| Uuid::from_str(s).ok()) {
                Some(uuid) => uuid,
                None => continue,
            };
            let properties = view
                .flags()
                .map(|flags| CharacteristicProperties::from_flag_strings(flags))
                .unwrap_or_else(CharacteristicProperties::empty);
            service.characteristics.push(GattCharacteristic {
                uuid,
                path: path.clone(),
                service_uuid: service.uuid,
                properties,
                descriptors: Vec::new(),
            });
        }

        for characteristic in &mut service.characteristics {
            let char_prefix: &str = &characteristic.path;
            for (path, interfaces) in objects {
                if !path.starts_with(char_prefix) {
                    continue;
                }
                let descriptor_props = match interfaces.get("org.bluez.GattDescriptor1") {
                    Some(props) => props,
                    None => continue,
                };
                let uuid = match OrgBluezGattDescriptor1Properties(descriptor_props)
                    .uuid()
                    .and_then(|s| Uuid::from_str(s).ok())
                {
                    Some(uuid) => uuid,
                    None => continue,
                };
                characteristic.descriptors.push(GattDescriptor {
                    uuid,
                    path: path.clone(),
                    characteristic_uuid: characteristic.uuid,
                });
            }
        }
    }

    services
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbus::arg::{RefArg, Variant};

    fn props(entries: Vec<(&str, Box<dyn RefArg>)>) -> HashMap<String, Variant<Box<dyn RefArg>>> {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), Variant(v)))
            .collect()
    }

    fn managed_objects(
        entries: Vec<(String, &str, Vec<(&str, Box<dyn RefArg>)>)>,
    ) -> crate::connection::ManagedObjects {
        let mut objects: crate::connection::ManagedObjects = HashMap::new();
        for (path, interface, properties) in entries {
            objects
                .entry(Path::from(path))
                .or_default()
                .insert(interface.to_string(), props(properties));
        }
        objects
    }

    const DEVICE_PATH: &str = "/org/bluez/hci0/dev_00_43_A8_23_10_F0";
    const HEART_RATE_SERVICE: &str = "0000180d-0000-1000-8000-00805f9b34fb";
    const HEART_RATE_MEASUREMENT: &str = "00002a37-0000-1000-8000-00805f9b34fb";
    const CCCD: &str = "00002902-0000-1000-8000-00805f9b34fb";

    #[test]
    fn build_service_tree_walks_services_characteristics_and_descriptors() {
        let objects = managed_objects(vec![
            (
                format!("{}/service0010", DEVICE_PATH),
                "org.bluez.GattService1",
                vec![("UUID", Box::new(HEART_RATE_SERVICE.to_string()) as Box<dyn RefArg>)],
            ),
            (
                format!("{}/service0010/char0011", DEVICE_PATH),
                "org.bluez.GattCharacteristic1",
                vec![
                    ("UUID", Box::new(HEART_RATE_MEASUREMENT.to_string()) as Box<dyn RefArg>),
                    (
                        "Flags",
                        Box::new(vec!["read".to_string(), "notify".to_string()]) as Box<dyn RefArg>,
                    ),
                ],
            ),
            (
                format!("{}/service0010/char0011/desc0012", DEVICE_PATH),
                "org.bluez.GattDescriptor1",
                vec![("UUID", Box::new(CCCD.to_string()) as Box<dyn RefArg>)],
            ),
            // An object under an unrelated device must never leak in.
            (
                "/org/bluez/hci0/dev_FF_FF_FF_FF_FF_FF/service0010".to_string(),
                "org.bluez.GattService1",
                vec![("UUID", Box::new(HEART_RATE_SERVICE.to_string()) as Box<dyn RefArg>)],
            ),
        ]);

        let services = build_service_tree(&Path::from(DEVICE_PATH), &objects);

        assert_eq!(services.len(), 1);
        let service = &services[0];
        assert_eq!(service.uuid, Uuid::from_str(HEART_RATE_SERVICE).unwrap());
        assert_eq!(service.characteristics.len(), 1);
        let characteristic = &service.characteristics[0];
        assert_eq!(
            characteristic.uuid,
            Uuid::from_str(HEART_RATE_MEASUREMENT).unwrap()
        );
        assert_eq!(characteristic.service_uuid, service.uuid);
        assert!(characteristic
            .properties
            .contains(CharacteristicProperties::READ | CharacteristicProperties::NOTIFY));
        assert_eq!(characteristic.descriptors.len(), 1);
        assert_eq!(
            characteristic.descriptors[0].uuid,
            Uuid::from_str(CCCD).unwrap()
        );
        assert_eq!(characteristic.descriptors[0].characteristic_uuid, characteristic.uuid);
    }

    #[test]
    fn build_service_tree_skips_objects_with_an_unparseable_uuid() {
        let objects = managed_objects(vec![(
            format!("{}/service0010", DEVICE_PATH),
            "org.bluez.GattService1",
            vec![("UUID", Box::new("not-a-uuid".to_string()) as Box<dyn RefArg>)],
        )]);

        let services = build_service_tree(&Path::from(DEVICE_PATH), &objects);

        assert!(services.is_empty());
    }

    #[test]
    fn build_service_tree_returns_nothing_for_a_device_with_no_resolved_services() {
        let objects = managed_objects(vec![]);
        let services = build_service_tree(&Path::from(DEVICE_PATH), &objects);
        assert!(services.is_empty());
    }
}
