use crate::agent::PairingAgent;
use crate::callbacks::{CentralCallback, PeripheralCallback};
use crate::connection::BusConnection;
use crate::dispatcher::{CentralSignalSink, SignalDispatcher};
use crate::error::{BluetoothError, ErrorKind};
use crate::executor::{ScheduledExecutor, TaskHandle};
use crate::filter::{admits_for_application, ScanFilter, ScanOptions};
use crate::handles::AdapterHandle;
use crate::macaddress::{address_from_object_path, MacAddress};
use crate::model::ScanResult;
use crate::peripheral::Peripheral;
use crate::queue::CommandQueue;
use bluez_generated::{OrgBluezAdapter1Properties, OrgBluezDevice1Properties, BLUEZ_ROOT_PATH};
use dbus::arg::{PropMap, RefArg, Variant};
use dbus::Path;
use itertools::Itertools;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use uuid::Uuid;

const SCAN_WINDOW: Duration = Duration::from_secs(6);
const SCAN_GAP: Duration = Duration::from_secs(2);
const DISCOVERY_RSSI_THRESHOLD: i16 = -70;
/// Settle delay inserted before completing an adapter command once its
/// expected property change has been observed (§4.2, §4.5, §5).
const ADAPTER_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Scan engine (C5) + reconnect engine (C6) bookkeeping, guarded by a single
/// mutex per §5 ("per-central state ... protected by a single central
/// mutex").
struct ScanState {
    /// Set by `scan_any`/`scan_by_*`; cleared by `stop_scan`.
    normal_scan_active: bool,
    /// Set while the reconnect set (§4.6) is non-empty and scan-driven.
    auto_scan_active: bool,
    /// Immediately suppresses forwarding of discovery events to the
    /// application once `stop_scan` is called (§4.5).
    stopping: bool,
    /// True while a discovery window is actually running (StartDiscovery
    /// issued, StopDiscovery not yet issued for this window).
    is_scanning: bool,
    filter: ScanFilter,
    options: ScanOptions,
    window_timer: Option<TaskHandle>,
    /// The `Discovering` value the in-flight adapter command is waiting to
    /// observe before `completed()` fires (I3's `currentCommand`, narrowed
    /// to this queue's only confirmable property). `None` when the adapter
    /// queue is idle or the in-flight command completed without a signal
    /// (early-exit or error).
    current_command: Option<bool>,
}

impl Default for ScanState {
    fn default() -> Self {
        ScanState {
            normal_scan_active: false,
            auto_scan_active: false,
            stopping: false,
            is_scanning: false,
            filter: ScanFilter::Any,
            options: ScanOptions::default(),
            window_timer: None,
            current_command: None,
        }
    }
}

impl ScanState {
    fn scan_requested(&self) -> bool {
        self.normal_scan_active || self.auto_scan_active
    }
}

/// The ordered reconnect set (§3, §4.6): addresses the central is passively
/// scanning for in order to transparently connect on sight. Order matters
/// only in that entries are serviced as their advertisements are seen, not
/// in a fixed batch order, but we keep insertion order for predictability.
#[derive(Default)]
struct ReconnectState {
    order: Vec<MacAddress>,
    callbacks: HashMap<MacAddress, PeripheralCallback>,
}

impl ReconnectState {
    fn insert(&mut self, address: MacAddress, callback: PeripheralCallback) -> bool {
        if self.callbacks.contains_key(&address) {
            return false;
        }
        self.order.push(address.clone());
        self.callbacks.insert(address, callback);
        true
    }

    fn remove(&mut self, address: &MacAddress) -> Option<PeripheralCallback> {
        let callback = self.callbacks.remove(address);
        if callback.is_some() {
            self.order.retain(|a| a != address);
        }
        callback
    }

    fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

/// The Central manager (C8): owns adapter selection, the scan engine (C5),
/// the reconnect engine (C6), the pairing agent (C7) and the set of known
/// peripherals (C9 controllers), per §4.1-§4.7.
pub struct Central {
    bus: Arc<BusConnection>,
    dispatcher: Arc<SignalDispatcher>,
    agent: Arc<PairingAgent>,
    adapter_path: Path<'static>,
    command_queue: Arc<CommandQueue>,
    scan_timer: Arc<ScheduledExecutor>,
    scan: Mutex<ScanState>,
    scan_results: Mutex<HashMap<MacAddress, ScanResult>>,
    peripherals: Mutex<HashMap<MacAddress, Arc<Peripheral>>>,
    reconnect: Mutex<ReconnectState>,
    callback: Mutex<CentralCallback>,
    self_weak: Mutex<Weak<Central>>,
}

impl Central {
    /// Picks an adapter (§4.1: the lexicographically greatest adapter name
    /// under `/org/bluez`, e.g. `hci1` over `hci0`), powers it on if
    /// necessary, and constructs the Central manager against it.
    pub fn new(bus: Arc<BusConnection>) -> Result<Arc<Central>, BluetoothError> {
        Self::new_with_callback(bus, CentralCallback::default())
    }

    pub fn new_with_callback(
        bus: Arc<BusConnection>,
        callback: CentralCallback,
    ) -> Result<Arc<Central>, BluetoothError> {
        let adapter_path = select_adapter(&bus)?;
        ensure_powered(&bus, adapter_path.clone())?;

        let dispatcher = SignalDispatcher::global(&bus);
        let agent = PairingAgent::register(&bus)?;
        agent.set_central_callback(callback.clone());
        let executor = Arc::new(ScheduledExecutor::new("adapter-commands"));
        let command_queue = Arc::new(CommandQueue::new("adapter", executor));
        let scan_timer = Arc::new(ScheduledExecutor::new("scan-timer"));

        let central = Arc::new(Central {
            bus,
            dispatcher: dispatcher.clone(),
            agent,
            adapter_path,
            command_queue,
            scan_timer,
            scan: Mutex::new(ScanState::default()),
            scan_results: Mutex::new(HashMap::new()),
            peripherals: Mutex::new(HashMap::new()),
            reconnect: Mutex::new(ReconnectState::default()),
            callback: Mutex::new(callback),
            self_weak: Mutex::new(Weak::new()),
        });
        *central.self_weak.lock().unwrap() = Arc::downgrade(&central);
        let sink: Weak<dyn CentralSignalSink> = Arc::downgrade(&central);
        dispatcher.register_central(sink);
        Ok(central)
    }

    pub fn set_callback(&self, callback: CentralCallback) {
        self.agent.set_central_callback(callback.clone());
        *self.callback.lock().unwrap() = callback;
    }

    fn this(&self) -> Arc<Central> {
        self.self_weak
            .lock()
            .unwrap()
            .upgrade()
            .expect("Central outlives its own weak reference")
    }

    // --- scanning (C5) ---------------------------------------------------

    pub fn scan_any(&self, options: ScanOptions) {
        self.start_scan(ScanFilter::Any, options);
    }

    pub fn scan_by_service_uuids(&self, uuids: HashSet<Uuid>, options: ScanOptions) {
        self.start_scan(ScanFilter::ServiceUuids(uuids), options);
    }

    pub fn scan_by_names(&self, names: Vec<String>, options: ScanOptions) {
        self.start_scan(ScanFilter::Names(names), options);
    }

    pub fn scan_by_addresses(&self, addresses: Vec<MacAddress>, options: ScanOptions) {
        self.start_scan(ScanFilter::Addresses(addresses), options);
    }

    fn start_scan(&self, filter: ScanFilter, options: ScanOptions) {
        let mut scan = self.scan.lock().unwrap();
        scan.normal_scan_active = true;
        scan.stopping = false;
        scan.filter = filter;
        scan.options = options;
        drop(scan);
        self.scan_results.lock().unwrap().clear();
        self.ensure_scanning();
    }

    /// Sets `stoppingScan := true` (immediately suppresses forwarding of
    /// discovery events), cancels the scan-window timer and issues
    /// `StopDiscovery` unless the reconnect engine still needs the adapter
    /// scanning (§4.5).
    pub fn stop_scan(&self) {
        let mut scan = self.scan.lock().unwrap();
        scan.normal_scan_active = false;
        scan.stopping = true;
        let still_needed = scan.scan_requested();
        drop(scan);
        if !still_needed {
            self.halt_scanning();
        }
    }

    /// Starts the scan-window loop if it is not already running and a scan
    /// is requested by either the normal-scan or the reconnect engine.
    fn ensure_scanning(&self) {
        let mut scan = self.scan.lock().unwrap();
        if scan.is_scanning || !scan.scan_requested() {
            return;
        }
        scan.is_scanning = true;
        drop(scan);
        self.begin_scan_window();
    }

    /// Cancels the window timer and issues `StopDiscovery`, regardless of
    /// whether a scan is currently requested. Used by `stop_scan` and by the
    /// reconnect engine when a pending address is matched.
    fn halt_scanning(&self) {
        let mut scan = self.scan.lock().unwrap();
        if let Some(handle) = scan.window_timer.take() {
            self.scan_timer.cancel(handle);
        }
        scan.is_scanning = false;
        drop(scan);
        let central = self.this();
        self.command_queue.enqueue(move || {
            let adapter = AdapterHandle::new(central.bus.clone(), central.adapter_path.clone());
            match adapter.stop_discovery() {
                // Completion is deferred to the `Discovering=false` signal,
                // with a settle delay (§4.2 adapter-queue rule).
                Ok(()) => central.scan.lock().unwrap().current_command = Some(false),
                Err(err) => {
                    if ErrorKind::classify_bluetooth(&err) != ErrorKind::NoDiscoveryStarted {
                        warn!("StopDiscovery failed: {}", err);
                    }
                    // A typed error completes the command immediately; no
                    // signal will follow since nothing changed.
                    central.command_queue.completed();
                }
            }
        });
    }

    /// Continuous rescan must persist across (dis)connects (§4.5): called by
    /// a `Peripheral` whenever it observes a connect, disconnect, or
    /// connect-failure event.
    pub(crate) fn restart_scan_if_needed(&self) {
        self.ensure_scanning();
    }

    fn begin_scan_window(&self) {
        let central = self.this();
        self.command_queue.enqueue(move || {
            let adapter = AdapterHandle::new(central.bus.clone(), central.adapter_path.clone());
            if adapter.discovering().unwrap_or(false) {
                // Already discovering: no `Discovering=true` transition will
                // follow, so complete now rather than waiting on a signal
                // that will never arrive (§4.5).
                debug!("adapter already discovering; completing start-scan command immediately");
                if let Some(on_scan_started) = central.callback.lock().unwrap().on_scan_started.clone() {
                    on_scan_started();
                }
                central.command_queue.completed();
                return;
            }
            let filter = central.scan.lock().unwrap().filter.clone();
            if let Err(err) = adapter.set_discovery_filter(build_discovery_filter(&filter)) {
                warn!("SetDiscoveryFilter failed: {}", err);
            }
            match adapter.start_discovery() {
                // Completion (and `on_scan_started`) deferred to the
                // `Discovering=true` signal, with a settle delay.
                Ok(()) => central.scan.lock().unwrap().current_command = Some(true),
                Err(err) => {
                    warn!("StartDiscovery failed: {}", err);
                    central.scan.lock().unwrap().is_scanning = false;
                    if let Some(on_scan_failed) = central.callback.lock().unwrap().on_scan_failed.clone() {
                        on_scan_failed(0);
                    }
                    central.command_queue.completed();
                }
            }
        });

        let central = self.this();
        let handle = self
            .scan_timer
            .post_delayed(move || central.end_scan_window(), SCAN_WINDOW);
        self.scan.lock().unwrap().window_timer = Some(handle);
    }

    fn end_scan_window(&self) {
        let central = self.this();
        self.command_queue.enqueue(move || {
            let adapter = AdapterHandle::new(central.bus.clone(), central.adapter_path.clone());
            match adapter.stop_discovery() {
                // Completion (cache clear + `on_scan_stopped`) deferred to
                // the `Discovering=false` signal, with a settle delay.
                Ok(()) => central.scan.lock().unwrap().current_command = Some(false),
                Err(err) => {
                    if ErrorKind::classify_bluetooth(&err) != ErrorKind::NoDiscoveryStarted {
                        debug!("StopDiscovery at window end failed: {}", err);
                    }
                    central.command_queue.completed();
                }
            }
        });

        let mut scan = self.scan.lock().unwrap();
        if scan.scan_requested() {
            drop(scan);
            let central = self.this();
            let handle = self
                .scan_timer
                .post_delayed(move || central.begin_scan_window(), SCAN_GAP);
            self.scan.lock().unwrap().window_timer = Some(handle);
        } else {
            scan.is_scanning = false;
        }
    }

    // --- discovered device bookkeeping -----------------------------------

    /// `InterfacesAdded` on a fresh `Device1`: the payload already carries
    /// the object's full property set, so the new `ScanResult` is built
    /// directly from it (§4.5).
    fn handle_new_device(&self, path: &Path<'static>, properties: &PropMap) {
        let address = match address_from_object_path(path) {
            Some(address) => address,
            None => return,
        };
        let view = OrgBluezDevice1Properties(properties);
        let name = view.name().cloned();
        let service_uuids = view
            .uuids()
            .map(|uuids| uuids.iter().filter_map(|s| Uuid::from_str(s).ok()).collect())
            .unwrap_or_default();
        let mut result = ScanResult::new(address.clone(), name, service_uuids);
        result.merge_update(
            view.rssi(),
            view.manufacturer_data().map(convert_manufacturer_data),
            view.service_data().map(convert_service_data),
        );
        self.scan_results.lock().unwrap().insert(address.clone(), result.clone());
        self.process_scan_result(address, result);
    }

    /// `PropertiesChanged` on a `Device1` while scanning (§4.5): merges into
    /// the cached result if one exists; otherwise synthesizes one by
    /// querying the device handle's current properties (the changed-set
    /// payload here is only a partial diff, not enough on its own to build a
    /// fresh `ScanResult`).
    ///
    /// Gated on an active, non-stopping discovery window (I4): this fires
    /// for any `Device1` under the adapter, including an already-connected
    /// peripheral's RSSI/`Connected` churn, which must never seed or update
    /// the scan-result cache outside `Discovering=true`.
    fn handle_device_property_update(&self, path: &Path<'static>, changed: &PropMap) {
        let scan = self.scan.lock().unwrap();
        let admit_window = scan.is_scanning && !scan.stopping;
        drop(scan);
        if !admit_window {
            return;
        }

        let address = match address_from_object_path(path) {
            Some(address) => address,
            None => return,
        };
        let view = OrgBluezDevice1Properties(changed);
        let manufacturer_data = view.manufacturer_data().map(convert_manufacturer_data);
        let service_data = view.service_data().map(convert_service_data);

        let mut scan_results = self.scan_results.lock().unwrap();
        let result = match scan_results.get_mut(&address) {
            Some(existing) => {
                existing.merge_update(view.rssi(), manufacturer_data, service_data);
                existing.clone()
            }
            None => {
                drop(scan_results);
                let mut result = self.query_device_scan_result(path.clone(), &address);
                result.merge_update(view.rssi(), manufacturer_data, service_data);
                self.scan_results.lock().unwrap().insert(address.clone(), result.clone());
                result
            }
        };

        self.process_scan_result(address, result);
    }

    /// Queries the device handle's current properties (§4.5) to synthesize
    /// a `ScanResult` for an address not yet in the cache.
    fn query_device_scan_result(&self, device_path: Path<'static>, address: &MacAddress) -> ScanResult {
        let device = crate::handles::DeviceHandle::new(self.bus.clone(), device_path);
        let name = device.name().ok();
        let service_uuids = device
            .uuids()
            .map(|uuids| uuids.iter().filter_map(|s| Uuid::from_str(s).ok()).collect())
            .unwrap_or_default();
        let mut result = ScanResult::new(address.clone(), name, service_uuids);
        result.merge_update(
            device.rssi().ok(),
            device.manufacturer_data().ok().map(|m| convert_manufacturer_data(&m)),
            device.service_data().ok().map(|s| convert_service_data(&s)),
        );
        result
    }

    /// §4.6/§4.5: a reconnect-set match takes priority over the application
    /// filter and never reaches `onDiscoveredPeripheral` (Q5); otherwise the
    /// result is delivered only while a normal scan is actively admitting
    /// results and the filter predicate accepts it.
    fn process_scan_result(&self, address: MacAddress, result: ScanResult) {
        let matched = { self.reconnect.lock().unwrap().remove(&address) };
        if let Some(callback) = matched {
            self.handle_reconnect_match(address, result, callback);
            return;
        }

        let scan = self.scan.lock().unwrap();
        let (filter, options, admit_window) = (
            scan.filter.clone(),
            scan.options,
            scan.normal_scan_active && scan.is_scanning && !scan.stopping,
        );
        drop(scan);

        if admit_window && admits_for_application(&filter, options, &result) {
            if let Some(on_discovered) = self.callback.lock().unwrap().on_discovered_peripheral.clone() {
                on_discovered(address, result);
            }
        }
    }

    /// §4.6: on a reconnect-set hit, stop scanning, promote straight to a
    /// connect, then resume scanning for any remaining reconnect entries or
    /// for the normal scan that was in progress.
    fn handle_reconnect_match(&self, address: MacAddress, _result: ScanResult, callback: PeripheralCallback) {
        self.halt_scanning();
        self.connect_with_callback(address, callback);

        let mut scan = self.scan.lock().unwrap();
        scan.auto_scan_active = !self.reconnect.lock().unwrap().is_empty();
        let should_resume = scan.scan_requested();
        drop(scan);
        if should_resume {
            self.ensure_scanning();
        }
    }

    // --- connection management (C6, C8) -----------------------------------

    pub fn connect(&self, address: MacAddress, callback: PeripheralCallback) -> Arc<Peripheral> {
        self.connect_with_callback(address, callback)
    }

    fn connect_with_callback(&self, address: MacAddress, callback: PeripheralCallback) -> Arc<Peripheral> {
        let mut peripherals = self.peripherals.lock().unwrap();
        if let Some(existing) = peripherals.get(&address) {
            return existing.clone();
        }
        let peripheral = Peripheral::new(
            address.clone(),
            self.adapter_path.clone(),
            self.bus.clone(),
            self.dispatcher.clone(),
            self.agent.clone(),
            Arc::downgrade(&self.this()),
            callback,
            self.callback.lock().unwrap().clone(),
        );
        peripherals.insert(address, peripheral.clone());
        drop(peripherals);
        peripheral.connect();
        peripheral
    }

    /// Registers `address` for scan-driven auto-connect (C6): the central
    /// starts (or keeps running) a scan, and the first matching
    /// advertisement seen triggers a connect (Open Question: auto-connect is
    /// scan-driven only, never a one-shot `GetManagedObjects` lookup — see
    /// DESIGN.md). Returns `false` without effect if `address` is already
    /// registered (Q7).
    pub fn auto_connect(&self, address: MacAddress, callback: PeripheralCallback) -> bool {
        let inserted = self.reconnect.lock().unwrap().insert(address, callback);
        if inserted {
            self.scan.lock().unwrap().auto_scan_active = true;
            self.ensure_scanning();
        }
        inserted
    }

    /// Registers each entry via [`Central::auto_connect`], in order.
    pub fn auto_connect_batch(&self, entries: Vec<(MacAddress, PeripheralCallback)>) -> Vec<bool> {
        entries
            .into_iter()
            .map(|(address, callback)| self.auto_connect(address, callback))
            .collect()
    }

    /// Cancels a pending (not yet matched) auto-connect registration, or
    /// disconnects an already-connected peripheral for `address` (§4.6).
    pub fn cancel_connection(&self, address: &MacAddress) {
        self.reconnect.lock().unwrap().remove(address);
        let reconnect_empty = self.reconnect.lock().unwrap().is_empty();
        if reconnect_empty {
            let mut scan = self.scan.lock().unwrap();
            scan.auto_scan_active = false;
            if !scan.scan_requested() {
                drop(scan);
                self.halt_scanning();
            }
        }
        if let Some(peripheral) = self.peripherals.lock().unwrap().get(address) {
            peripheral.disconnect();
        }
    }

    pub fn get_peripheral(&self, address: &MacAddress) -> Option<Arc<Peripheral>> {
        self.peripherals.lock().unwrap().get(address).cloned()
    }

    pub fn get_connected_peripherals(&self) -> Vec<Arc<Peripheral>> {
        self.peripherals
            .lock()
            .unwrap()
            .values()
            .filter(|peripheral| peripheral.state().is_connected())
            .cloned()
            .collect()
    }

    // --- pairing, bonding and adapter power (C7) --------------------------

    pub fn set_pin_code(&self, address: &str, pin: &str) -> bool {
        self.agent.set_pin_code(address, pin)
    }

    pub fn remove_bond(&self, address: &MacAddress) -> Result<(), BluetoothError> {
        let device_path = Path::from(format!(
            "{}/{}",
            self.adapter_path,
            address.to_path_segment()
        ));
        let adapter = AdapterHandle::new(self.bus.clone(), self.adapter_path.clone());
        adapter.remove_device(device_path)?;
        self.peripherals.lock().unwrap().remove(address);
        Ok(())
    }

    pub fn adapter_on(&self) -> Result<(), BluetoothError> {
        AdapterHandle::new(self.bus.clone(), self.adapter_path.clone()).set_powered(true)
    }

    pub fn adapter_off(&self) -> Result<(), BluetoothError> {
        AdapterHandle::new(self.bus.clone(), self.adapter_path.clone()).set_powered(false)
    }
}

impl CentralSignalSink for Central {
    fn handle_interfaces_added(&self, path: &Path<'static>, interfaces: &HashMap<String, PropMap>) {
        if let Some(device_properties) = interfaces.get("org.bluez.Device1") {
            self.handle_new_device(path, device_properties);
        }
    }

    fn handle_properties_changed(&self, path: &Path<'static>, interface: &str, changed: &PropMap) {
        let adapter_prefix: &str = &self.adapter_path;
        if interface == "org.bluez.Device1" && path.starts_with(adapter_prefix) {
            self.handle_device_property_update(path, changed);
        } else if interface == "org.bluez.Adapter1" {
            if let Some(discovering) = OrgBluezAdapter1Properties(changed).discovering() {
                self.handle_discovering_changed(discovering);
            }
        }
    }
}

impl Central {
    /// Drives the adapter command queue's completion off the `Discovering`
    /// signal (I3), with a fixed settle delay, and enforces I4 (the
    /// scan-result cache is non-empty only between `Discovering=true` and
    /// the next `Discovering=false`) independently of which code path
    /// requested the transition.
    fn handle_discovering_changed(&self, discovering: bool) {
        debug!("adapter {} discovering={}", self.adapter_path, discovering);
        if !discovering {
            self.scan_results.lock().unwrap().clear();
            if let Some(on_scan_stopped) = self.callback.lock().unwrap().on_scan_stopped.clone() {
                on_scan_stopped();
            }
        } else if let Some(on_scan_started) = self.callback.lock().unwrap().on_scan_started.clone() {
            on_scan_started();
        }

        let matched = {
            let mut scan = self.scan.lock().unwrap();
            if scan.current_command == Some(discovering) {
                scan.current_command = None;
                true
            } else {
                false
            }
        };
        if matched {
            let central = self.this();
            self.scan_timer
                .post_delayed(move || central.command_queue.completed(), ADAPTER_SETTLE_DELAY);
        }
    }
}

fn select_adapter(bus: &BusConnection) -> Result<Path<'static>, BluetoothError> {
    let objects = bus.get_managed_objects()?;
    let adapter_name = objects
        .iter()
        .filter(|(path, _)| path.starts_with(BLUEZ_ROOT_PATH))
        .filter_map(|(path, interfaces)| {
            interfaces.get("org.bluez.Adapter1")?;
            path.rsplit('/').next().map(str::to_string)
        })
        .sorted()
        .last();
    match adapter_name {
        Some(name) => Ok(Path::from(format!("{}/{}", BLUEZ_ROOT_PATH, name))),
        None => Err(BluetoothError::NoAdapter),
    }
}

fn ensure_powered(bus: &Arc<BusConnection>, adapter_path: Path<'static>) -> Result<(), BluetoothError> {
    let adapter = AdapterHandle::new(bus.clone(), adapter_path);
    if !adapter.powered()? {
        info!("powering on adapter {}", adapter.path());
        adapter.set_powered(true)?;
    }
    Ok(())
}

pub(crate) fn convert_manufacturer_data(
    data: &HashMap<u16, dbus::arg::Variant<Box<dyn dbus::arg::RefArg>>>,
) -> HashMap<u16, Vec<u8>> {
    data.iter()
        .filter_map(|(&id, value)| {
            if let Some(bytes) = dbus::arg::cast::<Vec<u8>>(&value.0) {
                Some((id, bytes.to_owned()))
            } else {
                warn!("manufacturer data for id {} had unexpected type", id);
                None
            }
        })
        .collect()
}

/// Builds the `SetDiscoveryFilter` argument re-applied before every
/// `StartDiscovery` (§4.5/§6): `Transport=le`, `RSSI=-70`,
/// `DuplicateData=true`, plus `UUIDs` when the active filter is
/// service-UUID based (BlueZ can only filter by UUID at the bus level; name
/// and address filters are applied application-side in `admits_for_application`).
fn build_discovery_filter(filter: &ScanFilter) -> HashMap<&'static str, Variant<Box<dyn RefArg>>> {
    let mut properties: HashMap<&'static str, Variant<Box<dyn RefArg>>> = HashMap::new();
    properties.insert("Transport", Variant(Box::new("le".to_string())));
    properties.insert("RSSI", Variant(Box::new(DISCOVERY_RSSI_THRESHOLD)));
    properties.insert("DuplicateData", Variant(Box::new(true)));
    if let ScanFilter::ServiceUuids(uuids) = filter {
        let uuids: Vec<String> = uuids.iter().map(Uuid::to_string).collect();
        properties.insert("UUIDs", Variant(Box::new(uuids)));
    }
    properties
}

pub(crate) fn convert_service_data(data: &PropMap) -> HashMap<Uuid, Vec<u8>> {
    data.iter()
        .filter_map(|(uuid, value)| match Uuid::from_str(uuid) {
            Ok(uuid) => dbus::arg::cast::<Vec<u8>>(&value.0).map(|bytes| (uuid, bytes.to_owned())),
            Err(err) => {
                warn!("error parsing service data UUID {}: {}", uuid, err);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(address: &str) -> MacAddress {
        MacAddress::from_str(address).unwrap()
    }

    #[test]
    fn reconnect_state_insert_rejects_a_duplicate_address() {
        let mut reconnect = ReconnectState::default();
        assert!(reconnect.insert(mac("00:43:A8:23:10:F0"), PeripheralCallback::default()));
        assert!(!reconnect.insert(mac("00:43:A8:23:10:F0"), PeripheralCallback::default()));
    }

    #[test]
    fn reconnect_state_remove_clears_both_the_order_and_the_callback() {
        let mut reconnect = ReconnectState::default();
        let address = mac("00:43:A8:23:10:F0");
        reconnect.insert(address.clone(), PeripheralCallback::default());
        assert!(!reconnect.is_empty());

        assert!(reconnect.remove(&address).is_some());
        assert!(reconnect.is_empty());
        assert!(reconnect.remove(&address).is_none());
    }

    #[test]
    fn build_discovery_filter_always_sets_the_fixed_le_scan_properties() {
        let filter = build_discovery_filter(&ScanFilter::Any);
        assert_eq!(
            dbus::arg::cast::<String>(&filter["Transport"].0),
            Some(&"le".to_string())
        );
        assert_eq!(dbus::arg::cast::<i16>(&filter["RSSI"].0), Some(&-70));
        assert_eq!(dbus::arg::cast::<bool>(&filter["DuplicateData"].0), Some(&true));
        assert!(!filter.contains_key("UUIDs"));
    }

    #[test]
    fn build_discovery_filter_adds_uuids_only_for_a_service_uuid_filter() {
        let uuid = Uuid::from_str("0000180d-0000-1000-8000-00805f9b34fb").unwrap();
        let mut uuids = HashSet::new();
        uuids.insert(uuid);

        let filter = build_discovery_filter(&ScanFilter::ServiceUuids(uuids));
        let filtered_uuids = dbus::arg::cast::<Vec<String>>(&filter["UUIDs"].0).unwrap();
        assert_eq!(filtered_uuids, &vec![uuid.to_string()]);

        let filter = build_discovery_filter(&ScanFilter::Names(vec!["Sensor".to_string()]));
        assert!(!filter.contains_key("UUIDs"));
    }

    #[test]
    fn convert_manufacturer_data_drops_entries_of_the_wrong_type() {
        let mut data: HashMap<u16, Variant<Box<dyn RefArg>>> = HashMap::new();
        data.insert(0x1122, Variant(Box::new(vec![1u8, 2, 3])));
        data.insert(0x3344, Variant(Box::new("not bytes".to_string())));

        let converted = convert_manufacturer_data(&data);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[&0x1122], vec![1u8, 2, 3]);
    }

    #[test]
    fn convert_service_data_drops_entries_with_an_unparseable_uuid() {
        let mut data: PropMap = HashMap::new();
        let uuid = "0000180d-0000-1000-8000-00805f9b34fb";
        data.insert(uuid.to_string(), Variant(Box::new(vec![4u8, 5, 6])));
        data.insert("not-a-uuid".to_string(), Variant(Box::new(vec![7u8])));

        let converted = convert_service_data(&data);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[&Uuid::from_str(uuid).unwrap()], vec![4u8, 5, 6]);
    }
}
