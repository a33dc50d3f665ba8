use crate::error::BluetoothError;
use dbus::blocking::stdintf::org_freedesktop_dbus::ObjectManager;
use dbus::blocking::{Connection, Proxy};
use dbus::channel::MatchingReceiver;
use dbus::message::MatchRule;
use dbus::{arg, Message, Path};
use dbus_crossroads::Crossroads;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const BLUEZ_SERVICE_NAME: &str = bluez_generated::BLUEZ_SERVICE_NAME;
const DBUS_METHOD_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub type ManagedObjects =
    HashMap<Path<'static>, HashMap<String, HashMap<String, arg::Variant<Box<dyn arg::RefArg>>>>>;

/// Thin wrapper over a single blocking system-bus connection to BlueZ (§2,
/// §4.4, §5). One dedicated thread pumps incoming messages so that signal
/// arrival order is preserved; everything else (the central/peripheral
/// command and callback workers) dispatches work onto its own executor
/// instead of blocking this thread.
pub struct BusConnection {
    connection: Arc<Connection>,
    crossroads: Arc<Mutex<Crossroads>>,
    pump: Option<JoinHandle<()>>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
}

impl BusConnection {
    pub fn new() -> Result<Self, BluetoothError> {
        let connection = Arc::new(Connection::new_system()?);
        let mut crossroads = Crossroads::new();
        crossroads.set_async_support(None);
        let crossroads = Arc::new(Mutex::new(crossroads));

        let recv_connection = connection.clone();
        let recv_crossroads = crossroads.clone();
        recv_connection.start_receive(
            MatchRule::new_method_call(),
            Box::new(move |msg, conn| {
                if let Err(err) = recv_crossroads.lock().unwrap().handle_message(msg, conn) {
                    warn!("error handling incoming method call: {:?}", err);
                }
                true
            }),
        );

        let shutdown = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let pump_connection = connection.clone();
        let pump_shutdown = shutdown.clone();
        let pump = thread::Builder::new()
            .name("ble-central-bus".to_string())
            .spawn(move || {
                while !pump_shutdown.load(std::sync::atomic::Ordering::SeqCst) {
                    if let Err(err) = pump_connection.process(PROCESS_POLL_INTERVAL) {
                        warn!("error pumping D-Bus connection: {:?}", err);
                    }
                }
            })
            .expect("failed to spawn D-Bus pump thread");

        Ok(BusConnection {
            connection,
            crossroads,
            pump: Some(pump),
            shutdown,
        })
    }

    pub fn proxy<'a>(&'a self, path: impl Into<Path<'a>>) -> Proxy<'a, &'a Connection> {
        Proxy::new(
            BLUEZ_SERVICE_NAME,
            path,
            DBUS_METHOD_CALL_TIMEOUT,
            &self.connection,
        )
    }

    pub fn root_proxy(&self) -> Proxy<&Connection> {
        self.proxy("/")
    }

    pub fn get_managed_objects(&self) -> Result<ManagedObjects, BluetoothError> {
        Ok(self.root_proxy().get_managed_objects()?)
    }

    /// Registers a handler for incoming signal messages matching `rule`.
    /// Used by [`crate::dispatcher::SignalDispatcher`] to subscribe to
    /// `PropertiesChanged` and `InterfacesAdded`. Signals are broadcast
    /// messages, so the daemon only forwards them once we've asked for them
    /// with `AddMatch`; `start_receive` alone only wires up local routing.
    pub fn add_signal_match(
        &self,
        rule: MatchRule<'static>,
        handler: impl FnMut(Message) + Send + 'static,
    ) {
        if let Err(err) = self.connection.add_match_no_cb(&rule.match_str()) {
            warn!("failed to register match rule {}: {}", rule.match_str(), err);
        }
        let mut handler = handler;
        self.connection.start_receive(
            rule,
            Box::new(move |msg, _| {
                handler(msg);
                true
            }),
        );
    }

    pub fn crossroads(&self) -> Arc<Mutex<Crossroads>> {
        self.crossroads.clone()
    }

    pub fn connection(&self) -> Arc<Connection> {
        self.connection.clone()
    }
}

impl Drop for BusConnection {
    fn drop(&mut self) {
        self.shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
        if let Some(pump) = self.pump.take() {
            debug!("waiting for D-Bus pump thread to exit");
            let _ = pump.join();
        }
    }
}
