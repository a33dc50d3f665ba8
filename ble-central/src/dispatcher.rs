use crate::connection::BusConnection;
use crate::executor::ScheduledExecutor;
use dbus::arg::PropMap;
use dbus::blocking::stdintf::org_freedesktop_dbus::{
    ObjectManagerInterfacesAdded, PropertiesPropertiesChanged,
};
use dbus::message::SignalArgs;
use dbus::Path;
use log::{trace, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};

/// A sink for bus events routed by the dispatcher. Implemented by `Central`
/// (receives both `InterfacesAdded` and `PropertiesChanged`, filtering by
/// interface name itself) and by `Peripheral` (receives only
/// `PropertiesChanged` for its own address, §4.3).
pub trait CentralSignalSink: Send + Sync {
    fn handle_interfaces_added(&self, path: &Path<'static>, interfaces: &HashMap<String, PropMap>);
    fn handle_properties_changed(&self, path: &Path<'static>, interface: &str, changed: &PropMap);
}

pub trait PeripheralSignalSink: Send + Sync {
    fn handle_properties_changed(&self, path: &Path<'static>, interface: &str, changed: &PropMap);
}

struct Registry {
    centrals: Vec<Weak<dyn CentralSignalSink>>,
    peripherals: HashMap<String, Weak<dyn PeripheralSignalSink>>,
}

/// Process-wide signal dispatcher (C4). Subscribes once to
/// `PropertiesChanged` and `InterfacesAdded` on the shared bus connection
/// and posts each non-empty signal onto a dedicated single-threaded
/// executor, so signal handling is serialized relative to bus arrival
/// order (§4.3, §5).
///
/// Lifetime is tied to a refcount rather than to process startup/shutdown
/// (§9 "process-wide singletons"): the first `Central` constructed creates
/// it, and it is torn down once the last `Central` holding a strong
/// reference is dropped.
pub struct SignalDispatcher {
    registry: Mutex<Registry>,
    executor: ScheduledExecutor,
}

static GLOBAL: OnceLock<Mutex<Weak<SignalDispatcher>>> = OnceLock::new();

impl SignalDispatcher {
    /// Returns the process-wide dispatcher, constructing it against `bus`
    /// if this is the first live reference.
    pub fn global(bus: &Arc<BusConnection>) -> Arc<SignalDispatcher> {
        let slot = GLOBAL.get_or_init(|| Mutex::new(Weak::new()));
        let mut slot = slot.lock().unwrap();
        if let Some(existing) = slot.upgrade() {
            return existing;
        }
        let dispatcher = Arc::new(SignalDispatcher {
            registry: Mutex::new(Registry {
                centrals: Vec::new(),
                peripherals: HashMap::new(),
            }),
            executor: ScheduledExecutor::new("signal-dispatch"),
        });
        dispatcher.subscribe(bus);
        *slot = Arc::downgrade(&dispatcher);
        dispatcher
    }

    fn subscribe(self: &Arc<Self>, bus: &Arc<BusConnection>) {
        let interfaces_added_rule =
            ObjectManagerInterfacesAdded::match_rule(Some(&"org.bluez".into()), None)
                .static_clone();
        let properties_changed_rule = {
            let mut rule =
                PropertiesPropertiesChanged::match_rule(Some(&"org.bluez".into()), None)
                    .static_clone();
            rule.path_is_namespace = true;
            rule
        };

        let dispatcher = self.clone();
        bus.add_signal_match(interfaces_added_rule, move |message| {
            if let Some(added) = ObjectManagerInterfacesAdded::from_message(&message) {
                dispatcher.dispatch_interfaces_added(added);
            }
        });

        let dispatcher = self.clone();
        bus.add_signal_match(properties_changed_rule, move |message| {
            if let Some(changed) = PropertiesPropertiesChanged::from_message(&message) {
                if changed.changed_properties.is_empty() {
                    // Property removal notification; nothing to route (§4.3).
                    return;
                }
                let path = message
                    .path()
                    .map(|p| p.into_static())
                    .unwrap_or_else(|| Path::from("/"));
                dispatcher.dispatch_properties_changed(path, changed);
            }
        });
    }

    fn dispatch_interfaces_added(self: &Arc<Self>, added: ObjectManagerInterfacesAdded) {
        let dispatcher = self.clone();
        self.executor.post(move || {
            trace!("dispatching InterfacesAdded for {}", added.object);
            let mut registry = dispatcher.registry.lock().unwrap();
            registry.centrals.retain(|central| central.strong_count() > 0);
            let centrals: Vec<_> = registry
                .centrals
                .iter()
                .filter_map(Weak::upgrade)
                .collect();
            drop(registry);
            for central in centrals {
                central.handle_interfaces_added(&added.object, &added.interfaces);
            }
        });
    }

    fn dispatch_properties_changed(
        self: &Arc<Self>,
        path: Path<'static>,
        changed: PropertiesPropertiesChanged,
    ) {
        let dispatcher = self.clone();
        self.executor.post(move || {
            trace!(
                "dispatching PropertiesChanged on {} ({})",
                path,
                changed.interface_name
            );
            let mut registry = dispatcher.registry.lock().unwrap();
            registry.centrals.retain(|central| central.strong_count() > 0);
            let centrals: Vec<_> = registry
                .centrals
                .iter()
                .filter_map(Weak::upgrade)
                .collect();
            let peripheral = registry
                .peripherals
                .iter()
                .find(|(address, _)| path.contains(address.as_str()))
                .and_then(|(_, sink)| sink.upgrade());
            drop(registry);

            for central in centrals {
                central.handle_properties_changed(&path, &changed.interface_name, &changed.changed_properties);
            }
            if let Some(peripheral) = peripheral {
                peripheral.handle_properties_changed(&path, &changed.interface_name, &changed.changed_properties);
            }
        });
    }

    pub fn register_central(&self, sink: Weak<dyn CentralSignalSink>) {
        self.registry.lock().unwrap().centrals.push(sink);
    }

    pub fn register_peripheral(&self, address: String, sink: Weak<dyn PeripheralSignalSink>) {
        self.registry.lock().unwrap().peripherals.insert(address, sink);
    }

    pub fn unregister_peripheral(&self, address: &str) {
        self.registry.lock().unwrap().peripherals.remove(address);
    }
}

impl Drop for SignalDispatcher {
    fn drop(&mut self) {
        warn!("signal dispatcher torn down (last central reference dropped)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn test_dispatcher() -> Arc<SignalDispatcher> {
        Arc::new(SignalDispatcher {
            registry: Mutex::new(Registry {
                centrals: Vec::new(),
                peripherals: HashMap::new(),
            }),
            executor: ScheduledExecutor::new("test-signal-dispatch"),
        })
    }

    struct RecordingCentral {
        interfaces_added: mpsc::Sender<Path<'static>>,
        properties_changed: mpsc::Sender<Path<'static>>,
    }

    impl CentralSignalSink for RecordingCentral {
        fn handle_interfaces_added(&self, path: &Path<'static>, _interfaces: &HashMap<String, PropMap>) {
            self.interfaces_added.send(path.clone()).unwrap();
        }

        fn handle_properties_changed(&self, path: &Path<'static>, _interface: &str, _changed: &PropMap) {
            self.properties_changed.send(path.clone()).unwrap();
        }
    }

    struct RecordingPeripheral {
        properties_changed: mpsc::Sender<Path<'static>>,
    }

    impl PeripheralSignalSink for RecordingPeripheral {
        fn handle_properties_changed(&self, path: &Path<'static>, _interface: &str, _changed: &PropMap) {
            self.properties_changed.send(path.clone()).unwrap();
        }
    }

    fn changed(interface_name: &str, changed_properties: PropMap) -> PropertiesPropertiesChanged {
        PropertiesPropertiesChanged {
            interface_name: interface_name.to_string(),
            changed_properties,
            invalidated_properties: Vec::new(),
        }
    }

    #[test]
    fn interfaces_added_reaches_every_registered_central() {
        let dispatcher = test_dispatcher();
        let (tx, rx) = mpsc::channel();
        let central = Arc::new(RecordingCentral {
            interfaces_added: tx,
            properties_changed: mpsc::channel().0,
        });
        let sink: Weak<dyn CentralSignalSink> = Arc::downgrade(&central);
        dispatcher.register_central(sink);

        let path = Path::from("/org/bluez/hci0/dev_00_43_A8_23_10_F0");
        dispatcher.dispatch_interfaces_added(ObjectManagerInterfacesAdded {
            object: path.clone(),
            interfaces: HashMap::new(),
        });

        let received = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(received, path);
    }

    #[test]
    fn properties_changed_is_not_delivered_to_a_dropped_central() {
        let dispatcher = test_dispatcher();
        let (tx, rx) = mpsc::channel();
        {
            let central = Arc::new(RecordingCentral {
                interfaces_added: mpsc::channel().0,
                properties_changed: tx,
            });
            let sink: Weak<dyn CentralSignalSink> = Arc::downgrade(&central);
            dispatcher.register_central(sink);
            // `central` drops here; only the weak reference remains.
        }

        let path = Path::from("/org/bluez/hci0/dev_00_43_A8_23_10_F0");
        dispatcher.dispatch_properties_changed(path, changed("org.bluez.Device1", PropMap::new()));

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn properties_changed_routes_to_the_peripheral_whose_path_segment_matches() {
        let dispatcher = test_dispatcher();
        let (tx, rx) = mpsc::channel();
        let peripheral = Arc::new(RecordingPeripheral { properties_changed: tx });
        let sink: Weak<dyn PeripheralSignalSink> = Arc::downgrade(&peripheral);
        // Registered under the bus path-segment form, not the colon form (§4.3).
        dispatcher.register_peripheral("dev_00_43_A8_23_10_F0".to_string(), sink);

        let path = Path::from("/org/bluez/hci0/dev_00_43_A8_23_10_F0/service0010/char0011");
        dispatcher.dispatch_properties_changed(
            path.clone(),
            changed("org.bluez.GattCharacteristic1", PropMap::new()),
        );

        let received = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(received, path);
    }

    #[test]
    fn properties_changed_does_not_reach_an_unrelated_peripheral() {
        let dispatcher = test_dispatcher();
        let (tx, rx) = mpsc::channel();
        let peripheral = Arc::new(RecordingPeripheral { properties_changed: tx });
        let sink: Weak<dyn PeripheralSignalSink> = Arc::downgrade(&peripheral);
        dispatcher.register_peripheral("dev_AA_AA_AA_AA_AA_AA".to_string(), sink);

        let path = Path::from("/org/bluez/hci0/dev_00_43_A8_23_10_F0");
        dispatcher.dispatch_properties_changed(path, changed("org.bluez.Device1", PropMap::new()));

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
