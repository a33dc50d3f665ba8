use crate::callbacks::CentralCallback;
use crate::connection::BusConnection;
use crate::error::BluetoothError;
use crate::macaddress::address_from_object_path;
use bluez_generated::{OrgBluezAgentManager1, BLUEZ_ROOT_PATH};
use dbus::Path;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, Weak};

const AGENT_CAPABILITY: &str = "KeyboardOnly";
const AGENT_PATH: &str = "/io/ble_central/agent";
const DEFAULT_PIN: &str = "000000";

/// Notified when BlueZ starts a pairing attempt against a given peripheral,
/// so that the peripheral's `on_bonding_started` callback (§6) can fire.
pub trait PairingSink: Send + Sync {
    fn on_pairing_started(&self);
}

/// The C7 pairing agent: a D-Bus object exported via `dbus-crossroads`
/// implementing `org.bluez.Agent1`, registered as the process' default
/// agent with `KeyboardOnly` capability (§4.7). A PIN request is answered
/// from, in order: an address-specific code set via `set_pin_code`, the
/// central's `on_pin_request` callback (§6) if one is registered, then the
/// fixed default `"000000"`.
pub struct PairingAgent {
    pins: Mutex<HashMap<String, String>>,
    sinks: Mutex<HashMap<String, Weak<dyn PairingSink>>>,
    central_callback: Mutex<CentralCallback>,
}

impl PairingAgent {
    fn new() -> Self {
        PairingAgent {
            pins: Mutex::new(HashMap::new()),
            sinks: Mutex::new(HashMap::new()),
            central_callback: Mutex::new(CentralCallback::default()),
        }
    }

    /// Updates the callback consulted by `on_pin_request` (kept in sync with
    /// `Central::set_callback`).
    pub fn set_central_callback(&self, callback: CentralCallback) {
        *self.central_callback.lock().unwrap() = callback;
    }

    /// Registers the agent on `bus` and requests it as the default agent.
    /// Returns a handle used to set PIN codes and register peripherals for
    /// pairing-started notifications.
    pub fn register(bus: &BusConnection) -> Result<Arc<PairingAgent>, BluetoothError> {
        let agent = Arc::new(PairingAgent::new());
        let path = Path::from(AGENT_PATH);

        {
            let crossroads = bus.crossroads();
            let mut crossroads = crossroads.lock().unwrap();
            let interface = crossroads.register("org.bluez.Agent1", |builder| {
                builder.method(
                    "RequestPinCode",
                    ("device",),
                    ("pincode",),
                    |_ctx, agent: &mut Arc<PairingAgent>, (device,): (Path,)| {
                        Ok((agent.pin_for(&device),))
                    },
                );
                builder.method(
                    "RequestPasskey",
                    ("device",),
                    ("passkey",),
                    |_ctx, agent: &mut Arc<PairingAgent>, (device,): (Path,)| {
                        let pin = agent.pin_for(&device);
                        let passkey: u32 = pin.parse().unwrap_or(0);
                        Ok((passkey,))
                    },
                );
                builder.method(
                    "RequestConfirmation",
                    ("device", "passkey"),
                    (),
                    |_ctx, agent: &mut Arc<PairingAgent>, (device, _passkey): (Path, u32)| {
                        agent.notify_pairing_started(&device);
                        Ok(())
                    },
                );
                builder.method(
                    "AuthorizeService",
                    ("device", "uuid"),
                    (),
                    |_ctx, _agent: &mut Arc<PairingAgent>, (_device, _uuid): (Path, String)| {
                        Ok(())
                    },
                );
                builder.method(
                    "Cancel",
                    (),
                    (),
                    |_ctx, _agent: &mut Arc<PairingAgent>, (): ()| {
                        debug!("pairing agent: Cancel");
                        Ok(())
                    },
                );
                builder.method(
                    "Release",
                    (),
                    (),
                    |_ctx, _agent: &mut Arc<PairingAgent>, (): ()| {
                        debug!("pairing agent: Release");
                        Ok(())
                    },
                );
            });
            crossroads.insert(path.clone(), &[interface], agent.clone());
        }

        let manager_proxy = bus.proxy(BLUEZ_ROOT_PATH);
        manager_proxy.register_agent(path.clone(), AGENT_CAPABILITY)?;
        manager_proxy.request_default_agent(path)?;
        info!("registered pairing agent with capability {}", AGENT_CAPABILITY);
        Ok(agent)
    }

    /// Sets the PIN to offer for `address`. Must be exactly 6 decimal
    /// digits; returns `false` (and leaves any previous PIN untouched) if
    /// `address` or `pin` is invalid.
    pub fn set_pin_code(&self, address: &str, pin: &str) -> bool {
        if crate::macaddress::MacAddress::from_str(address).is_err() {
            return false;
        }
        if pin.len() != 6 || !pin.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        self.pins
            .lock()
            .unwrap()
            .insert(address.to_string(), pin.to_string());
        true
    }

    pub fn register_peripheral(&self, address: String, sink: Weak<dyn PairingSink>) {
        self.sinks.lock().unwrap().insert(address, sink);
    }

    pub fn unregister_peripheral(&self, address: &str) {
        self.sinks.lock().unwrap().remove(address);
    }

    fn pin_for(&self, device: &Path) -> String {
        let address = address_from_object_path(device);
        self.notify_pairing_started(device);
        match address {
            Some(address) => {
                if let Some(pin) = self.pins.lock().unwrap().get(address.as_str()).cloned() {
                    return pin;
                }
                if let Some(on_pin_request) =
                    self.central_callback.lock().unwrap().on_pin_request.clone()
                {
                    return on_pin_request(address);
                }
                DEFAULT_PIN.to_string()
            }
            None => {
                warn!("pairing request for unparseable device path {}", device);
                DEFAULT_PIN.to_string()
            }
        }
    }

    fn notify_pairing_started(&self, device: &Path) {
        if let Some(address) = address_from_object_path(device) {
            if let Some(sink) = self.sinks.lock().unwrap().get(address.as_str()).and_then(Weak::upgrade) {
                sink.on_pairing_started();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    const DEVICE_PATH: &str = "/org/bluez/hci0/dev_00_43_A8_23_10_F0";

    #[test]
    fn set_pin_code_rejects_bad_address_or_pin() {
        let agent = PairingAgent::new();
        assert!(!agent.set_pin_code("not-an-address", "123456"));
        assert!(!agent.set_pin_code("00:43:A8:23:10:F0", "12345"));
        assert!(!agent.set_pin_code("00:43:A8:23:10:F0", "12a456"));
        assert!(agent.set_pin_code("00:43:A8:23:10:F0", "123456"));
    }

    #[test]
    fn pin_for_prefers_a_stored_pin_over_the_callback_and_default() {
        let agent = PairingAgent::new();
        agent.set_pin_code("00:43:A8:23:10:F0", "654321");
        agent.set_central_callback(CentralCallback {
            on_pin_request: Some(Arc::new(|_address| "111111".to_string())),
            ..Default::default()
        });

        let pin = agent.pin_for(&Path::from(DEVICE_PATH));
        assert_eq!(pin, "654321");
    }

    #[test]
    fn pin_for_falls_back_to_the_callback_when_no_pin_is_stored() {
        let agent = PairingAgent::new();
        agent.set_central_callback(CentralCallback {
            on_pin_request: Some(Arc::new(|address| format!("cb-for-{}", address))),
            ..Default::default()
        });

        let pin = agent.pin_for(&Path::from(DEVICE_PATH));
        assert_eq!(pin, "cb-for-00:43:A8:23:10:F0");
    }

    #[test]
    fn pin_for_falls_back_to_the_default_when_nothing_else_is_set() {
        let agent = PairingAgent::new();
        assert_eq!(agent.pin_for(&Path::from(DEVICE_PATH)), DEFAULT_PIN);
    }

    struct RecordingSink(Arc<AtomicBool>);

    impl PairingSink for RecordingSink {
        fn on_pairing_started(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn pin_for_notifies_the_registered_peripheral() {
        let agent = PairingAgent::new();
        let notified = Arc::new(AtomicBool::new(false));
        let sink: Arc<dyn PairingSink> = Arc::new(RecordingSink(notified.clone()));
        agent.register_peripheral("00:43:A8:23:10:F0".to_string(), Arc::downgrade(&sink));

        agent.pin_for(&Path::from(DEVICE_PATH));

        assert!(notified.load(Ordering::SeqCst));
    }

    #[test]
    fn unregister_peripheral_stops_further_notifications() {
        let agent = PairingAgent::new();
        let notified = Arc::new(AtomicBool::new(false));
        let sink: Arc<dyn PairingSink> = Arc::new(RecordingSink(notified.clone()));
        agent.register_peripheral("00:43:A8:23:10:F0".to_string(), Arc::downgrade(&sink));
        agent.unregister_peripheral("00:43:A8:23:10:F0");

        agent.pin_for(&Path::from(DEVICE_PATH));

        assert!(!notified.load(Ordering::SeqCst));
    }
}
