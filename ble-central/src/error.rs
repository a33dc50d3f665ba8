use crate::macaddress::ParseMacAddressError;
use crate::status::GattStatus;
use thiserror::Error;
use uuid::Uuid;

/// An error carrying out a Bluetooth operation.
#[derive(Debug, Error)]
pub enum BluetoothError {
    /// No Bluetooth adapter was found on the system.
    #[error("no Bluetooth adapter found")]
    NoAdapter,
    /// There was an error talking to the BlueZ daemon over D-Bus.
    #[error(transparent)]
    DbusError(#[from] dbus::Error),
    /// No service or characteristic was found for some UUID.
    #[error("service or characteristic UUID {uuid} not found")]
    UuidNotFound { uuid: Uuid },
    /// Error parsing a UUID from a string.
    #[error("error parsing UUID string: {0}")]
    UuidParseError(#[from] uuid::Error),
    /// A required property of some device or other object was not found.
    #[error("required property {0} missing")]
    RequiredPropertyMissing(&'static str),
    /// Service discovery didn't happen within the time limit.
    #[error("service discovery timed out")]
    ServiceDiscoveryTimedOut,
    /// Error parsing a `MacAddress` from a string.
    #[error(transparent)]
    MacAddressParseError(#[from] ParseMacAddressError),
    /// The supplied PIN was not exactly 6 decimal digits.
    #[error("PIN must be exactly 6 decimal digits")]
    InvalidPin,
}

/// Classification of an error returned from a BlueZ D-Bus call, derived from
/// the D-Bus error name rather than its (locale-dependent, free-form)
/// message. Unrecognized names fall back to `Other`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    InvalidArguments,
    NotReady,
    NotSupported,
    NotPermitted,
    NotAuthorized,
    Failed,
    InProgress,
    InvalidOffset,
    AlreadyConnected,
    AlreadyExists,
    DoesNotExist,
    /// "No discovery started" — treated as success by the scan engine.
    NoDiscoveryStarted,
    /// "No reply within specified time" — pairing timeout.
    NoReply,
    Other(String),
}

impl ErrorKind {
    /// Classifies an error returned through the C3 handle layer, which
    /// always wraps the underlying `dbus::Error` in
    /// [`BluetoothError::DbusError`].
    pub fn classify_bluetooth(error: &BluetoothError) -> Self {
        match error {
            BluetoothError::DbusError(inner) => Self::classify(inner),
            other => ErrorKind::Other(other.to_string()),
        }
    }

    pub fn classify(error: &dbus::Error) -> Self {
        let name = error.name().unwrap_or_default();
        let message = error.message().unwrap_or_default();
        match name {
            "org.bluez.Error.InvalidArguments" => ErrorKind::InvalidArguments,
            "org.bluez.Error.NotReady" => ErrorKind::NotReady,
            "org.bluez.Error.NotSupported" => ErrorKind::NotSupported,
            "org.bluez.Error.NotPermitted" => ErrorKind::NotPermitted,
            "org.bluez.Error.NotAuthorized" => ErrorKind::NotAuthorized,
            "org.bluez.Error.Failed" => {
                if message.contains("No discovery started") {
                    ErrorKind::NoDiscoveryStarted
                } else {
                    ErrorKind::Failed
                }
            }
            "org.bluez.Error.InProgress" => ErrorKind::InProgress,
            "org.bluez.Error.InvalidOffset" => ErrorKind::InvalidOffset,
            "org.bluez.Error.AlreadyConnected" => ErrorKind::AlreadyConnected,
            "org.bluez.Error.AlreadyExists" => ErrorKind::AlreadyExists,
            "org.bluez.Error.DoesNotExist" => ErrorKind::DoesNotExist,
            "org.freedesktop.DBus.Error.NoReply" => ErrorKind::NoReply,
            _ => ErrorKind::Other(message.to_string()),
        }
    }

    /// Maps a characteristic read/write/notify failure to its status code.
    /// `is_write` distinguishes `NotPermitted` on a write from one on a read,
    /// since the daemon reports the same error name for both.
    pub fn to_gatt_status(&self, is_write: bool) -> GattStatus {
        match self {
            ErrorKind::NotSupported => GattStatus::RequestNotSupported,
            ErrorKind::NotPermitted if is_write => GattStatus::WriteNotPermitted,
            ErrorKind::NotPermitted => GattStatus::ReadNotPermitted,
            ErrorKind::NotAuthorized => GattStatus::InsufficientAuthentication,
            ErrorKind::InvalidOffset => GattStatus::GattError,
            ErrorKind::NotReady | ErrorKind::Failed | ErrorKind::InProgress => {
                GattStatus::GattError
            }
            _ => GattStatus::GattError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dbus_error(name: &str, message: &str) -> dbus::Error {
        dbus::Error::new_custom(name, message)
    }

    #[test]
    fn classifies_known_bluez_errors() {
        assert_eq!(
            ErrorKind::classify(&dbus_error("org.bluez.Error.NotPermitted", "nope")),
            ErrorKind::NotPermitted
        );
        assert_eq!(
            ErrorKind::classify(&dbus_error("org.bluez.Error.NotReady", "nope")),
            ErrorKind::NotReady
        );
    }

    #[test]
    fn no_discovery_started_is_distinguished_from_generic_failed() {
        assert_eq!(
            ErrorKind::classify(&dbus_error(
                "org.bluez.Error.Failed",
                "No discovery started"
            )),
            ErrorKind::NoDiscoveryStarted
        );
        assert_eq!(
            ErrorKind::classify(&dbus_error("org.bluez.Error.Failed", "something else")),
            ErrorKind::Failed
        );
    }

    #[test]
    fn unrecognized_name_falls_back_to_other() {
        match ErrorKind::classify(&dbus_error("org.bluez.Error.Bogus", "mystery")) {
            ErrorKind::Other(message) => assert_eq!(message, "mystery"),
            other => panic!("expected Other, got {:?}", other),
        }
    }

    #[test]
    fn gatt_status_mapping_matches_table() {
        assert_eq!(
            ErrorKind::NotPermitted.to_gatt_status(false),
            GattStatus::ReadNotPermitted
        );
        assert_eq!(
            ErrorKind::NotPermitted.to_gatt_status(true),
            GattStatus::WriteNotPermitted
        );
        assert_eq!(
            ErrorKind::NotAuthorized.to_gatt_status(false),
            GattStatus::InsufficientAuthentication
        );
        assert_eq!(
            ErrorKind::NotSupported.to_gatt_status(false),
            GattStatus::RequestNotSupported
        );
    }
}
