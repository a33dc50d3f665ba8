/// Status codes surfaced to the application on GATT/connection callbacks.
///
/// Integer values are preserved for wire-compatibility with existing clients
/// that expect the usual GATT status numbering.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum GattStatus {
    Success = 0,
    ReadNotPermitted = 2,
    WriteNotPermitted = 3,
    InsufficientAuthentication = 5,
    RequestNotSupported = 6,
    ConnTimeout = 8,
    InsufficientEncryption = 15,
    ConnTerminatePeerUser = 19,
    GattError = 133,
    AuthFail = 137,
}

impl GattStatus {
    pub fn value(self) -> u32 {
        self as u32
    }

    pub fn is_success(self) -> bool {
        matches!(self, GattStatus::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_match_wire_constants() {
        assert_eq!(GattStatus::Success.value(), 0);
        assert_eq!(GattStatus::ReadNotPermitted.value(), 2);
        assert_eq!(GattStatus::WriteNotPermitted.value(), 3);
        assert_eq!(GattStatus::InsufficientAuthentication.value(), 5);
        assert_eq!(GattStatus::RequestNotSupported.value(), 6);
        assert_eq!(GattStatus::ConnTimeout.value(), 8);
        assert_eq!(GattStatus::InsufficientEncryption.value(), 15);
        assert_eq!(GattStatus::ConnTerminatePeerUser.value(), 19);
        assert_eq!(GattStatus::GattError.value(), 133);
        assert_eq!(GattStatus::AuthFail.value(), 137);
    }
}
