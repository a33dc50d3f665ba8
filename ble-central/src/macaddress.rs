use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// An error parsing a MAC address from a string.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("invalid MAC address '{0}'")]
pub struct ParseMacAddressError(String);

/// MAC address of a Bluetooth peripheral, always held in canonical
/// colon-separated uppercase form (e.g. `00:43:A8:23:10:F0`).
///
/// This maps bijectively to the BlueZ object path suffix
/// `dev_XX_XX_XX_XX_XX_XX`.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MacAddress(String);

impl MacAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `dev_XX_XX_XX_XX_XX_XX` path fragment BlueZ uses in object paths.
    pub fn to_path_segment(&self) -> String {
        format!("dev_{}", self.0.replace(':', "_"))
    }
}

impl Display for MacAddress {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validates the canonical MAC address form required by this library:
/// length exactly 17; positions 0,1,3,4,6,7,9,10,12,13,15,16 are `0-9` or
/// uppercase `A-F`; positions 2,5,8,11,14 are `:`. Lowercase hex and any
/// other deviation are rejected, not normalized.
pub fn is_valid_address(address: &str) -> bool {
    let bytes = address.as_bytes();
    if bytes.len() != 17 {
        return false;
    }
    for (i, &b) in bytes.iter().enumerate() {
        let ok = if matches!(i, 2 | 5 | 8 | 11 | 14) {
            b == b':'
        } else {
            b.is_ascii_digit() || (b'A'..=b'F').contains(&b)
        };
        if !ok {
            return false;
        }
    }
    true
}

impl FromStr for MacAddress {
    type Err = ParseMacAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if is_valid_address(s) {
            Ok(MacAddress(s.to_string()))
        } else {
            Err(ParseMacAddressError(s.to_string()))
        }
    }
}

/// Recovers a `MacAddress` from a daemon object path such as
/// `/org/bluez/hci0/dev_00_43_A8_23_10_F0`, by locating the `dev_` segment
/// and substituting colons for underscores.
pub fn address_from_object_path(path: &str) -> Option<MacAddress> {
    let segment = path.split('/').find(|part| part.starts_with("dev_"))?;
    let hex = segment.strip_prefix("dev_")?;
    let candidate = hex.replace('_', ":");
    MacAddress::from_str(&candidate).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_canonical_address() {
        assert!(is_valid_address("00:43:A8:23:10:F0"));
    }

    #[test]
    fn rejects_lowercase() {
        assert!(!is_valid_address("00:43:a8:23:10:f0"));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(!is_valid_address("00:43:A8:23:10:F"));
        assert!(!is_valid_address("00:43:A8:23:10:F000"));
    }

    #[test]
    fn rejects_bad_separators() {
        assert!(!is_valid_address("00-43-A8-23-10-F0"));
    }

    #[test]
    fn rejects_non_hex_digits() {
        assert!(!is_valid_address("00:43:A8:23:10:GZ"));
    }

    #[test]
    fn recovers_address_from_object_path() {
        let addr = address_from_object_path("/org/bluez/hci0/dev_00_43_A8_23_10_F0").unwrap();
        assert_eq!(addr.as_str(), "00:43:A8:23:10:F0");
    }

    #[test]
    fn object_path_without_dev_segment_is_none() {
        assert!(address_from_object_path("/org/bluez/hci0").is_none());
    }

    #[test]
    fn path_segment_round_trips() {
        let addr = MacAddress::from_str("00:43:A8:23:10:F0").unwrap();
        assert_eq!(addr.to_path_segment(), "dev_00_43_A8_23_10_F0");
    }
}
