use bitflags::bitflags;
use dbus::Path;
use uuid::Uuid;

bitflags! {
    /// The subset of GATT characteristic properties this client surfaces
    /// (§4.10). Unknown daemon flag strings are ignored rather than
    /// rejected, since the daemon's flag list is a superset of what a
    /// central needs to expose.
    pub struct CharacteristicProperties: u8 {
        const READ              = 0x02;
        const WRITE_NO_RESPONSE = 0x04;
        const WRITE             = 0x08;
        const NOTIFY            = 0x10;
        const INDICATE          = 0x20;
        const SIGNED_WRITE      = 0x40;
    }
}

impl CharacteristicProperties {
    /// Maps the daemon's `Flags` strings to property bits per the table in
    /// §4.10. A flag not in the table is silently dropped.
    pub fn from_flag_strings(flags: &[String]) -> Self {
        let mut properties = CharacteristicProperties::empty();
        for flag in flags {
            let bit = match flag.as_str() {
                "read" => Self::READ,
                "write-without-response" => Self::WRITE_NO_RESPONSE,
                "write" => Self::WRITE,
                "notify" => Self::NOTIFY,
                "indicate" => Self::INDICATE,
                "authenticated-signed-writes" => Self::SIGNED_WRITE,
                _ => continue,
            };
            properties.insert(bit);
        }
        properties
    }
}

/// The type of write to perform on a characteristic (§4.9, §6).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteType {
    WithResponse,
    WithoutResponse,
    Signed,
}

impl WriteType {
    /// The required property bit and the `"type"` write-option value.
    pub fn required_property(self) -> CharacteristicProperties {
        match self {
            WriteType::WithResponse => CharacteristicProperties::WRITE,
            WriteType::WithoutResponse => CharacteristicProperties::WRITE_NO_RESPONSE,
            WriteType::Signed => CharacteristicProperties::SIGNED_WRITE,
        }
    }

    pub fn option_str(self) -> &'static str {
        match self {
            WriteType::WithResponse => "request",
            WriteType::WithoutResponse => "command",
            WriteType::Signed => "command",
        }
    }
}

/// A GATT descriptor, immutable after discovery (§3).
#[derive(Clone, Debug, PartialEq)]
pub struct GattDescriptor {
    pub uuid: Uuid,
    pub path: Path<'static>,
    pub characteristic_uuid: Uuid,
}

/// A GATT characteristic, immutable after discovery (§3).
#[derive(Clone, Debug, PartialEq)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub path: Path<'static>,
    pub service_uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub descriptors: Vec<GattDescriptor>,
}

impl GattCharacteristic {
    pub fn descriptor(&self, uuid: Uuid) -> Option<&GattDescriptor> {
        self.descriptors.iter().find(|d| d.uuid == uuid)
    }
}

/// A GATT service, immutable after discovery (§3).
#[derive(Clone, Debug, PartialEq)]
pub struct GattService {
    pub uuid: Uuid,
    pub path: Path<'static>,
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    pub fn characteristic(&self, uuid: Uuid) -> Option<&GattCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_table_matches_spec() {
        let flags = vec![
            "read".to_string(),
            "write".to_string(),
            "notify".to_string(),
            "indicate".to_string(),
            "write-without-response".to_string(),
            "authenticated-signed-writes".to_string(),
        ];
        let properties = CharacteristicProperties::from_flag_strings(&flags);
        assert!(properties.contains(CharacteristicProperties::READ));
        assert!(properties.contains(CharacteristicProperties::WRITE));
        assert!(properties.contains(CharacteristicProperties::NOTIFY));
        assert!(properties.contains(CharacteristicProperties::INDICATE));
        assert!(properties.contains(CharacteristicProperties::WRITE_NO_RESPONSE));
        assert!(properties.contains(CharacteristicProperties::SIGNED_WRITE));
    }

    #[test]
    fn unknown_flags_are_ignored() {
        let flags = vec!["read".to_string(), "extended-properties".to_string()];
        let properties = CharacteristicProperties::from_flag_strings(&flags);
        assert_eq!(properties, CharacteristicProperties::READ);
    }

    #[test]
    fn write_type_required_property() {
        assert_eq!(
            WriteType::WithResponse.required_property(),
            CharacteristicProperties::WRITE
        );
        assert_eq!(
            WriteType::WithoutResponse.required_property(),
            CharacteristicProperties::WRITE_NO_RESPONSE
        );
        assert_eq!(WriteType::WithResponse.option_str(), "request");
        assert_eq!(WriteType::WithoutResponse.option_str(), "command");
    }
}
