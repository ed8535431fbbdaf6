//! Device types

use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};

/// Kind of reading a sensor reports
///
/// The wire carries a single byte; codes without a name are kept as
/// [`DeviceType::Other`] so new sensors work without a protocol change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceType {
    Unknown,
    Temperature,
    Humidity,
    Other(u8),
}

impl DeviceType {
    /// Map a wire code to a device type
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::Temperature,
            2 => Self::Humidity,
            other => Self::Other(other),
        }
    }

    /// Wire code for this device type
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Temperature => 1,
            Self::Humidity => 2,
            Self::Other(code) => code,
        }
    }

    /// Label used in status output and as a response placeholder name
    #[must_use]
    pub fn label(self) -> Cow<'static, str> {
        match self {
            Self::Unknown => Cow::Borrowed("Unknown"),
            Self::Temperature => Cow::Borrowed("Temperature"),
            Self::Humidity => Cow::Borrowed("Humidity"),
            Self::Other(code) => Cow::Owned(format!("Type{code}")),
        }
    }

    /// Parse a label produced by [`DeviceType::label`]
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Unknown" => Some(Self::Unknown),
            "Temperature" => Some(Self::Temperature),
            "Humidity" => Some(Self::Humidity),
            _ => label
                .strip_prefix("Type")
                .and_then(|code| code.parse::<u8>().ok())
                .map(Self::from_code),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Registry key: the sender address scopes the device type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceKey {
    pub addr: SocketAddr,
    pub device_type: DeviceType,
}

impl DeviceKey {
    #[must_use]
    pub const fn new(addr: SocketAddr, device_type: DeviceType) -> Self {
        Self { addr, device_type }
    }
}

/// Last known state of a registered sensor
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub chip_id: u32,
    pub device_type: DeviceType,
    pub value: f32,
    pub updated_at: DateTime<Utc>,
    pub addr: SocketAddr,
}

impl Device {
    /// A freshly registered device with no reading yet
    #[must_use]
    pub const fn registered(
        chip_id: u32,
        device_type: DeviceType,
        addr: SocketAddr,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            chip_id,
            device_type,
            value: 0.0,
            updated_at: now,
            addr,
        }
    }

    #[must_use]
    pub const fn key(&self) -> DeviceKey {
        DeviceKey::new(self.addr, self.device_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in 0..=u8::MAX {
            assert_eq!(DeviceType::from_code(code).code(), code);
        }
    }

    #[test]
    fn labels() {
        assert_eq!(DeviceType::Temperature.label(), "Temperature");
        assert_eq!(DeviceType::Other(9).to_string(), "Type9");
        assert_eq!(DeviceType::from_label("Humidity"), Some(DeviceType::Humidity));
        assert_eq!(DeviceType::from_label("Type9"), Some(DeviceType::Other(9)));
        assert_eq!(DeviceType::from_label("Type1"), Some(DeviceType::Temperature));
        assert_eq!(DeviceType::from_label("Name"), None);
        assert_eq!(DeviceType::from_label("Type999"), None);
    }
}
