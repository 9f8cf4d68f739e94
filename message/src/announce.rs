//! Parsing of the unsolicited `A` (announcement) frame the device emits on
//! boot and in reply to `S:info`.
//!
//! The payload is ASCII of the form
//! `VelocitySP-v<fw>-<model>-<serial> <n1> <n2> <n3>`; anything that does
//! not match keeps the raw first token as the device type so unknown
//! firmware still shows up identifiably.

use std::fmt::{
    Display,
    Formatter,
};

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_type:      String,
    pub firmware_version: String,
    pub serial_number:    String,
}

impl DeviceInfo {
    pub fn parse(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload);
        let first = text.split_whitespace().next().unwrap_or("");
        let components = first.split('-').collect::<Vec<_>>();

        if components.len() >= 4 && components[0] == "VelocitySP" {
            DeviceInfo {
                device_type:      components[2].to_owned(),
                firmware_version: components[1].strip_prefix('v').unwrap_or(components[1]).to_owned(),
                serial_number:    components[3].to_owned(),
            }
        } else {
            DeviceInfo {
                device_type:      first.to_owned(),
                firmware_version: UNKNOWN.to_owned(),
                serial_number:    UNKNOWN.to_owned(),
            }
        }
    }

    /// Front-panel port count for the known switch models. Unrecognized
    /// models get the smallest configuration.
    pub fn port_count(&self) -> usize {
        let model = self.device_type.to_ascii_lowercase();

        if model.contains("9668") {
            8
        } else if model.contains("9692") {
            12
        } else {
            2
        }
    }
}

impl Display for DeviceInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (fw {}, serial {}, {} ports)",
            self.device_type,
            self.firmware_version,
            self.serial_number,
            self.port_count(),
        )
    }
}
