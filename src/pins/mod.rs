pub mod classifier;

pub use classifier::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Controller family reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    #[serde(rename = "G")]
    GalvoController,
    #[serde(rename = "C")]
    CompactController,
    #[serde(rename = "P")]
    PicoController,
}

impl DeviceType {
    pub fn from_tag(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "G" => Some(DeviceType::GalvoController),
            "C" => Some(DeviceType::CompactController),
            "P" => Some(DeviceType::PicoController),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            DeviceType::GalvoController => "G",
            DeviceType::CompactController => "C",
            DeviceType::PicoController => "P",
        }
    }

    /// Controllers expose digital banks; the galvo exposes position channels instead
    pub fn has_digital_banks(&self) -> bool {
        !matches!(self, DeviceType::GalvoController)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Signal direction of a pin as seen from the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

/// Named group of pins sharing one mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IoBank {
    #[serde(rename = "GPIO")]
    Gpio,
    #[serde(rename = "Outputs")]
    Outputs,
    #[serde(rename = "Inputs")]
    Inputs,
}

impl IoBank {
    pub const ALL: [IoBank; 3] = [IoBank::Gpio, IoBank::Outputs, IoBank::Inputs];

    pub fn name(&self) -> &'static str {
        match self {
            IoBank::Gpio => "GPIO",
            IoBank::Outputs => "Outputs",
            IoBank::Inputs => "Inputs",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            IoBank::Gpio | IoBank::Outputs => Direction::Output,
            IoBank::Inputs => Direction::Input,
        }
    }

    /// Writable counterpart of this bank, if the operator may drive it
    pub fn output_bank(&self) -> Option<OutputBank> {
        match self {
            IoBank::Gpio => Some(OutputBank::Gpio),
            IoBank::Outputs => Some(OutputBank::Outputs),
            IoBank::Inputs => None,
        }
    }
}

impl fmt::Display for IoBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Banks whose Out mask can be toggled: slot 0 is the GPIO half, slot 1 the dedicated outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputBank {
    Gpio = 0,
    Outputs = 1,
}

impl OutputBank {
    pub fn slot(&self) -> usize {
        *self as usize
    }

    pub fn io_bank(&self) -> IoBank {
        match self {
            OutputBank::Gpio => IoBank::Gpio,
            OutputBank::Outputs => IoBank::Outputs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_type_tags() {
        assert_eq!(DeviceType::from_tag("c"), Some(DeviceType::CompactController));
        assert_eq!(DeviceType::from_tag("X"), None);
        let json = serde_json::to_string(&DeviceType::PicoController).unwrap();
        assert_eq!(json, "\"P\"");
        let parsed: DeviceType = serde_json::from_str("\"G\"").unwrap();
        assert_eq!(parsed, DeviceType::GalvoController);
        assert!(!parsed.has_digital_banks());
    }

    #[test]
    fn test_bank_directions() {
        assert_eq!(IoBank::Gpio.direction(), Direction::Output);
        assert_eq!(IoBank::Outputs.direction(), Direction::Output);
        assert_eq!(IoBank::Inputs.direction(), Direction::Input);
        assert_eq!(IoBank::Inputs.output_bank(), None);
        assert_eq!(OutputBank::Outputs.slot(), 1);
    }
}
