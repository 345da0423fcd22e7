use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::pins::DeviceType;
use crate::protocol::MANUAL_MODE;
use crate::session::UserIntent;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings for the manual control binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelSettings {
    pub log_level: String,
    pub device_type: DeviceType,
    pub address: u32,
    /// Mode the simulated device starts in ("man", "auto", ...)
    pub initial_mode: String,
    pub ack_delay_ms: u64,
    /// When set, the simulated device rejects every command with this info
    pub reject_info: Option<String>,
    /// Operator intents replayed against the panel
    pub script: Vec<UserIntent>,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            device_type: DeviceType::CompactController,
            address: 1,
            initial_mode: MANUAL_MODE.to_string(),
            ack_delay_ms: 20,
            reject_info: None,
            script: Vec::new(),
        }
    }
}

impl PanelSettings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::OutputBank;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let settings = PanelSettings::from_json(r#"{"device_type": "P", "address": 12}"#).unwrap();
        assert_eq!(settings.device_type, DeviceType::PicoController);
        assert_eq!(settings.address, 12);
        assert_eq!(settings.initial_mode, "man");
        assert!(settings.script.is_empty());
        assert_eq!(settings.log_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn test_script_and_level() {
        let settings = PanelSettings::from_json(
            r#"{"log_level": "debug", "script": [{"intent": "toggle", "bank": "Outputs", "bit": 31}]}"#,
        )
        .unwrap();
        assert_eq!(settings.log_filter(), log::LevelFilter::Debug);
        assert_eq!(settings.script, vec![UserIntent::Toggle { bank: OutputBank::Outputs, bit: 31 }]);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(PanelSettings::from_json("{"), Err(ConfigError::Json(_))));
        assert!(matches!(PanelSettings::load(Path::new("/nonexistent/panel.json")), Err(ConfigError::Io(_))));
    }
}
