pub mod control;
pub mod link;

pub use control::*;
pub use link::*;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pins::{DeviceType, IoBank, OutputBank};

/// Title for rejections raised by the session itself
pub const SESSION_TITLE: &str = "Manual Control";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("Backend disconnected")]
    TransportUnavailable,

    #[error("No response from backend")]
    NoResponse,

    #[error("{0}")]
    DeviceRejected(String),

    #[error("Galvo mode must be 'Man'")]
    InvalidMode,

    // Surfaced exactly like a missing reply
    #[error("No response from backend")]
    MalformedReply,

    #[error("Operation not available for device type {0}")]
    UnsupportedDevice(DeviceType),
}

pub type Result<T> = std::result::Result<T, ControlError>;

/// User-visible outcome of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub success: bool,
}

impl Notification {
    pub fn success(title: &str, message: impl Into<String>) -> Self {
        Self { title: title.to_string(), message: message.into(), success: true }
    }

    pub fn failure(title: &str, error: &ControlError) -> Self {
        Self { title: title.to_string(), message: error.to_string(), success: false }
    }

    pub fn from_result(title: &str, result: &Result<String>) -> Self {
        match result {
            Ok(info) => Self::success(title, info.clone()),
            Err(e) => Self::failure(title, e),
        }
    }
}

/// Operator action delivered by the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum UserIntent {
    Toggle { bank: OutputBank, bit: u8 },
    Click { bank: IoBank, index: u8 },
    GalvoMove { channel: u8, position: i32 },
    ConfigureLoop { data: Value },
    SetLoop { data: Value },
    StopLoop,
    RestoreLoop,
    ChangeMode { mode: String },
}
