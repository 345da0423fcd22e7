pub mod messages;

pub use messages::*;

use serde::{Deserialize, Serialize};

// Inbound event names (device -> panel)
pub const EVT_STATUS: &str = "manual_control_status";
pub const EVT_DEVICE_CONFIG: &str = "current_device_config";
pub const EVT_MANUAL_ACK: &str = "manual_command_ack";
pub const EVT_LOOP_ACK: &str = "manual_loop_cfg_ack";
pub const EVT_MODE_ACK: &str = "changed_mode";

// Outbound event names (panel -> device)
pub const CMD_MANUAL: &str = "manual_cmd";
pub const CMD_CONFIG_LOOP: &str = "config_loop_mode";
pub const CMD_LOOP_MODE: &str = "loop_mode";
pub const CMD_STOP_LOOP: &str = "stop_loop";
pub const CMD_RESTORE_CYCLE: &str = "restore_cycle_cfg";
pub const CMD_CHANGE_MODE: &str = "change_mode";
pub const CMD_REQUEST_STATUS: &str = "device_info";
pub const CMD_REQUEST_CONFIG: &str = "device_config";

/// Mode string the device reports while it accepts manual commands
pub const MANUAL_MODE: &str = "man";

/// Channel on which the device answers an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AckChannel {
    ManualCommand,
    LoopConfig,
    ModeChange,
}

impl AckChannel {
    pub fn event_name(&self) -> &'static str {
        match self {
            AckChannel::ManualCommand => EVT_MANUAL_ACK,
            AckChannel::LoopConfig => EVT_LOOP_ACK,
            AckChannel::ModeChange => EVT_MODE_ACK,
        }
    }

    /// Notification title used for replies on this channel
    pub fn title(&self) -> &'static str {
        match self {
            AckChannel::ManualCommand => "Manual Control",
            AckChannel::LoopConfig => "Manual Loop Control",
            AckChannel::ModeChange => "Mode Change",
        }
    }
}

/// Subscription key for inbound events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InboundKind {
    Status,
    DeviceConfig,
    Ack(AckChannel),
}

impl InboundKind {
    /// Every inbound kind a manual control panel listens to
    pub const PANEL: [InboundKind; 5] = [
        InboundKind::Ack(AckChannel::ManualCommand),
        InboundKind::Ack(AckChannel::LoopConfig),
        InboundKind::Ack(AckChannel::ModeChange),
        InboundKind::DeviceConfig,
        InboundKind::Status,
    ];

    pub fn event_name(&self) -> &'static str {
        match self {
            InboundKind::Status => EVT_STATUS,
            InboundKind::DeviceConfig => EVT_DEVICE_CONFIG,
            InboundKind::Ack(channel) => channel.event_name(),
        }
    }

    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            EVT_STATUS => Some(InboundKind::Status),
            EVT_DEVICE_CONFIG => Some(InboundKind::DeviceConfig),
            EVT_MANUAL_ACK => Some(InboundKind::Ack(AckChannel::ManualCommand)),
            EVT_LOOP_ACK => Some(InboundKind::Ack(AckChannel::LoopConfig)),
            EVT_MODE_ACK => Some(InboundKind::Ack(AckChannel::ModeChange)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_round_trip() {
        for kind in InboundKind::PANEL {
            assert_eq!(InboundKind::from_event_name(kind.event_name()), Some(kind));
        }
        assert_eq!(InboundKind::from_event_name("raw-gpio-changed"), None);
    }

    #[test]
    fn test_titles() {
        assert_eq!(AckChannel::ManualCommand.title(), "Manual Control");
        assert_eq!(AckChannel::LoopConfig.title(), "Manual Loop Control");
    }
}
