use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::mask::Mask;
use crate::pins::DeviceType;
use super::*;

/// Pair of masks as carried in a status push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MaskPair {
    pub mask_0: Mask,
    pub mask_1: Mask,
}

impl MaskPair {
    pub fn as_array(&self) -> [Mask; 2] {
        [self.mask_0, self.mask_1]
    }
}

impl From<[Mask; 2]> for MaskPair {
    fn from(masks: [Mask; 2]) -> Self {
        Self { mask_0: masks[0], mask_1: masks[1] }
    }
}

/// Authoritative device status push
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    #[serde(rename = "deviceType", default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<DeviceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out: Option<MaskPair>,
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<MaskPair>,
    /// Galvo axis positions keyed by channel id
    #[serde(default, deserialize_with = "lenient_positions", skip_serializing_if = "BTreeMap::is_empty")]
    pub pos: BTreeMap<u8, i32>,
    /// Galvo loop configuration, opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_cfg: Option<Value>,
}

impl DeviceStatus {
    /// Decode a status payload field by field. Returns `None` only for non-objects;
    /// a field of unexpected shape is dropped without affecting the others.
    pub fn parse(payload: &Value) -> Option<Self> {
        let fields = payload.as_object()?;
        Some(Self {
            device_type: field(fields, "deviceType"),
            address: field(fields, "address"),
            mode: field(fields, "mode"),
            out: field(fields, "out"),
            inputs: field(fields, "in"),
            pos: fields.get("pos").map(positions_from).unwrap_or_default(),
            loop_cfg: fields.get("loop_cfg").filter(|v| !v.is_null()).cloned(),
        })
    }

    /// Both mask pairs, when the push carries digital I/O
    pub fn masks(&self) -> Option<([Mask; 2], [Mask; 2])> {
        match (self.out, self.inputs) {
            (Some(out), Some(inputs)) => Some((out.as_array(), inputs.as_array())),
            _ => None,
        }
    }
}

fn field<T: DeserializeOwned>(fields: &Map<String, Value>, key: &str) -> Option<T> {
    let value = fields.get(key).filter(|v| !v.is_null())?;
    match T::deserialize(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            log::warn!("Ignoring status field {}: {}", key, e);
            None
        }
    }
}

/// Galvo positions from an object keyed by channel id. Numeric values are rounded
/// to the nearest step; entries that are not a channel/number pair are skipped.
fn positions_from(value: &Value) -> BTreeMap<u8, i32> {
    let Some(entries) = value.as_object() else {
        log::warn!("Ignoring galvo positions that are not an object: {}", value);
        return BTreeMap::new();
    };

    entries
        .iter()
        .filter_map(|(channel, pos)| {
            let channel = channel.parse::<u8>().ok()?;
            let pos = match pos.as_i64() {
                Some(pos) => i32::try_from(pos).ok()?,
                None => {
                    let pos = pos.as_f64()?.round();
                    if pos < i32::MIN as f64 || pos > i32::MAX as f64 {
                        return None;
                    }
                    pos as i32
                }
            };
            Some((channel, pos))
        })
        .collect()
}

fn lenient_positions<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<u8, i32>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(positions_from(&value))
}

/// Body of a `manual_cmd` intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ManualCommand {
    /// Full resulting Out pair, never a delta
    Digital { gpio: Mask, output: Mask },
    GalvoMove { id: u8, pos: i32 },
}

/// Wrapper the device expects around galvo loop payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleEnvelope {
    pub address: u32,
    #[serde(rename = "deviceType")]
    pub device_type: DeviceType,
    pub data: Value,
}

impl CycleEnvelope {
    pub fn galvo(address: u32, data: Value) -> Self {
        Self { address, device_type: DeviceType::GalvoController, data }
    }
}

/// Intent sent to the device collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Manual(ManualCommand),
    ConfigLoopMode(CycleEnvelope),
    LoopMode(CycleEnvelope),
    StopLoop,
    RestoreCycleConfig,
    ChangeMode(String),
    RequestStatus,
    RequestConfig,
}

impl Outbound {
    pub fn event_name(&self) -> &'static str {
        match self {
            Outbound::Manual(_) => CMD_MANUAL,
            Outbound::ConfigLoopMode(_) => CMD_CONFIG_LOOP,
            Outbound::LoopMode(_) => CMD_LOOP_MODE,
            Outbound::StopLoop => CMD_STOP_LOOP,
            Outbound::RestoreCycleConfig => CMD_RESTORE_CYCLE,
            Outbound::ChangeMode(_) => CMD_CHANGE_MODE,
            Outbound::RequestStatus => CMD_REQUEST_STATUS,
            Outbound::RequestConfig => CMD_REQUEST_CONFIG,
        }
    }

    /// JSON body of the event; `None` for payload-less events
    pub fn payload(&self) -> Option<Value> {
        match self {
            Outbound::Manual(cmd) => serde_json::to_value(cmd).ok(),
            Outbound::ConfigLoopMode(envelope) => Some(json!({ "cycle_cfg": envelope })),
            Outbound::LoopMode(envelope) => Some(json!({ "cycle_cmd": envelope })),
            Outbound::ChangeMode(mode) => Some(Value::String(mode.clone())),
            Outbound::StopLoop
            | Outbound::RestoreCycleConfig
            | Outbound::RequestStatus
            | Outbound::RequestConfig => None,
        }
    }

    /// Channel the device answers this intent on, if it answers at all
    pub fn ack_channel(&self) -> Option<AckChannel> {
        match self {
            Outbound::Manual(_) | Outbound::StopLoop => Some(AckChannel::ManualCommand),
            Outbound::ConfigLoopMode(_) | Outbound::LoopMode(_) | Outbound::RestoreCycleConfig => {
                Some(AckChannel::LoopConfig)
            }
            Outbound::ChangeMode(_) => Some(AckChannel::ModeChange),
            Outbound::RequestStatus | Outbound::RequestConfig => None,
        }
    }
}

/// Event received from the device collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Status(Value),
    DeviceConfig(Value),
    /// `None` when the device produced no reply body
    Ack(AckChannel, Option<Value>),
}

impl Inbound {
    /// Decode a named event. Unknown names yield `None`.
    pub fn from_event(name: &str, payload: Option<Value>) -> Option<Self> {
        let kind = InboundKind::from_event_name(name)?;
        Some(match kind {
            InboundKind::Status => Inbound::Status(payload.unwrap_or(Value::Null)),
            InboundKind::DeviceConfig => Inbound::DeviceConfig(payload.unwrap_or(Value::Null)),
            InboundKind::Ack(channel) => Inbound::Ack(channel, payload.filter(|v| !v.is_null())),
        })
    }

    pub fn kind(&self) -> InboundKind {
        match self {
            Inbound::Status(_) => InboundKind::Status,
            Inbound::DeviceConfig(_) => InboundKind::DeviceConfig,
            Inbound::Ack(channel, _) => InboundKind::Ack(*channel),
        }
    }

    pub fn event_name(&self) -> &'static str {
        self.kind().event_name()
    }

    pub fn status(status: &DeviceStatus) -> Self {
        Inbound::Status(serde_json::to_value(status).unwrap_or(Value::Null))
    }

    pub fn ack(channel: AckChannel, reply: Reply) -> Self {
        Inbound::Ack(channel, serde_json::to_value(reply).ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "KO")]
    Ko,
}

/// Acknowledgment body `{status, info}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub status: ReplyStatus,
    pub info: String,
}

impl Reply {
    pub fn ok(info: impl Into<String>) -> Self {
        Self { status: ReplyStatus::Ok, info: info.into() }
    }

    pub fn ko(info: impl Into<String>) -> Self {
        Self { status: ReplyStatus::Ko, info: info.into() }
    }
}

/// Classified acknowledgment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    Accepted(String),
    Rejected(String),
    NoResponse,
    Malformed,
}

/// Classify an acknowledgment body. Never fails: shape mismatches become `Malformed`.
pub fn parse_reply(payload: Option<&Value>) -> AckOutcome {
    let payload = match payload {
        None | Some(Value::Null) => return AckOutcome::NoResponse,
        Some(value) => value,
    };

    match Reply::deserialize(payload) {
        Ok(Reply { status: ReplyStatus::Ok, info }) => AckOutcome::Accepted(info),
        Ok(Reply { status: ReplyStatus::Ko, info }) => AckOutcome::Rejected(info),
        Err(_) => AckOutcome::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_controller_status() {
        let payload = json!({
            "deviceType": "C",
            "address": 3,
            "mode": "man",
            "out": {"mask_0": 8, "mask_1": -2147483648i64},
            "in": {"mask_0": 0, "mask_1": 4294967295u64}
        });
        let status = DeviceStatus::parse(&payload).unwrap();
        assert_eq!(status.device_type, Some(DeviceType::CompactController));
        let (out, inputs) = status.masks().unwrap();
        assert_eq!(out[0].bits(), 8);
        assert_eq!(out[1].bits(), 0x8000_0000);
        assert_eq!(inputs[1].bits(), 0xFFFF_FFFF);
    }

    #[test]
    fn test_parse_galvo_status() {
        let payload = json!({"deviceType": "G", "mode": "auto", "pos": {"0": 1200, "1": -40}, "loop_cfg": {"period": 10}});
        let status = DeviceStatus::parse(&payload).unwrap();
        assert_eq!(status.pos.get(&0), Some(&1200));
        assert_eq!(status.pos.get(&1), Some(&-40));
        assert!(status.masks().is_none());
        assert_eq!(status.loop_cfg, Some(json!({"period": 10})));
    }

    #[test]
    fn test_parse_status_rejects_non_objects() {
        assert!(DeviceStatus::parse(&Value::Null).is_none());
        assert!(DeviceStatus::parse(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_parse_status_drops_bad_fields_only() {
        let status = DeviceStatus::parse(&json!({
            "deviceType": "G",
            "mode": "man",
            "pos": [100, 200],
            "out": {"mask_0": "pin"}
        }))
        .unwrap();
        assert_eq!(status.device_type, Some(DeviceType::GalvoController));
        assert_eq!(status.mode.as_deref(), Some("man"));
        assert!(status.pos.is_empty());
        assert!(status.out.is_none());

        let status = DeviceStatus::parse(&json!({"pos": {"0": 12.5, "1": -3, "x": 4, "2": null}})).unwrap();
        assert_eq!(status.pos, BTreeMap::from([(0, 13), (1, -3)]));

        // Serde path agrees with the field-by-field decoder
        let status: DeviceStatus = serde_json::from_value(json!({"mode": "auto", "pos": "none"})).unwrap();
        assert_eq!(status.mode.as_deref(), Some("auto"));
        assert!(status.pos.is_empty());
    }

    #[test]
    fn test_manual_command_payloads() {
        let cmd = Outbound::Manual(ManualCommand::Digital { gpio: Mask::new(8), output: Mask::new(0x8000_0000) });
        assert_eq!(cmd.event_name(), CMD_MANUAL);
        assert_eq!(cmd.payload(), Some(json!({"gpio": 8, "output": 2147483648u64})));

        let mv = Outbound::Manual(ManualCommand::GalvoMove { id: 1, pos: 512 });
        assert_eq!(mv.payload(), Some(json!({"id": 1, "pos": 512})));
    }

    #[test]
    fn test_loop_envelopes() {
        let env = CycleEnvelope::galvo(7, json!({"steps": 4}));
        let cfg = Outbound::ConfigLoopMode(env.clone()).payload().unwrap();
        assert_eq!(cfg, json!({"cycle_cfg": {"address": 7, "deviceType": "G", "data": {"steps": 4}}}));
        let cmd = Outbound::LoopMode(env).payload().unwrap();
        assert!(cmd.get("cycle_cmd").is_some());
        assert_eq!(Outbound::StopLoop.payload(), None);
        assert_eq!(Outbound::StopLoop.ack_channel(), Some(AckChannel::ManualCommand));
        assert_eq!(Outbound::RestoreCycleConfig.ack_channel(), Some(AckChannel::LoopConfig));
    }

    #[test]
    fn test_parse_reply() {
        assert_eq!(parse_reply(None), AckOutcome::NoResponse);
        assert_eq!(parse_reply(Some(&Value::Null)), AckOutcome::NoResponse);
        assert_eq!(parse_reply(Some(&json!({"status": "OK", "info": "done"}))), AckOutcome::Accepted("done".into()));
        assert_eq!(parse_reply(Some(&json!({"status": "KO", "info": "busy"}))), AckOutcome::Rejected("busy".into()));
        assert_eq!(parse_reply(Some(&json!({"status": "MAYBE", "info": ""}))), AckOutcome::Malformed);
        assert_eq!(parse_reply(Some(&json!({"status": "OK"}))), AckOutcome::Malformed);
        assert_eq!(parse_reply(Some(&json!("OK"))), AckOutcome::Malformed);
    }

    #[test]
    fn test_inbound_from_event() {
        let ack = Inbound::from_event(EVT_LOOP_ACK, Some(Value::Null)).unwrap();
        assert_eq!(ack, Inbound::Ack(AckChannel::LoopConfig, None));
        assert!(Inbound::from_event("unknown", None).is_none());
    }
}
