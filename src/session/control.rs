use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::mask::Mask;
use crate::pins::{self, BankView, DeviceType, IoBank, OutputBank};
use crate::protocol::{
    parse_reply, AckChannel, AckOutcome, CycleEnvelope, DeviceStatus, Inbound, InboundKind, ManualCommand, Outbound,
    MANUAL_MODE,
};
use super::{ControlError, DeviceLink, Notification, Result, UserIntent, SESSION_TITLE};

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    /// No status received yet
    Disconnected,
    Connected,
    /// An intent was emitted and its reply has not been seen
    AwaitingAck(AckChannel),
}

/// Device-side I/O as last known by the panel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IoState {
    Digital { out: [Mask; 2], inputs: [Mask; 2] },
    Galvo { positions: BTreeMap<u8, i32>, loop_config: Option<Value> },
}

impl IoState {
    fn initial(device_type: DeviceType) -> Self {
        if device_type.has_digital_banks() {
            IoState::Digital { out: [Mask::EMPTY; 2], inputs: [Mask::EMPTY; 2] }
        } else {
            IoState::Galvo { positions: BTreeMap::new(), loop_config: None }
        }
    }
}

/// Manual control panel state for one device.
///
/// Driven one event at a time: status pushes and acknowledgments from the device,
/// intents from the operator. Toggles are applied locally before the device
/// confirms them; the next status push is always authoritative.
pub struct ManualControlSession<L: DeviceLink> {
    id: Uuid,
    device_type: DeviceType,
    address: u32,
    link: L,
    phase: SessionPhase,
    io: IoState,
    mode: Option<String>,
    configuration: Option<Value>,
    manual_info: Option<i32>,
    attached: bool,
    /// Subscriptions taken by `attach`, released by `detach`
    owned_subscriptions: Vec<InboundKind>,
    last_snapshot: Option<DateTime<Utc>>,
}

impl<L: DeviceLink> ManualControlSession<L> {
    pub fn new(device_type: DeviceType, address: u32, link: L) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_type,
            address,
            link,
            phase: SessionPhase::Disconnected,
            io: IoState::initial(device_type),
            mode: None,
            configuration: None,
            manual_info: None,
            attached: false,
            owned_subscriptions: Vec::new(),
            last_snapshot: None,
        }
    }

    /// Register for device events and ask for the current configuration
    pub fn attach(&mut self) {
        if self.attached {
            return;
        }
        for kind in InboundKind::PANEL {
            if self.link.subscribe(kind) {
                self.owned_subscriptions.push(kind);
            } else {
                log::debug!("{} already subscribed, leaving it on detach", kind.event_name());
            }
        }
        self.attached = true;
        log::info!("Manual control panel {} attached to device {} ({})", self.id, self.address, self.device_type);

        if let Err(e) = self.link.emit(Outbound::RequestConfig) {
            log::warn!("Failed to request device configuration: {}", e);
        }
    }

    /// Unregister every subscription taken by `attach`
    pub fn detach(&mut self) {
        if !self.attached {
            return;
        }
        for kind in std::mem::take(&mut self.owned_subscriptions) {
            self.link.unsubscribe(kind);
        }
        self.attached = false;
        log::info!("Manual control panel {} detached", self.id);
    }

    /// Dispatch one inbound event. Acknowledgments produce a notification.
    pub fn handle_inbound(&mut self, event: Inbound) -> Option<Notification> {
        if !self.attached {
            log::debug!("Dropping {} for detached panel {}", event.event_name(), self.id);
            return None;
        }

        match event {
            Inbound::Status(payload) => {
                self.apply_snapshot(&payload);
                None
            }
            Inbound::DeviceConfig(config) => {
                log::debug!("Device configuration updated");
                self.configuration = Some(config);
                None
            }
            Inbound::Ack(channel, reply) => {
                let result = self.on_acknowledgment(channel, reply.as_ref());
                Some(Notification::from_result(channel.title(), &result))
            }
        }
    }

    /// Dispatch one operator intent. Rejections produce a notification.
    pub fn handle_intent(&mut self, intent: UserIntent) -> Option<Notification> {
        let result = match intent {
            UserIntent::Toggle { bank, bit } => self.request_toggle(bank, bit).map(|_| ()),
            UserIntent::Click { bank, index } => self.on_pin_click(bank, index).map(|_| ()),
            UserIntent::GalvoMove { channel, position } => self.request_galvo_move(channel, position),
            UserIntent::ConfigureLoop { data } => self.configure_loop_mode(data),
            UserIntent::SetLoop { data } => self.set_loop_mode(data),
            UserIntent::StopLoop => self.stop_loop(),
            UserIntent::RestoreLoop => self.restore_loop_mode(),
            UserIntent::ChangeMode { mode } => self.request_mode_change(&mode),
        };

        result.err().map(|e| Notification::failure(SESSION_TITLE, &e))
    }

    /// Replace local state from a raw status push. Malformed pushes are ignored.
    pub fn apply_snapshot(&mut self, payload: &Value) -> bool {
        match DeviceStatus::parse(payload) {
            Some(status) => self.apply_status(&status),
            None => {
                log::warn!("Ignoring malformed status push: {}", payload);
                false
            }
        }
    }

    /// Replace local state from a decoded status push
    pub fn apply_status(&mut self, status: &DeviceStatus) -> bool {
        if let Some(reported) = status.device_type {
            if reported != self.device_type {
                log::warn!("Ignoring status for device type {} on a {} panel", reported, self.device_type);
                return false;
            }
        }

        if let Some(mode) = &status.mode {
            self.mode = Some(mode.clone());
        }

        match &mut self.io {
            IoState::Digital { out, inputs } => {
                let Some((new_out, new_inputs)) = status.masks() else {
                    log::debug!("Status push without out/in masks, keeping current state");
                    return false;
                };
                for (slot, (old, new)) in out.iter().zip(new_out.iter()).enumerate() {
                    if old != new {
                        let (set_bits, cleared_bits) = old.changes_to(*new);
                        log::debug!("Out[{}] {} -> {} set={:?} cleared={:?}", slot, old, new, set_bits, cleared_bits);
                    }
                }
                *out = new_out;
                *inputs = new_inputs;
            }
            IoState::Galvo { positions, loop_config } => {
                *positions = status.pos.clone();
                if status.loop_cfg.is_some() {
                    *loop_config = status.loop_cfg.clone();
                }
            }
        }

        if self.phase == SessionPhase::Disconnected {
            log::info!("Device {} status received, panel connected", self.address);
        }
        self.phase = SessionPhase::Connected;
        self.last_snapshot = Some(Utc::now());
        true
    }

    /// Flip one Out bit locally and send the full resulting Out pair to the device.
    ///
    /// Usability of the pin is the caller's concern; see `on_pin_click`.
    pub fn request_toggle(&mut self, bank: OutputBank, bit: u8) -> Result<Mask> {
        let IoState::Digital { out, .. } = &self.io else {
            return Err(ControlError::UnsupportedDevice(self.device_type));
        };
        if !self.link.is_connected() || self.phase == SessionPhase::Disconnected {
            log::warn!("Toggle of {} pin {} rejected: backend disconnected", bank.io_bank(), bit);
            return Err(ControlError::TransportUnavailable);
        }

        let mut next = *out;
        let slot = bank.slot();
        next[slot] = next[slot].toggled(bit);
        log::info!("pin: {} bank: {} value: {}", bit, bank.io_bank(), next[slot]);

        // Local state only moves once the command is on its way
        self.send(Outbound::Manual(ManualCommand::Digital { gpio: next[0], output: next[1] }))?;
        if let IoState::Digital { out, .. } = &mut self.io {
            *out = next;
        }
        Ok(next[slot])
    }

    /// Click on a rendered pin. Returns `Ok(None)` when the click is not wired to a toggle.
    pub fn on_pin_click(&mut self, bank: IoBank, index: u8) -> Result<Option<Mask>> {
        let Some(output_bank) = bank.output_bank() else {
            log::debug!("Click on read-only bank {} ignored", bank);
            return Ok(None);
        };
        if !pins::classify(self.device_type, bank, index).usable {
            log::debug!("Clicked unusable pin {} on bank {}", index, bank);
            return Ok(None);
        }
        self.request_toggle(output_bank, index).map(Some)
    }

    /// Ask the galvo to move one axis. Local position only changes on the next status push.
    pub fn request_galvo_move(&mut self, channel: u8, position: i32) -> Result<()> {
        self.require_galvo()?;
        self.manual_info = Some(position);

        let manual = self.mode.as_deref().is_some_and(|m| m.eq_ignore_ascii_case(MANUAL_MODE));
        if !manual {
            log::warn!("Galvo move rejected, device mode is {:?}", self.mode);
            return Err(ControlError::InvalidMode);
        }
        self.ensure_connected()?;

        self.send(Outbound::Manual(ManualCommand::GalvoMove { id: channel, pos: position }))
    }

    pub fn configure_loop_mode(&mut self, data: Value) -> Result<()> {
        self.require_galvo()?;
        self.ensure_connected()?;
        self.send(Outbound::ConfigLoopMode(CycleEnvelope::galvo(self.address, data)))
    }

    pub fn set_loop_mode(&mut self, data: Value) -> Result<()> {
        self.require_galvo()?;
        self.ensure_connected()?;
        self.send(Outbound::LoopMode(CycleEnvelope::galvo(self.address, data)))
    }

    pub fn stop_loop(&mut self) -> Result<()> {
        self.require_galvo()?;
        self.ensure_connected()?;
        self.send(Outbound::StopLoop)
    }

    pub fn restore_loop_mode(&mut self) -> Result<()> {
        self.require_galvo()?;
        self.ensure_connected()?;
        self.send(Outbound::RestoreCycleConfig)
    }

    /// Ask the device to switch operating mode (e.g. "man")
    pub fn request_mode_change(&mut self, mode: &str) -> Result<()> {
        self.ensure_connected()?;
        self.send(Outbound::ChangeMode(mode.to_string()))
    }

    /// Reconcile a device reply.
    ///
    /// Rejections keep optimistic state as is. Acceptance asks for a fresh status push.
    /// Replies carry no request id, so late replies are applied like current ones.
    pub fn on_acknowledgment(&mut self, channel: AckChannel, reply: Option<&Value>) -> Result<String> {
        if self.phase == SessionPhase::AwaitingAck(channel) {
            self.phase = SessionPhase::Connected;
        }

        match parse_reply(reply) {
            AckOutcome::NoResponse => {
                log::error!("Empty reply on {}", channel.event_name());
                Err(ControlError::NoResponse)
            }
            AckOutcome::Malformed => {
                log::error!("Malformed reply on {}: {:?}", channel.event_name(), reply);
                Err(ControlError::MalformedReply)
            }
            AckOutcome::Rejected(info) => {
                log::warn!("Reply KO on {}: {}", channel.event_name(), info);
                Err(ControlError::DeviceRejected(info))
            }
            AckOutcome::Accepted(info) => {
                log::info!("Reply OK on {}: {}", channel.event_name(), info);
                if let Err(e) = self.link.emit(Outbound::RequestStatus) {
                    log::warn!("Failed to request status refresh: {}", e);
                }
                Ok(info)
            }
        }
    }

    /// Bank panels to render; empty for galvo controllers
    pub fn views(&self) -> Vec<BankView> {
        match &self.io {
            IoState::Digital { out, inputs } => pins::controller_views(self.device_type, *out, *inputs),
            IoState::Galvo { .. } => Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn io(&self) -> &IoState {
        &self.io
    }

    pub fn out_masks(&self) -> Option<[Mask; 2]> {
        match &self.io {
            IoState::Digital { out, .. } => Some(*out),
            IoState::Galvo { .. } => None,
        }
    }

    pub fn in_masks(&self) -> Option<[Mask; 2]> {
        match &self.io {
            IoState::Digital { inputs, .. } => Some(*inputs),
            IoState::Galvo { .. } => None,
        }
    }

    pub fn positions(&self) -> Option<&BTreeMap<u8, i32>> {
        match &self.io {
            IoState::Galvo { positions, .. } => Some(positions),
            IoState::Digital { .. } => None,
        }
    }

    pub fn loop_config(&self) -> Option<&Value> {
        match &self.io {
            IoState::Galvo { loop_config, .. } => loop_config.as_ref(),
            IoState::Digital { .. } => None,
        }
    }

    pub fn mode(&self) -> Option<&str> {
        self.mode.as_deref()
    }

    pub fn configuration(&self) -> Option<&Value> {
        self.configuration.as_ref()
    }

    /// Last galvo position requested by the operator, accepted or not
    pub fn manual_info(&self) -> Option<i32> {
        self.manual_info
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn last_snapshot(&self) -> Option<DateTime<Utc>> {
        self.last_snapshot
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    fn require_galvo(&self) -> Result<()> {
        if self.device_type == DeviceType::GalvoController {
            Ok(())
        } else {
            Err(ControlError::UnsupportedDevice(self.device_type))
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.link.is_connected() {
            Ok(())
        } else {
            log::warn!("Intent rejected: backend disconnected");
            Err(ControlError::TransportUnavailable)
        }
    }

    /// Emit an intent and wait for its reply channel, if any
    fn send(&mut self, message: Outbound) -> Result<()> {
        let channel = message.ack_channel();
        log::debug!("Emitting {} {:?}", message.event_name(), message.payload());
        self.link.emit(message)?;
        if let Some(channel) = channel {
            self.phase = SessionPhase::AwaitingAck(channel);
        }
        Ok(())
    }
}
