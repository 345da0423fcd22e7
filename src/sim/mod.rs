//! Simulated device endpoint.
//!
//! Stands in for the device process on the other side of the event channel:
//! digital commands are looped back from outputs to inputs, galvo moves are
//! accepted only in manual mode, and every accepted command is followed by a
//! status push.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio::time::Duration;

use crate::mask::Mask;
use crate::panel::PanelSender;
use crate::pins::DeviceType;
use crate::protocol::{AckChannel, DeviceStatus, Inbound, ManualCommand, MaskPair, Outbound, Reply, MANUAL_MODE};

/// Anything that answers panel intents with device events
#[async_trait]
pub trait DeviceEndpoint: Send {
    async fn handle(&mut self, message: Outbound) -> Vec<Inbound>;
}

pub struct SimulatedDevice {
    device_type: DeviceType,
    address: u32,
    mode: String,
    out: [Mask; 2],
    inputs: [Mask; 2],
    positions: BTreeMap<u8, i32>,
    loop_config: Option<Value>,
    reject_with: Option<String>,
    silent: bool,
    ack_delay: Duration,
}

impl SimulatedDevice {
    pub fn new(device_type: DeviceType, address: u32) -> Self {
        Self {
            device_type,
            address,
            mode: MANUAL_MODE.to_string(),
            out: [Mask::EMPTY; 2],
            inputs: [Mask::EMPTY; 2],
            positions: BTreeMap::new(),
            loop_config: None,
            reject_with: None,
            silent: false,
            ack_delay: Duration::ZERO,
        }
    }

    pub fn with_mode(mut self, mode: &str) -> Self {
        self.mode = mode.to_string();
        self
    }

    /// Answer every command with KO and this info
    pub fn with_rejection(mut self, info: Option<String>) -> Self {
        self.reject_with = info;
        self
    }

    /// Answer every command with an empty reply
    pub fn with_silence(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn with_ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = delay;
        self
    }

    pub fn status(&self) -> DeviceStatus {
        let mut status = DeviceStatus {
            device_type: Some(self.device_type),
            address: Some(self.address),
            mode: Some(self.mode.clone()),
            ..Default::default()
        };
        if self.device_type.has_digital_banks() {
            status.out = Some(MaskPair::from(self.out));
            status.inputs = Some(MaskPair::from(self.inputs));
        } else {
            status.pos = self.positions.clone();
            status.loop_cfg = self.loop_config.clone();
        }
        status
    }

    fn configuration(&self) -> Value {
        json!({
            "deviceType": self.device_type,
            "address": self.address,
        })
    }

    /// Synchronous core of the endpoint
    pub fn respond(&mut self, message: Outbound) -> Vec<Inbound> {
        log::debug!("Simulated device {} received {}", self.address, message.event_name());

        if let Some(channel) = message.ack_channel() {
            if self.silent {
                return vec![Inbound::Ack(channel, None)];
            }
            if let Some(info) = &self.reject_with {
                return vec![Inbound::ack(channel, Reply::ko(info.clone()))];
            }
        }

        match message {
            Outbound::Manual(ManualCommand::Digital { gpio, output }) => {
                if !self.device_type.has_digital_banks() {
                    return vec![Inbound::ack(AckChannel::ManualCommand, Reply::ko("Unsupported command"))];
                }
                self.out = [gpio, output];
                // Outputs are wired back to inputs on the test bench
                self.inputs = [gpio, output];
                self.accept(AckChannel::ManualCommand, "Command executed")
            }
            Outbound::Manual(ManualCommand::GalvoMove { id, pos }) => {
                if self.device_type.has_digital_banks() {
                    return vec![Inbound::ack(AckChannel::ManualCommand, Reply::ko("Unsupported command"))];
                }
                if self.mode != MANUAL_MODE {
                    return vec![Inbound::ack(AckChannel::ManualCommand, Reply::ko("Device not in manual mode"))];
                }
                self.positions.insert(id, pos);
                self.accept(AckChannel::ManualCommand, "Command executed")
            }
            Outbound::ConfigLoopMode(envelope) => {
                self.loop_config = Some(envelope.data);
                self.accept(AckChannel::LoopConfig, "Loop configured")
            }
            Outbound::LoopMode(_) => {
                self.mode = "loop".to_string();
                self.accept(AckChannel::LoopConfig, "Loop started")
            }
            Outbound::StopLoop => {
                self.mode = MANUAL_MODE.to_string();
                self.accept(AckChannel::ManualCommand, "Loop stopped")
            }
            Outbound::RestoreCycleConfig => {
                self.loop_config = None;
                self.accept(AckChannel::LoopConfig, "Cycle configuration restored")
            }
            Outbound::ChangeMode(mode) => {
                self.mode = mode;
                self.accept(AckChannel::ModeChange, "Mode changed")
            }
            Outbound::RequestStatus => vec![Inbound::status(&self.status())],
            Outbound::RequestConfig => vec![Inbound::DeviceConfig(self.configuration())],
        }
    }

    fn accept(&self, channel: AckChannel, info: &str) -> Vec<Inbound> {
        vec![Inbound::ack(channel, Reply::ok(info)), Inbound::status(&self.status())]
    }
}

#[async_trait]
impl DeviceEndpoint for SimulatedDevice {
    async fn handle(&mut self, message: Outbound) -> Vec<Inbound> {
        if !self.ack_delay.is_zero() {
            tokio::time::sleep(self.ack_delay).await;
        }
        self.respond(message)
    }
}

/// Serve panel intents from `outbound` with `endpoint` until either side goes away
pub fn spawn_endpoint<E>(
    mut endpoint: E,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    panel: PanelSender,
) -> tokio::task::JoinHandle<()>
where
    E: DeviceEndpoint + 'static,
{
    tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            for event in endpoint.handle(message).await {
                if panel.device_event(event).is_err() {
                    log::info!("Panel closed, stopping device endpoint");
                    return;
                }
            }
        }
        log::info!("Outbound channel closed, stopping device endpoint");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{parse_reply, AckOutcome, CycleEnvelope};

    fn ack_outcome(events: &[Inbound]) -> AckOutcome {
        match &events[0] {
            Inbound::Ack(_, body) => parse_reply(body.as_ref()),
            other => panic!("expected ack, got {:?}", other),
        }
    }

    #[test]
    fn test_digital_command_loops_back() {
        let mut device = SimulatedDevice::new(DeviceType::CompactController, 4);
        let events = device.respond(Outbound::Manual(ManualCommand::Digital {
            gpio: Mask::new(8),
            output: Mask::new(0x8000_0000),
        }));
        assert_eq!(events.len(), 2);
        assert_eq!(ack_outcome(&events), AckOutcome::Accepted("Command executed".into()));

        let status = device.status();
        let (out, inputs) = status.masks().unwrap();
        assert_eq!(out, [Mask::new(8), Mask::new(0x8000_0000)]);
        assert_eq!(inputs, out);
    }

    #[test]
    fn test_galvo_move_outside_manual_mode() {
        let mut device = SimulatedDevice::new(DeviceType::GalvoController, 1).with_mode("auto");
        let events = device.respond(Outbound::Manual(ManualCommand::GalvoMove { id: 0, pos: 100 }));
        assert_eq!(ack_outcome(&events), AckOutcome::Rejected("Device not in manual mode".into()));
        assert!(device.status().pos.is_empty());
    }

    #[test]
    fn test_loop_flow() {
        let mut device = SimulatedDevice::new(DeviceType::GalvoController, 1);
        device.respond(Outbound::ConfigLoopMode(CycleEnvelope::galvo(1, json!({"steps": 3}))));
        assert_eq!(device.status().loop_cfg, Some(json!({"steps": 3})));
        device.respond(Outbound::LoopMode(CycleEnvelope::galvo(1, json!({}))));
        assert_eq!(device.status().mode.as_deref(), Some("loop"));
        device.respond(Outbound::StopLoop);
        assert_eq!(device.status().mode.as_deref(), Some(MANUAL_MODE));
    }

    #[test]
    fn test_rejection_and_silence() {
        let mut busy = SimulatedDevice::new(DeviceType::PicoController, 2).with_rejection(Some("busy".into()));
        let events = busy.respond(Outbound::ChangeMode("man".into()));
        assert_eq!(ack_outcome(&events), AckOutcome::Rejected("busy".into()));

        let mut mute = SimulatedDevice::new(DeviceType::PicoController, 2).with_silence(true);
        let events = mute.respond(Outbound::StopLoop);
        assert_eq!(events, vec![Inbound::Ack(AckChannel::ManualCommand, None)]);

        // Requests without a reply channel are still served
        let events = mute.respond(Outbound::RequestStatus);
        assert!(matches!(events[0], Inbound::Status(_)));
    }

    #[test]
    fn test_config_request() {
        let mut device = SimulatedDevice::new(DeviceType::CompactController, 5);
        let events = device.respond(Outbound::RequestConfig);
        assert_eq!(events, vec![Inbound::DeviceConfig(json!({"deviceType": "C", "address": 5}))]);
    }
}
