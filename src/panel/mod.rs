//! In-process event channel between a manual control panel and its device.
//!
//! The panel task owns one [`ManualControlSession`](crate::session::ManualControlSession)
//! and is fed device events and operator intents through a single queue, so the
//! session always sees them one at a time in arrival order.

pub mod driver;

pub use driver::*;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::protocol::{Inbound, InboundKind, Outbound};
use crate::session::{ControlError, DeviceLink, UserIntent};

#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("Panel is not running")]
    NotRunning,

    #[error("Panel task failed: {0}")]
    TaskFailed(String),

    #[error("Timed out waiting for panel to stop")]
    StopTimeout,
}

/// Item on the panel queue
#[derive(Debug, Clone)]
pub enum PanelInput {
    Device(Inbound),
    Operator(UserIntent),
}

/// Cloneable producer side of a panel queue
#[derive(Debug, Clone)]
pub struct PanelSender {
    tx: mpsc::UnboundedSender<PanelInput>,
}

impl PanelSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<PanelInput>) -> Self {
        Self { tx }
    }

    pub fn device_event(&self, event: Inbound) -> Result<(), PanelError> {
        self.tx.send(PanelInput::Device(event)).map_err(|_| PanelError::NotRunning)
    }

    pub fn intent(&self, intent: UserIntent) -> Result<(), PanelError> {
        self.tx.send(PanelInput::Operator(intent)).map_err(|_| PanelError::NotRunning)
    }
}

/// `DeviceLink` over a tokio channel carrying outbound intents
#[derive(Debug)]
pub struct ChannelLink {
    outbound: mpsc::UnboundedSender<Outbound>,
    connected: Arc<AtomicBool>,
    subscriptions: HashSet<InboundKind>,
}

impl ChannelLink {
    pub fn new(outbound: mpsc::UnboundedSender<Outbound>, connected: Arc<AtomicBool>) -> Self {
        Self {
            outbound,
            connected,
            subscriptions: HashSet::new(),
        }
    }

    pub fn is_subscribed(&self, kind: InboundKind) -> bool {
        self.subscriptions.contains(&kind)
    }
}

impl DeviceLink for ChannelLink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed) && !self.outbound.is_closed()
    }

    fn emit(&mut self, message: Outbound) -> Result<(), ControlError> {
        self.outbound.send(message).map_err(|e| {
            log::warn!("Failed to emit {}: channel closed", e.0.event_name());
            ControlError::TransportUnavailable
        })
    }

    fn subscribe(&mut self, kind: InboundKind) -> bool {
        log::debug!("Subscribing to {}", kind.event_name());
        self.subscriptions.insert(kind)
    }

    fn unsubscribe(&mut self, kind: InboundKind) {
        log::debug!("Unsubscribing from {}", kind.event_name());
        self.subscriptions.remove(&kind);
    }
}
