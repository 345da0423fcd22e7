use std::collections::HashSet;

use crate::protocol::{InboundKind, Outbound};
use super::{ControlError, Result};

/// The device collaborator as seen by a session
pub trait DeviceLink {
    /// Transport-level connectivity, checked before every intent
    fn is_connected(&self) -> bool;

    fn emit(&mut self, message: Outbound) -> Result<()>;

    /// Returns false when `kind` was already subscribed
    fn subscribe(&mut self, kind: InboundKind) -> bool;

    fn unsubscribe(&mut self, kind: InboundKind);
}

/// In-memory link that records everything the session does
#[derive(Debug, Clone)]
pub struct RecordingLink {
    pub connected: bool,
    pub sent: Vec<Outbound>,
    pub subscriptions: HashSet<InboundKind>,
    /// Reports connected but fails every emit
    pub drop_emits: bool,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self {
            connected: true,
            sent: Vec::new(),
            subscriptions: HashSet::new(),
            drop_emits: false,
        }
    }

    pub fn last_sent(&self) -> Option<&Outbound> {
        self.sent.last()
    }

    /// Drain recorded messages
    pub fn take_sent(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.sent)
    }
}

impl Default for RecordingLink {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceLink for RecordingLink {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn emit(&mut self, message: Outbound) -> Result<()> {
        if !self.connected || self.drop_emits {
            return Err(ControlError::TransportUnavailable);
        }
        self.sent.push(message);
        Ok(())
    }

    fn subscribe(&mut self, kind: InboundKind) -> bool {
        self.subscriptions.insert(kind)
    }

    fn unsubscribe(&mut self, kind: InboundKind) {
        self.subscriptions.remove(&kind);
    }
}
