use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use crate::pins::DeviceType;
use crate::protocol::Outbound;
use crate::session::{ManualControlSession, Notification};
use super::{ChannelLink, PanelError, PanelInput, PanelSender};

const STOP_TIMEOUT: Duration = Duration::from_secs(2);

pub type PanelSession = ManualControlSession<ChannelLink>;

/// Running manual control panel
pub struct PanelHandle {
    sender: PanelSender,
    connected: Arc<AtomicBool>,
    stop_tx: mpsc::Sender<()>,
    task_handle: tokio::task::JoinHandle<PanelSession>,
}

impl PanelHandle {
    /// Open a panel for `address`. Intents go out on `outbound`, user-visible results on `notifications`.
    pub fn start(
        device_type: DeviceType,
        address: u32,
        outbound: mpsc::UnboundedSender<Outbound>,
        notifications: mpsc::UnboundedSender<Notification>,
    ) -> Self {
        let connected = Arc::new(AtomicBool::new(true));
        let link = ChannelLink::new(outbound, connected.clone());
        let session = ManualControlSession::new(device_type, address, link);

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = mpsc::channel(1);

        let task_handle = tokio::spawn(async move {
            panel_loop(session, input_rx, stop_rx, notifications).await
        });

        Self {
            sender: PanelSender::new(input_tx),
            connected,
            stop_tx,
            task_handle,
        }
    }

    pub fn sender(&self) -> PanelSender {
        self.sender.clone()
    }

    /// Flag transport connectivity as seen by the session
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    /// Close the panel: unregister subscriptions and hand back the final session
    pub async fn stop(self) -> Result<PanelSession, PanelError> {
        let _ = self.stop_tx.send(()).await;

        match timeout(STOP_TIMEOUT, self.task_handle).await {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(e)) => Err(PanelError::TaskFailed(e.to_string())),
            Err(_) => Err(PanelError::StopTimeout),
        }
    }
}

async fn panel_loop(
    mut session: PanelSession,
    mut input_rx: mpsc::UnboundedReceiver<PanelInput>,
    mut stop_rx: mpsc::Receiver<()>,
    notifications: mpsc::UnboundedSender<Notification>,
) -> PanelSession {
    session.attach();

    loop {
        tokio::select! {
            // Queued inputs are drained before a stop request is honoured
            biased;

            input = input_rx.recv() => {
                let notification = match input {
                    Some(PanelInput::Device(event)) => {
                        if session.link().is_subscribed(event.kind()) {
                            session.handle_inbound(event)
                        } else {
                            log::debug!("No subscription for {}, dropping event", event.event_name());
                            None
                        }
                    }
                    Some(PanelInput::Operator(intent)) => session.handle_intent(intent),
                    None => break,
                };

                if let Some(notification) = notification {
                    if notifications.send(notification).is_err() {
                        log::warn!("Notification receiver dropped");
                    }
                }
            }

            _ = stop_rx.recv() => {
                log::info!("Received stop signal for panel {}", session.id());
                break;
            }
        }
    }

    session.detach();
    session
}
