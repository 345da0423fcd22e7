pub mod mask;
pub mod pins;
pub mod protocol;
pub mod session;
pub mod panel;
pub mod sim;
pub mod config;

use std::time::Duration;
use tokio::sync::mpsc;

use config::PanelSettings;
use panel::{PanelError, PanelHandle};
use session::Notification;
use sim::SimulatedDevice;

/// Open a panel against a simulated device, replay the configured script and report every notification.
pub async fn run(settings: PanelSettings) -> Result<Vec<Notification>, PanelError> {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (notification_tx, mut notification_rx) = mpsc::unbounded_channel();

    let panel = PanelHandle::start(settings.device_type, settings.address, outbound_tx, notification_tx);

    let device = SimulatedDevice::new(settings.device_type, settings.address)
        .with_mode(&settings.initial_mode)
        .with_rejection(settings.reject_info.clone())
        .with_ack_delay(Duration::from_millis(settings.ack_delay_ms));
    let initial_status = device.status();
    let endpoint = sim::spawn_endpoint(device, outbound_rx, panel.sender());

    // The first status push is what connects the panel
    let sender = panel.sender();
    sender.device_event(protocol::Inbound::status(&initial_status))?;

    for intent in settings.script.iter().cloned() {
        log::info!("Operator intent: {:?}", intent);
        sender.intent(intent)?;
        // Let the device answer before the next click
        tokio::time::sleep(Duration::from_millis(settings.ack_delay_ms * 3 + 10)).await;
    }

    let session = panel.stop().await?;
    endpoint.abort();

    for view in session.views() {
        let lit: Vec<u8> = view.pins.iter().filter(|p| p.lit).map(|p| p.descriptor.index).collect();
        log::info!("{} {} lit={:?}", view.bank, view.mask, lit);
    }

    let mut notifications = Vec::new();
    while let Ok(notification) = notification_rx.try_recv() {
        notifications.push(notification);
    }
    Ok(notifications)
}
