use std::path::PathBuf;

use manual_control_lib::config::PanelSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => PanelSettings::load(&path)?,
        None => PanelSettings::default(),
    };

    env_logger::Builder::new()
        .filter_level(settings.log_filter())
        .parse_default_env()
        .init();

    log::info!("Manual control started for device {} ({})", settings.address, settings.device_type);

    let notifications = manual_control_lib::run(settings).await?;
    for n in notifications {
        let flag = if n.success { "OK" } else { "KO" };
        println!("[{}] {}: {}", flag, n.title, n.message);
    }
    Ok(())
}
