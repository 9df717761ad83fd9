use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use wynnwatch::{HttpTransport, SyncConfig, SyncCore, SyncEvent, Transport};

/// Headless host for the synchronization core: boots it against the
/// configured bootstrap endpoint, logs every outbound event, and shuts the
/// workers down on ctrl-c.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (config, config_path) = SyncConfig::load_or_create()?;
    info!(path = %config_path.display(), "loaded sync config");

    let (tx, rx) = crossbeam_channel::unbounded::<SyncEvent>();
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.user_agent())?);
    let core = SyncCore::new(config, transport, tx);

    std::thread::spawn(move || {
        while let Ok(event) = rx.recv() {
            info!(event = event.kind(), "state changed");
        }
    });

    core.init().await;
    info!(
        setup = core.is_setup(),
        splash = %core.current_splash(),
        "synchronization core running; press ctrl-c to stop"
    );

    tokio::signal::ctrl_c().await?;
    core.shutdown();
    Ok(())
}
