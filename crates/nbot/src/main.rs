use std::sync::Arc;

use nbot_core::{app::open_storage, config::Config};

#[tokio::main]
async fn main() -> Result<(), nbot_core::Error> {
    nbot_core::logging::init("nbot")?;

    let cfg = Arc::new(Config::load()?);
    let storage = open_storage(&cfg).await?;
    let registry = storage.registry.clone();

    let outcome = nbot_telegram::router::run(cfg, storage).await;

    // Release pooled connections whether or not the dispatcher failed.
    registry.close().await;

    outcome.map_err(|e| nbot_core::Error::External(format!("telegram bot failed: {e}")))?;
    tracing::info!("shutdown complete");
    Ok(())
}
