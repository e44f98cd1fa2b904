use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod store;

use dbus_interface::{DetectorService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::load()?;
    tracing::info!(
        model_dir = %config.model_dir.display(),
        db_path = %config.db_path.display(),
        device = %config.device,
        face_detection = config.face_detection,
        max_frames = config.max_frames,
        "deepcheckd starting"
    );

    let engine = engine::spawn_engine(config.detector_config())?;
    let store = store::HistoryStore::open(&config.db_path).await?;
    let service = DetectorService::new(engine, store, &config);

    let _conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;

    tracing::info!(bus_name = BUS_NAME, path = OBJECT_PATH, "deepcheckd ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("deepcheckd shutting down");

    Ok(())
}
