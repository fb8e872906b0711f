mod domain;
mod infrastructure;
mod presentation;

use domain::settings::SettingsService;
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;

    let _logging_guard = infrastructure::logging::init_logger(&settings_service.get().log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    tracing::info!("Starting Simple BLE Control");

    let settings = Arc::new(Mutex::new(settings_service));
    presentation::app::ControlApp::new(settings).run().await
}
