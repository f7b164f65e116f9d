pub mod db;
pub mod inference;
pub mod scheduler;
pub mod settings;
pub mod utils;

use anyhow::{Context, Result};

use db::Database;
use scheduler::StateService;
use settings::SettingsStore;
use utils::logging::MAIN;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

pub const SERVICE_NAME: &str = "State Service";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Start the service and block until ctrl-c, then stop it cleanly.
pub fn run() -> Result<()> {
    let settings_store = SettingsStore::load_or_create(SettingsStore::default_path())?;
    let settings = settings_store.settings().clone();

    utils::logging::init(&settings.log_level);
    log_info!(MAIN, "{SERVICE_NAME} {VERSION} starting up...");
    log_info!(MAIN, "Settings loaded from {}", settings_store.path().display());

    let database = Database::open(&settings.database_path)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to build tokio runtime")?;
    runtime.block_on(async move {
        database.write_program_version(SERVICE_NAME, VERSION).await?;

        let mut service = StateService::new(database, settings.poll_interval());
        service.start()?;
        log_info!(MAIN, "Running with poll interval {}s", settings.poll_interval().as_secs());

        let signal = tokio::signal::ctrl_c().await;
        if let Err(err) = &signal {
            log_error!(MAIN, "Failed to listen for shutdown signal: {err}");
        }

        log_info!(MAIN, "Shutdown requested");
        service.stop().await?;
        signal.context("shutdown signal listener failed")
    })
}
