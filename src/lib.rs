pub mod api; // HTTP router, middleware and server
pub mod clock;
pub mod config;
pub mod core_state; // Shared request state
pub mod db;
pub mod error;
pub mod ledger; // Invoices and derived amounts
pub mod models;
pub mod occupancy; // Inpatient beds
pub mod scheduling; // Slots and appointment reservations

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::ServiceConfig;
use crate::core_state::CoreState;

/// Process entry point: configure logging, prepare storage and serve the
/// API until Ctrl-C.
pub fn run() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    let core = Arc::new(CoreState::new(config));
    if let Err(e) = core.initialize_storage() {
        tracing::error!("Cannot open database at {}: {e}", core.db_path().display());
        std::process::exit(1);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Cannot start async runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(core)) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn serve(core: Arc<CoreState>) -> Result<(), api::ServerError> {
    let addr = core.config().bind_addr;
    let server = api::start_api_server(core, addr).await?;
    tracing::info!(addr = %server.addr(), "listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl-C: {e}");
    }
    server.stop().await;
    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}
