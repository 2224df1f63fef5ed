use std::net::TcpListener;
use std::time::Duration;

use berkah::configuration::{get_configuration, StorageBackend};
use berkah::session::spawn_sweeper;
use berkah::startup::{run, Storage};
use berkah::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry("info");

    let configuration = match get_configuration() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read configuration");
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    let storage = match configuration.application.storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; sessions are lost on restart");
            Storage::in_memory()
        }
        StorageBackend::Postgres => Storage::connect(&configuration.database)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to set up database");
                std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "Database connection error",
                )
            })?,
    };

    let sweep_every = configuration.session.sweep_interval_seconds;
    if sweep_every > 0 {
        spawn_sweeper(storage.ledger.clone(), Duration::from_secs(sweep_every));
        tracing::info!(interval_seconds = sweep_every, "Session sweeper started");
    }

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!(address = %address, "Server listening");

    run(listener, storage, &configuration.jwt)?.await
}
