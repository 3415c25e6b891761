mod dashboard;
mod gateway;
mod invoices;
mod mutation;
mod problem;
mod router;
mod session;
mod tap;
mod telemetry;
mod views;

use std::net::SocketAddr;

use acme_storage::{seed_placeholder_customers, Database};
use acme_util::{load_env_file, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    info!(stage = "storage", url = %config.database_url, "database ready");

    if config.environment.is_development() {
        let seeded = seed_placeholder_customers(&database).await?;
        if seeded > 0 {
            info!(stage = "storage", customers = seeded, "seeded placeholder customers");
        }
    }

    let state = router::AppState::new(metrics, tap::TapHub::new(), database, &config);

    let addr: SocketAddr = config.bind_addr;
    info!(
        stage = "app",
        %addr,
        env = %config.environment.as_str(),
        timezone = %config.timezone,
        "starting HTTP server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
