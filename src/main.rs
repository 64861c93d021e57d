use std::sync::Arc;

use tokio::sync::broadcast;

use tradeledger::api::router::create_router;
use tradeledger::api::ws_types::WsMessage;
use tradeledger::config::AppConfig;
use tradeledger::db::{self, CredentialStore, PositionStore};
use tradeledger::exchanges::Adapters;
use tradeledger::metrics::init_metrics;
use tradeledger::services::{position_sync, BalanceAggregator, SyncConfig};
use tradeledger::shutdown::shutdown_signal;
use tradeledger::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    init_tracing(config.log_json);
    let addr = format!("{}:{}", config.host, config.port);

    tracing::info!("Connecting to database...");
    let db = db::init_pool(&config.database_url).await?;
    tracing::info!("Database connected, migrations applied");

    let metrics_handle = init_metrics();

    // --- Credentials from the environment ---
    for credential in &config.bootstrap_credentials {
        db.save_credential(credential).await?;
        tracing::info!(exchange = %credential.exchange, "Bootstrap credential stored");
    }

    let adapters = Adapters::from_config(&config)?;
    let (ws_tx, _) = broadcast::channel::<WsMessage>(256);

    // --- One sync scheduler per configured exchange ---
    let credentials: Arc<dyn CredentialStore> = Arc::new(db.clone());
    let positions: Arc<dyn PositionStore> = Arc::new(db.clone());
    let schedulers = position_sync::spawn_all(
        &config.sync_exchanges,
        &adapters,
        credentials.clone(),
        positions,
        &ws_tx,
        SyncConfig::from_app(&config),
    );
    tracing::info!(count = schedulers.len(), "Sync schedulers spawned");

    let state = AppState {
        db,
        config,
        ws_tx,
        metrics_handle,
        balance: Arc::new(BalanceAggregator::new(credentials, adapters)),
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server drained, stopping schedulers");
    for handle in schedulers {
        handle.stop().await;
    }

    Ok(())
}

fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
