pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod exchanges;
pub mod metrics;
pub mod models;
pub mod services;
pub mod shutdown;

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::api::ws_types::WsMessage;
use crate::config::AppConfig;
use crate::services::BalanceAggregator;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: AppConfig,
    pub ws_tx: broadcast::Sender<WsMessage>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
    pub balance: Arc<BalanceAggregator>,
}
