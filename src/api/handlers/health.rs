use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::db::CredentialStore;
use crate::models::Credential;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub db: &'static str,
    /// Exchanges with a sync scheduler.
    pub syncing: Vec<&'static str>,
    /// Exchanges with an active, complete credential.
    pub credentials: Vec<String>,
}

/// GET /health — 503 when the database is unreachable
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let syncing = state.config.sync_exchanges.iter().map(|e| e.as_str()).collect();

    match state.db.all_credentials().await {
        Ok(credentials) => {
            let mut ready: Vec<String> = credentials
                .into_iter()
                .filter(Credential::is_usable)
                .map(|c| c.exchange)
                .collect();
            ready.sort();
            (
                StatusCode::OK,
                Json(HealthReport {
                    status: "healthy",
                    db: "connected",
                    syncing,
                    credentials: ready,
                }),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the database");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthReport {
                    status: "unhealthy",
                    db: "disconnected",
                    syncing,
                    credentials: Vec::new(),
                }),
            )
        }
    }
}
