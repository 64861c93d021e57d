use axum::routing::{delete, get};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Positions
        .route("/positions", get(handlers::positions::list).post(handlers::positions::create))
        .route("/positions/pnl", get(handlers::positions::pnl))
        .route("/positions/:id", delete(handlers::positions::delete))
        // Balance
        .route("/balance", get(handlers::balance::summary))
        // Credentials
        .route("/api-keys", get(handlers::api_keys::list).post(handlers::api_keys::save))
        // Cash movements
        .route("/withdrawals", get(handlers::withdrawals::list).post(handlers::withdrawals::create))
        .route("/withdrawals/:id", delete(handlers::withdrawals::delete))
        .route("/monthly-income", get(handlers::income::list).post(handlers::income::create))
        .route("/monthly-income/:id", delete(handlers::income::delete))
        // WebSocket
        .route("/ws", get(handlers::ws::handler));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::render))
        .nest("/api/v1", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
