use axum::extract::State;
use axum::Json;

use crate::errors::AppError;
use crate::services::BalanceSummary;
use crate::AppState;

/// GET /api/v1/balance — live totals, queried on every call
pub async fn summary(State(state): State<AppState>) -> Result<Json<BalanceSummary>, AppError> {
    let summary = state.balance.total_balance().await?;
    Ok(Json(summary))
}
