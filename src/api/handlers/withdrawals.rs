use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::ws_types::{self, WsMessage};
use crate::db::withdrawal_repo;
use crate::errors::AppError;
use crate::models::Withdrawal;
use crate::AppState;

use super::{exchange_filter, ok, parse_exchange, ApiResponse};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub exchange: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateWithdrawalRequest {
    pub exchange: String,
    pub amount: Decimal,
    pub currency: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// GET /api/v1/withdrawals
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Withdrawal>>>, AppError> {
    let exchange = exchange_filter(query.exchange.as_deref())?;
    let rows = withdrawal_repo::list(&state.db, exchange.as_deref()).await?;
    Ok(ok(rows))
}

/// POST /api/v1/withdrawals
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateWithdrawalRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Withdrawal>>), AppError> {
    let exchange = parse_exchange(&req.exchange)?;
    if req.amount <= Decimal::ZERO {
        return Err(AppError::BadRequest("amount must be positive".into()));
    }
    let currency = req
        .currency
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "USDT".into());

    let row = withdrawal_repo::insert(&state.db, exchange.as_str(), req.amount, &currency, req.date).await?;
    ws_types::broadcast(&state.ws_tx, WsMessage::WithdrawalCreated { withdrawal: row.clone() });

    Ok((StatusCode::CREATED, ok(row)))
}

/// DELETE /api/v1/withdrawals/{id}
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Uuid>>, AppError> {
    if !withdrawal_repo::delete(&state.db, id).await? {
        return Err(AppError::NotFound("withdrawal not found".into()));
    }
    ws_types::broadcast(&state.ws_tx, WsMessage::WithdrawalDeleted { id });

    Ok(ok(id))
}
