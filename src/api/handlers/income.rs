use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::ws_types::{self, WsMessage};
use crate::db::income_repo;
use crate::errors::AppError;
use crate::models::MonthlyIncome;
use crate::AppState;

use super::{exchange_filter, ok, parse_exchange, ApiResponse};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub exchange: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateIncomeRequest {
    pub exchange: String,
    pub amount: Decimal,
    #[serde(default)]
    pub pnl: Decimal,
    pub date: Option<DateTime<Utc>>,
}

/// GET /api/v1/monthly-income
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<MonthlyIncome>>>, AppError> {
    let exchange = exchange_filter(query.exchange.as_deref())?;
    let rows = income_repo::list(&state.db, exchange.as_deref()).await?;
    Ok(ok(rows))
}

/// POST /api/v1/monthly-income
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateIncomeRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MonthlyIncome>>), AppError> {
    let exchange = parse_exchange(&req.exchange)?;

    let row = income_repo::insert(&state.db, exchange.as_str(), req.amount, req.pnl, req.date).await?;
    ws_types::broadcast(&state.ws_tx, WsMessage::IncomeCreated { income: row.clone() });

    Ok((StatusCode::CREATED, ok(row)))
}

/// DELETE /api/v1/monthly-income/{id}
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Uuid>>, AppError> {
    if !income_repo::delete(&state.db, id).await? {
        return Err(AppError::NotFound("income record not found".into()));
    }
    ws_types::broadcast(&state.ws_tx, WsMessage::IncomeDeleted { id });

    Ok(ok(id))
}
