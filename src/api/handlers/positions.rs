use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::ws_types::{self, WsMessage};
use crate::db::position_repo::{self, PositionFilter};
use crate::errors::AppError;
use crate::models::position::{manual_external_id, normalize_leverage};
use crate::models::{ClosedPosition, Position, Side};
use crate::AppState;

use super::{exchange_filter, ok, parse_exchange, ApiResponse};

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub exchange: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct PnlQuery {
    pub exchange: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlSummary {
    pub total_pnl: Decimal,
    pub exchange: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePositionRequest {
    pub external_id: Option<String>,
    pub exchange: String,
    pub symbol: String,
    pub side: String,
    pub volume: Decimal,
    pub leverage: Option<i64>,
    #[serde(default)]
    pub closed_pnl: Decimal,
    pub updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/positions — newest first, optionally filtered
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Position>>>, AppError> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(AppError::BadRequest("`from` must not be after `to`".into()));
        }
    }
    let filter = PositionFilter {
        exchange: exchange_filter(query.exchange.as_deref())?,
        from: query.from,
        to: query.to,
    };

    let positions = position_repo::find(&state.db, &filter).await?;
    Ok(ok(positions))
}

/// POST /api/v1/positions — manual entry, bypasses the exchange adapters
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreatePositionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Position>>), AppError> {
    let exchange = parse_exchange(&req.exchange)?;
    let side = Side::from_api_str(&req.side)
        .ok_or_else(|| AppError::BadRequest(format!("invalid side: {}", req.side)))?;
    if req.symbol.trim().is_empty() {
        return Err(AppError::BadRequest("symbol is required".into()));
    }
    if req.volume < Decimal::ZERO {
        return Err(AppError::BadRequest("volume must not be negative".into()));
    }

    let position = ClosedPosition {
        external_id: req
            .external_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(manual_external_id),
        exchange,
        symbol: req.symbol.trim().to_string(),
        side,
        volume: req.volume,
        leverage: normalize_leverage(req.leverage),
        closed_pnl: req.closed_pnl,
        updated_at: req.updated_at.unwrap_or_else(Utc::now),
    };

    let row = position_repo::upsert(&state.db, &position).await?;
    ws_types::broadcast(&state.ws_tx, WsMessage::PositionCreated { position: row.clone() });

    Ok((StatusCode::CREATED, ok(row)))
}

/// DELETE /api/v1/positions/{id}
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Uuid>>, AppError> {
    if !position_repo::delete(&state.db, id).await? {
        return Err(AppError::NotFound("position not found".into()));
    }
    ws_types::broadcast(&state.ws_tx, WsMessage::PositionDeleted { id });

    Ok(ok(id))
}

/// GET /api/v1/positions/pnl — realized PnL, optionally for one year or month
pub async fn pnl(
    State(state): State<AppState>,
    Query(query): Query<PnlQuery>,
) -> Result<Json<ApiResponse<PnlSummary>>, AppError> {
    let exchange = exchange_filter(query.exchange.as_deref())?;
    let (from, to) = period_bounds(query.year, query.month)?;
    let filter = PositionFilter {
        exchange: exchange.clone(),
        from,
        to,
    };

    let total_pnl = position_repo::total_pnl(&state.db, &filter).await?;
    Ok(ok(PnlSummary {
        total_pnl,
        exchange,
        year: query.year,
        month: query.month,
    }))
}

type Bounds = (Option<DateTime<Utc>>, Option<DateTime<Utc>>);

/// UTC bounds of a calendar year or month. The upper bound is exclusive.
pub fn period_bounds(year: Option<i32>, month: Option<u32>) -> Result<Bounds, AppError> {
    let start_of = |y: i32, m: u32| {
        Utc.with_ymd_and_hms(y, m, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| AppError::BadRequest(format!("invalid period {y}-{m:02}")))
    };

    match (year, month) {
        (None, None) => Ok((None, None)),
        (None, Some(_)) => Err(AppError::BadRequest("`month` requires `year`".into())),
        (Some(_), Some(m)) if !(1..=12).contains(&m) => {
            Err(AppError::BadRequest(format!("invalid month: {m}")))
        }
        (Some(y), None) => Ok((Some(start_of(y, 1)?), Some(start_of(y + 1, 1)?))),
        (Some(y), Some(12)) => Ok((Some(start_of(y, 12)?), Some(start_of(y + 1, 1)?))),
        (Some(y), Some(m)) => Ok((Some(start_of(y, m)?), Some(start_of(y, m + 1)?))),
    }
}
