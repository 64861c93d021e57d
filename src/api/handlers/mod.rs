pub mod api_keys;
pub mod balance;
pub mod health;
pub mod income;
pub mod metrics;
pub mod positions;
pub mod withdrawals;
pub mod ws;

use axum::Json;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::Exchange;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data: Some(data),
        error: None,
    })
}

/// Validate an optional `exchange` query parameter. Returns its canonical
/// lowercase name.
pub fn exchange_filter(raw: Option<&str>) -> Result<Option<String>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(name) => parse_exchange(name).map(|e| Some(e.as_str().to_string())),
    }
}

pub fn parse_exchange(name: &str) -> Result<Exchange, AppError> {
    Exchange::from_str(name).ok_or_else(|| AppError::BadRequest(format!("unsupported exchange: {name}")))
}
