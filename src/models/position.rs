use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{Exchange, Side};

/// Database row for the positions table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: Uuid,
    pub external_id: String,
    pub exchange: String,
    pub symbol: String,
    pub side: String,
    pub volume: Decimal,
    pub leverage: i32,
    pub closed_pnl: Decimal,
    /// Exchange-reported close time.
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Audit column, touched on every upsert.
    pub synced_at: DateTime<Utc>,
}

/// Exchange-agnostic closed trade produced by the adapters.
///
/// `(exchange, external_id)` is the natural key in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedPosition {
    pub external_id: String,
    pub exchange: Exchange,
    pub symbol: String,
    pub side: Side,
    /// Entry notional: quantity × price × contract size.
    pub volume: Decimal,
    /// Always >= 1.
    pub leverage: i32,
    pub closed_pnl: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl ClosedPosition {
    /// Margin committed to the position. Leverage is normalized, so this
    /// never divides by zero.
    pub fn margin(&self) -> Decimal {
        self.volume / Decimal::from(self.leverage.max(1))
    }
}

/// Leverage defaults to 1 when the exchange omits it or reports zero.
pub fn normalize_leverage(raw: Option<i64>) -> i32 {
    match raw {
        Some(l) if l > 0 => i32::try_from(l).unwrap_or(i32::MAX),
        _ => 1,
    }
}

/// External id for manually entered positions: `manual_position_<nanos>_<hex>`.
pub fn manual_external_id() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("manual_position_{nanos}_{}", &suffix[..8])
}
