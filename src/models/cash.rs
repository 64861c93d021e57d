use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row for the withdrawals table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Withdrawal {
    pub id: Uuid,
    pub exchange: String,
    pub amount: Decimal,
    pub currency: String,
    #[serde(rename = "date")]
    pub created_at: DateTime<Utc>,
}

/// Database row for the monthly_incomes table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MonthlyIncome {
    pub id: Uuid,
    pub exchange: String,
    pub amount: Decimal,
    pub pnl: Decimal,
    #[serde(rename = "date")]
    pub created_at: DateTime<Utc>,
}
