use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Withdrawal;

pub async fn insert(
    pool: &PgPool,
    exchange: &str,
    amount: Decimal,
    currency: &str,
    date: Option<DateTime<Utc>>,
) -> anyhow::Result<Withdrawal> {
    let row = sqlx::query_as::<_, Withdrawal>(
        r#"
        INSERT INTO withdrawals (exchange, amount, currency, created_at)
        VALUES ($1, $2, $3, COALESCE($4, NOW()))
        RETURNING *
        "#,
    )
    .bind(exchange)
    .bind(amount)
    .bind(currency)
    .bind(date)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Newest first, optionally for one exchange.
pub async fn list(pool: &PgPool, exchange: Option<&str>) -> anyhow::Result<Vec<Withdrawal>> {
    let rows = sqlx::query_as::<_, Withdrawal>(
        r#"
        SELECT * FROM withdrawals
        WHERE ($1::text IS NULL OR exchange = $1)
        ORDER BY created_at DESC
        "#,
    )
    .bind(exchange)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn delete(pool: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM withdrawals WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
