use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::MonthlyIncome;

pub async fn insert(
    pool: &PgPool,
    exchange: &str,
    amount: Decimal,
    pnl: Decimal,
    date: Option<DateTime<Utc>>,
) -> anyhow::Result<MonthlyIncome> {
    let row = sqlx::query_as::<_, MonthlyIncome>(
        r#"
        INSERT INTO monthly_incomes (exchange, amount, pnl, created_at)
        VALUES ($1, $2, $3, COALESCE($4, NOW()))
        RETURNING *
        "#,
    )
    .bind(exchange)
    .bind(amount)
    .bind(pnl)
    .bind(date)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn list(pool: &PgPool, exchange: Option<&str>) -> anyhow::Result<Vec<MonthlyIncome>> {
    let rows = sqlx::query_as::<_, MonthlyIncome>(
        r#"
        SELECT * FROM monthly_incomes
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
    let result = sqlx::query("DELETE FROM monthly_incomes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
