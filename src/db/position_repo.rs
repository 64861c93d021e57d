use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{ClosedPosition, Position};

const UPSERT_SQL: &str = r#"
    INSERT INTO positions
        (external_id, exchange, symbol, side, volume, leverage, closed_pnl, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (exchange, external_id) DO UPDATE
    SET symbol = EXCLUDED.symbol,
        side = EXCLUDED.side,
        volume = EXCLUDED.volume,
        leverage = EXCLUDED.leverage,
        closed_pnl = EXCLUDED.closed_pnl,
        updated_at = EXCLUDED.updated_at,
        synced_at = NOW()
    RETURNING *
"#;

/// Optional filters for position listings. `to` is exclusive.
#[derive(Debug, Clone, Default)]
pub struct PositionFilter {
    pub exchange: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

async fn upsert_one(
    tx: &mut Transaction<'_, Postgres>,
    position: &ClosedPosition,
) -> anyhow::Result<Position> {
    let row = sqlx::query_as::<_, Position>(UPSERT_SQL)
        .bind(&position.external_id)
        .bind(position.exchange.as_str())
        .bind(&position.symbol)
        .bind(position.side.as_str())
        .bind(position.volume)
        .bind(position.leverage.max(1))
        .bind(position.closed_pnl)
        .bind(position.updated_at)
        .fetch_one(&mut **tx)
        .await?;

    Ok(row)
}

/// Insert or overwrite a batch keyed on (exchange, external_id), all in one
/// transaction. Returns the number of rows written.
pub async fn upsert_batch(pool: &PgPool, positions: &[ClosedPosition]) -> anyhow::Result<usize> {
    if positions.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    for position in positions {
        upsert_one(&mut tx, position).await?;
    }
    tx.commit().await?;

    Ok(positions.len())
}

/// Upsert a single position and return the stored row.
pub async fn upsert(pool: &PgPool, position: &ClosedPosition) -> anyhow::Result<Position> {
    let mut tx = pool.begin().await?;
    let row = upsert_one(&mut tx, position).await?;
    tx.commit().await?;
    Ok(row)
}

/// Positions matching `filter`, newest close first.
pub async fn find(pool: &PgPool, filter: &PositionFilter) -> anyhow::Result<Vec<Position>> {
    let positions = sqlx::query_as::<_, Position>(
        r#"
        SELECT * FROM positions
        WHERE ($1::text IS NULL OR exchange = $1)
          AND ($2::timestamptz IS NULL OR updated_at >= $2)
          AND ($3::timestamptz IS NULL OR updated_at < $3)
        ORDER BY updated_at DESC
        "#,
    )
    .bind(filter.exchange.as_deref())
    .bind(filter.from)
    .bind(filter.to)
    .fetch_all(pool)
    .await?;

    Ok(positions)
}

pub async fn find_by_exchange(pool: &PgPool, exchange: &str) -> anyhow::Result<Vec<Position>> {
    find(
        pool,
        &PositionFilter {
            exchange: Some(exchange.to_string()),
            ..Default::default()
        },
    )
    .await
}

/// Positions closed in `[start, end)` on any exchange.
pub async fn find_by_date_range(
    pool: &PgPool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> anyhow::Result<Vec<Position>> {
    find(
        pool,
        &PositionFilter {
            exchange: None,
            from: Some(start),
            to: Some(end),
        },
    )
    .await
}

pub async fn get_by_external_id(
    pool: &PgPool,
    exchange: &str,
    external_id: &str,
) -> anyhow::Result<Option<Position>> {
    let position = sqlx::query_as::<_, Position>(
        "SELECT * FROM positions WHERE exchange = $1 AND external_id = $2",
    )
    .bind(exchange)
    .bind(external_id)
    .fetch_optional(pool)
    .await?;

    Ok(position)
}

/// Returns false when no row had this id.
pub async fn delete(pool: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM positions WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Sum of closed PnL over positions matching `filter`.
pub async fn total_pnl(pool: &PgPool, filter: &PositionFilter) -> anyhow::Result<Decimal> {
    let row: (Option<Decimal>,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(closed_pnl), 0) FROM positions
        WHERE ($1::text IS NULL OR exchange = $1)
          AND ($2::timestamptz IS NULL OR updated_at >= $2)
          AND ($3::timestamptz IS NULL OR updated_at < $3)
        "#,
    )
    .bind(filter.exchange.as_deref())
    .bind(filter.from)
    .bind(filter.to)
    .fetch_one(pool)
    .await?;

    Ok(row.0.unwrap_or(Decimal::ZERO))
}
