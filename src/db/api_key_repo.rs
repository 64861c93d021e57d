use sqlx::PgPool;

use crate::models::{ApiKey, Credential};

/// Insert or replace the credential for an exchange. Re-saving marks it
/// active again.
pub async fn upsert(pool: &PgPool, credential: &Credential) -> anyhow::Result<ApiKey> {
    let row = sqlx::query_as::<_, ApiKey>(
        r#"
        INSERT INTO api_keys (exchange, api_key, api_secret, passphrase, is_active)
        VALUES ($1, $2, $3, $4, TRUE)
        ON CONFLICT (exchange) DO UPDATE
        SET api_key = EXCLUDED.api_key,
            api_secret = EXCLUDED.api_secret,
            passphrase = EXCLUDED.passphrase,
            is_active = TRUE,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(credential.exchange.to_lowercase())
    .bind(&credential.api_key)
    .bind(&credential.api_secret)
    .bind(credential.passphrase.as_deref())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_by_exchange(pool: &PgPool, exchange: &str) -> anyhow::Result<Option<ApiKey>> {
    let row = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE exchange = $1")
        .bind(exchange.to_lowercase())
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn get_all(pool: &PgPool) -> anyhow::Result<Vec<ApiKey>> {
    let rows = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys ORDER BY exchange")
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

pub async fn set_active(pool: &PgPool, exchange: &str, active: bool) -> anyhow::Result<bool> {
    let result = sqlx::query(
        "UPDATE api_keys SET is_active = $2, updated_at = NOW() WHERE exchange = $1",
    )
    .bind(exchange.to_lowercase())
    .bind(active)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
