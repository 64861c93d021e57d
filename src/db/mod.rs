pub mod api_key_repo;
pub mod income_repo;
pub mod position_repo;
pub mod withdrawal_repo;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::models::{ClosedPosition, Credential, Exchange, Position};

pub async fn init_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    // Verify connectivity
    sqlx::query("SELECT 1").execute(&pool).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

// ---------------------------------------------------------------------------
// Store seams used by the sync scheduler and balance aggregator
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Idempotent on (exchange, external_id). Returns rows written.
    async fn upsert_positions(&self, positions: &[ClosedPosition]) -> anyhow::Result<usize>;

    async fn positions_for(&self, exchange: Exchange) -> anyhow::Result<Vec<Position>>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn credential_for(&self, exchange: Exchange) -> anyhow::Result<Option<Credential>>;

    async fn all_credentials(&self) -> anyhow::Result<Vec<Credential>>;

    async fn save_credential(&self, credential: &Credential) -> anyhow::Result<()>;
}

#[async_trait]
impl PositionStore for PgPool {
    async fn upsert_positions(&self, positions: &[ClosedPosition]) -> anyhow::Result<usize> {
        position_repo::upsert_batch(self, positions).await
    }

    async fn positions_for(&self, exchange: Exchange) -> anyhow::Result<Vec<Position>> {
        position_repo::find_by_exchange(self, exchange.as_str()).await
    }
}

#[async_trait]
impl CredentialStore for PgPool {
    async fn credential_for(&self, exchange: Exchange) -> anyhow::Result<Option<Credential>> {
        let row = api_key_repo::get_by_exchange(self, exchange.as_str()).await?;
        Ok(row.map(Credential::from))
    }

    async fn all_credentials(&self) -> anyhow::Result<Vec<Credential>> {
        let rows = api_key_repo::get_all(self).await?;
        Ok(rows.into_iter().map(Credential::from).collect())
    }

    async fn save_credential(&self, credential: &Credential) -> anyhow::Result<()> {
        api_key_repo::upsert(self, credential).await?;
        Ok(())
    }
}
