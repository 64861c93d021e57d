use std::sync::Arc;

use futures_util::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::CredentialStore;
use crate::exchanges::Adapters;
use crate::models::{Credential, Exchange};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeBalance {
    pub exchange: String,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSummary {
    pub total_balance: Decimal,
    pub exchange_balances: Vec<ExchangeBalance>,
}

/// Live balance across every configured exchange. Nothing is cached.
pub struct BalanceAggregator {
    credentials: Arc<dyn CredentialStore>,
    adapters: Adapters,
}

impl BalanceAggregator {
    pub fn new(credentials: Arc<dyn CredentialStore>, adapters: Adapters) -> Self {
        Self {
            credentials,
            adapters,
        }
    }

    /// Query all active, complete credentials concurrently. Failures and
    /// non-positive balances are left out of both the list and the total.
    pub async fn total_balance(&self) -> anyhow::Result<BalanceSummary> {
        let credentials: Vec<Credential> = self
            .credentials
            .all_credentials()
            .await?
            .into_iter()
            .filter(Credential::is_usable)
            .collect();

        let lookups = credentials.iter().map(|cred| self.balance_for(cred));
        let mut exchange_balances: Vec<ExchangeBalance> =
            join_all(lookups).await.into_iter().flatten().collect();
        exchange_balances.sort_by(|a, b| a.exchange.cmp(&b.exchange));

        let total_balance = exchange_balances.iter().map(|b| b.balance).sum();
        Ok(BalanceSummary {
            total_balance,
            exchange_balances,
        })
    }

    async fn balance_for(&self, credential: &Credential) -> Option<ExchangeBalance> {
        let Some(exchange) = Exchange::from_str(&credential.exchange) else {
            tracing::debug!(exchange = %credential.exchange, "Credential for unsupported exchange");
            return None;
        };
        let adapter = self.adapters.get(exchange)?;

        match adapter.fetch_balance(credential).await {
            Ok(balance) if balance > Decimal::ZERO => Some(ExchangeBalance {
                exchange: exchange.as_str().to_string(),
                balance,
            }),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(%exchange, error = %e, "Balance fetch failed, leaving exchange out");
                None
            }
        }
    }
}
