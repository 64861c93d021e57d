pub mod auth;
pub mod bitget;
pub mod bybit;
pub mod contract;
pub mod error;
pub mod mexc;
pub mod paging;
pub mod parse;

pub use error::ExchangeError;
pub use paging::Batch;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;

use crate::config::AppConfig;
use crate::models::{ClosedPosition, Credential, Exchange};

/// Closed positions from one full fetch, plus the number of records dropped
/// as malformed.
pub type FetchOutcome = Batch<ClosedPosition>;

/// Uniform view of one exchange's private REST API.
///
/// Implementations own their HTTP client and hold no per-account state:
/// credentials come in with every call.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn exchange(&self) -> Exchange;

    /// All closed positions the exchange will serve for this account,
    /// across every page and time window.
    async fn fetch_closed_positions(&self, creds: &Credential) -> Result<FetchOutcome, ExchangeError>;

    /// Total account equity in the settlement currency. Zero when the
    /// account has no futures wallet.
    async fn fetch_balance(&self, creds: &Credential) -> Result<Decimal, ExchangeError>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Adapters keyed by exchange.
#[derive(Clone, Default)]
pub struct Adapters {
    inner: HashMap<Exchange, Arc<dyn ExchangeAdapter>>,
}

impl Adapters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every supported adapter from application config.
    pub fn from_config(config: &AppConfig) -> Result<Self, ExchangeError> {
        let mut adapters = Self::new();
        adapters.insert(Arc::new(bybit::BybitAdapter::new(bybit::BybitConfig::from_app(config))?));
        adapters.insert(Arc::new(mexc::MexcAdapter::new(mexc::MexcConfig::from_app(config))?));
        adapters.insert(Arc::new(bitget::BitgetAdapter::new(bitget::BitgetConfig::from_app(config))?));
        Ok(adapters)
    }

    pub fn insert(&mut self, adapter: Arc<dyn ExchangeAdapter>) {
        self.inner.insert(adapter.exchange(), adapter);
    }

    pub fn get(&self, exchange: Exchange) -> Option<Arc<dyn ExchangeAdapter>> {
        self.inner.get(&exchange).cloned()
    }

    pub fn exchanges(&self) -> Vec<Exchange> {
        let mut list: Vec<Exchange> = self.inner.keys().copied().collect();
        list.sort();
        list
    }
}

// ---------------------------------------------------------------------------
// Shared HTTP plumbing
// ---------------------------------------------------------------------------

pub(crate) fn build_client(timeout: Duration) -> Result<Client, ExchangeError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn require_complete(creds: &Credential) -> Result<(), ExchangeError> {
    if creds.is_complete() {
        Ok(())
    } else {
        Err(ExchangeError::MissingCredential(creds.exchange.clone()))
    }
}

/// Status code and body text of a response. Exchanges put error details in
/// the body even on non-2xx answers, so the body is always read.
pub(crate) struct RawResponse {
    pub status: u16,
    pub body: String,
}

pub(crate) async fn send(request: RequestBuilder) -> Result<RawResponse, ExchangeError> {
    let response = request.send().await?;
    let status = response.status().as_u16();
    let body = response.text().await?;
    Ok(RawResponse { status, body })
}

impl RawResponse {
    /// Map non-success HTTP statuses shared by every exchange.
    pub(crate) fn check_status(&self, rate_limit_statuses: &[u16]) -> Result<(), ExchangeError> {
        if rate_limit_statuses.contains(&self.status) {
            return Err(ExchangeError::RateLimited {
                code: self.status.to_string(),
            });
        }
        if !(200..300).contains(&self.status) {
            return Err(ExchangeError::Status {
                status: self.status,
                body: truncate(&self.body, 512),
            });
        }
        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy(Exchange);

    #[async_trait]
    impl ExchangeAdapter for Dummy {
        fn exchange(&self) -> Exchange {
            self.0
        }
        async fn fetch_closed_positions(&self, _: &Credential) -> Result<FetchOutcome, ExchangeError> {
            Ok(FetchOutcome::default())
        }
        async fn fetch_balance(&self, _: &Credential) -> Result<Decimal, ExchangeError> {
            Ok(Decimal::ZERO)
        }
    }

    #[test]
    fn test_registry_keys_by_exchange() {
        let mut adapters = Adapters::new();
        adapters.insert(Arc::new(Dummy(Exchange::Mexc)));
        adapters.insert(Arc::new(Dummy(Exchange::Bybit)));
        adapters.insert(Arc::new(Dummy(Exchange::Mexc)));

        assert_eq!(adapters.exchanges(), vec![Exchange::Bybit, Exchange::Mexc]);
        assert!(adapters.get(Exchange::Bitget).is_none());
        assert_eq!(adapters.get(Exchange::Mexc).unwrap().exchange(), Exchange::Mexc);
    }

    #[test]
    fn test_status_mapping() {
        let raw = |status: u16| RawResponse {
            status,
            body: "x".repeat(1000),
        };
        assert!(raw(200).check_status(&[429]).is_ok());
        assert!(matches!(
            raw(429).check_status(&[429, 403]),
            Err(ExchangeError::RateLimited { .. })
        ));
        match raw(500).check_status(&[429]) {
            Err(ExchangeError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), 515);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_require_complete() {
        assert!(require_complete(&Credential::new("bybit", "k", "s")).is_ok());
        assert!(matches!(
            require_complete(&Credential::new("bybit", "k", "")),
            Err(ExchangeError::MissingCredential(_))
        ));
    }
}
