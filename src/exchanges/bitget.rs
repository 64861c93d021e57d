use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::auth::{bitget_signature, canonical_query};
use super::paging::{collect_pages, Page};
use super::{build_client, now_millis, parse, require_complete, send};
use super::{ExchangeAdapter, ExchangeError, FetchOutcome};
use crate::config::AppConfig;
use crate::models::{ClosedPosition, Credential, Exchange, Side};

const HISTORY_PATH: &str = "/api/v2/mix/position/history-position";
const ACCOUNTS_PATH: &str = "/api/v2/mix/account/accounts";
const PRODUCT_TYPE: &str = "USDT-FUTURES";
const PAGE_SIZE: usize = 100;
const SUCCESS_CODE: &str = "00000";

const RATE_LIMIT_CODES: &[&str] = &["429", "40429"];
const AUTH_CODES: &[&str] = &["40006", "40009", "40012", "40037"];

#[derive(Debug, Clone)]
pub struct BitgetConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub request_delay: Duration,
}

impl BitgetConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            base_url: config.bitget_base_url.clone(),
            timeout: config.http_timeout,
            request_delay: config.request_delay,
        }
    }
}

pub struct BitgetAdapter {
    http: Client,
    config: BitgetConfig,
}

impl BitgetAdapter {
    pub fn new(config: BitgetConfig) -> Result<Self, ExchangeError> {
        Ok(Self {
            http: build_client(config.timeout)?,
            config,
        })
    }

    /// Signed GET. `Ok(None)` on HTTP 404.
    async fn get(
        &self,
        creds: &Credential,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Option<Value>, ExchangeError> {
        let query = canonical_query(params);
        let request_path = if query.is_empty() {
            path.to_string()
        } else {
            format!("{path}?{query}")
        };
        let timestamp = now_millis();
        let signature = bitget_signature(&creds.api_secret, timestamp, "GET", &request_path, "")?;

        let mut request = self
            .http
            .get(format!("{}{}", self.config.base_url, request_path))
            .header("ACCESS-KEY", &creds.api_key)
            .header("ACCESS-SIGN", signature)
            .header("ACCESS-TIMESTAMP", timestamp.to_string())
            .header("Content-Type", "application/json");
        if let Some(passphrase) = creds.passphrase.as_deref().filter(|p| !p.is_empty()) {
            request = request.header("ACCESS-PASSPHRASE", passphrase);
        }

        let raw = send(request).await?;
        if raw.status == 404 {
            return Ok(None);
        }
        if raw.status == 429 {
            return Err(ExchangeError::RateLimited { code: "429".into() });
        }
        // A 5xx stays a status error even when it carries an envelope.
        if raw.status >= 500 {
            raw.check_status(&[])?;
        }
        // Most failures arrive as 4xx with a JSON envelope carrying the code.
        match serde_json::from_str::<Envelope>(&raw.body) {
            Ok(envelope) if envelope.code == SUCCESS_CODE => Ok(Some(envelope.data)),
            Ok(envelope) => Err(classify(&envelope.code, &envelope.msg)),
            Err(e) => {
                raw.check_status(&[])?;
                Err(e.into())
            }
        }
    }

    async fn history_page(
        &self,
        creds: &Credential,
        cursor: Option<String>,
    ) -> Result<Page<ClosedPosition, String>, ExchangeError> {
        let mut params = vec![
            ("productType", PRODUCT_TYPE.to_string()),
            ("limit", PAGE_SIZE.to_string()),
        ];
        if let Some(id) = cursor {
            params.push(("idLessThan", id));
        }

        let Some(data) = self.get(creds, HISTORY_PATH, &params).await? else {
            return Ok(Page {
                batch: Default::default(),
                next: None,
            });
        };
        let page: HistoryPage = serde_json::from_value(data)?;
        Ok(Page {
            batch: parse::decode_records(Exchange::Bitget, page.list, HistoryPosition::into_position),
            next: page.end_id.filter(|id| !id.is_empty()),
        })
    }
}

#[async_trait]
impl ExchangeAdapter for BitgetAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Bitget
    }

    async fn fetch_closed_positions(&self, creds: &Credential) -> Result<FetchOutcome, ExchangeError> {
        require_complete(creds)?;

        collect_pages(PAGE_SIZE, self.config.request_delay, |cursor| {
            self.history_page(creds, cursor)
        })
        .await
    }

    async fn fetch_balance(&self, creds: &Credential) -> Result<Decimal, ExchangeError> {
        require_complete(creds)?;

        let Some(data) = self
            .get(creds, ACCOUNTS_PATH, &[("productType", PRODUCT_TYPE.to_string())])
            .await?
        else {
            return Ok(Decimal::ZERO);
        };
        let accounts: Vec<Account> = serde_json::from_value(data)?;
        Ok(accounts.iter().filter_map(|a| a.usdt_equity).sum())
    }
}

fn classify(code: &str, message: &str) -> ExchangeError {
    if RATE_LIMIT_CODES.contains(&code) {
        ExchangeError::RateLimited {
            code: code.to_string(),
        }
    } else if AUTH_CODES.contains(&code) {
        ExchangeError::Auth(format!("{code}: {message}"))
    } else {
        ExchangeError::Api {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(deserialize_with = "code_string")]
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Value,
}

fn code_string<'de, D: serde::Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(parse::string(d)?.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPage {
    #[serde(default)]
    list: Vec<Value>,
    #[serde(default, deserialize_with = "parse::string")]
    end_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Account {
    #[serde(default, deserialize_with = "parse::decimal")]
    usdt_equity: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPosition {
    #[serde(default, deserialize_with = "parse::string")]
    position_id: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    hold_side: Option<String>,
    #[serde(default, deserialize_with = "parse::decimal")]
    close_total_pos: Option<Decimal>,
    #[serde(default, deserialize_with = "parse::decimal")]
    open_avg_price: Option<Decimal>,
    #[serde(default, deserialize_with = "parse::decimal")]
    pnl: Option<Decimal>,
    #[serde(default, deserialize_with = "parse::millis")]
    utime: Option<DateTime<Utc>>,
}

impl HistoryPosition {
    fn into_position(self) -> Result<ClosedPosition, String> {
        let hold_side = self.hold_side.ok_or("missing holdSide")?;
        let qty = self.close_total_pos.ok_or("missing closeTotalPos")?;
        let price = self.open_avg_price.ok_or("missing openAvgPrice")?;
        Ok(ClosedPosition {
            external_id: self.position_id.ok_or("missing positionId")?,
            exchange: Exchange::Bitget,
            symbol: self.symbol.filter(|s| !s.is_empty()).ok_or("missing symbol")?,
            side: Side::from_api_str(&hold_side)
                .ok_or_else(|| format!("unknown holdSide {hold_side:?}"))?,
            volume: qty * price,
            // history-position does not report leverage
            leverage: 1,
            closed_pnl: self.pnl.ok_or("missing pnl")?,
            updated_at: self.utime.ok_or("missing utime")?,
        })
    }
}
