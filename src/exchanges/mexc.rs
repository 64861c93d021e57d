use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::auth::{canonical_query, mexc_signature};
use super::contract::contract_volume;
use super::paging::{collect_pages, Batch, Page};
use super::{build_client, now_millis, parse, require_complete, send, RawResponse};
use super::{ExchangeAdapter, ExchangeError, FetchOutcome};
use crate::config::AppConfig;
use crate::models::position::normalize_leverage;
use crate::models::{ClosedPosition, Credential, Exchange, Side};

const HISTORY_PATH: &str = "/api/v1/private/position/list/history_positions";
const OVERVIEW_PATH: &str = "/api/v1/private/account/overview";
const PAGE_SIZE: usize = 100;

const RATE_LIMIT_CODE: i64 = 510;
const AUTH_CODES: &[i64] = &[401, 402, 602];
const NO_ACCOUNT_CODE: i64 = 404;

#[derive(Debug, Clone)]
pub struct MexcConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub request_delay: Duration,
}

impl MexcConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            base_url: config.mexc_base_url.clone(),
            timeout: config.http_timeout,
            request_delay: config.request_delay,
        }
    }
}

pub struct MexcAdapter {
    http: Client,
    config: MexcConfig,
}

impl MexcAdapter {
    pub fn new(config: MexcConfig) -> Result<Self, ExchangeError> {
        Ok(Self {
            http: build_client(config.timeout)?,
            config,
        })
    }

    async fn get(
        &self,
        creds: &Credential,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<RawResponse, ExchangeError> {
        let query = canonical_query(params);
        let timestamp = now_millis();
        let signature = mexc_signature(&creds.api_secret, &creds.api_key, timestamp, &query)?;

        let url = if query.is_empty() {
            format!("{}{}", self.config.base_url, path)
        } else {
            format!("{}{}?{}", self.config.base_url, path, query)
        };
        send(
            self.http
                .get(&url)
                .header("ApiKey", &creds.api_key)
                .header("Request-Time", timestamp.to_string())
                .header("Signature", signature)
                .header("Content-Type", "application/json"),
        )
        .await
    }

    async fn history_page(
        &self,
        creds: &Credential,
        page_num: u32,
    ) -> Result<Page<ClosedPosition, u32>, ExchangeError> {
        let params = [
            ("page_num", page_num.to_string()),
            ("page_size", PAGE_SIZE.to_string()),
        ];
        let raw = self.get(creds, HISTORY_PATH, &params).await?;
        raw.check_status(&[429])?;
        let data = unwrap_envelope(&raw.body)?;

        Ok(Page {
            batch: decode_history(data),
            next: Some(page_num + 1),
        })
    }
}

#[async_trait]
impl ExchangeAdapter for MexcAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Mexc
    }

    async fn fetch_closed_positions(&self, creds: &Credential) -> Result<FetchOutcome, ExchangeError> {
        require_complete(creds)?;

        collect_pages(PAGE_SIZE, self.config.request_delay, |page: Option<u32>| {
            self.history_page(creds, page.unwrap_or(1))
        })
        .await
    }

    async fn fetch_balance(&self, creds: &Credential) -> Result<Decimal, ExchangeError> {
        require_complete(creds)?;

        let raw = self.get(creds, OVERVIEW_PATH, &[]).await?;
        if raw.status == 404 {
            return Ok(Decimal::ZERO);
        }
        raw.check_status(&[429])?;

        let data = match unwrap_envelope(&raw.body) {
            Ok(data) => data,
            Err(ExchangeError::Api { code, .. }) if code == NO_ACCOUNT_CODE.to_string() => {
                return Ok(Decimal::ZERO)
            }
            Err(e) => return Err(e),
        };
        let overview: Overview = serde_json::from_value(data)?;
        Ok(overview.account_balance.unwrap_or(Decimal::ZERO))
    }
}

/// Return `data` of a successful envelope, or the mapped error.
fn unwrap_envelope(body: &str) -> Result<Value, ExchangeError> {
    let envelope: Envelope = serde_json::from_str(body)?;
    if envelope.success && envelope.code == 0 {
        return Ok(envelope.data);
    }

    let message = envelope.message.unwrap_or_default();
    Err(match envelope.code {
        RATE_LIMIT_CODE => ExchangeError::RateLimited {
            code: envelope.code.to_string(),
        },
        code if AUTH_CODES.contains(&code) => ExchangeError::Auth(format!("{code}: {message}")),
        code => ExchangeError::Api {
            code: code.to_string(),
            message,
        },
    })
}

/// `data` is either an array of history positions or an object whose
/// `list` holds deal records.
fn decode_history(data: Value) -> Batch<ClosedPosition> {
    match data {
        Value::Array(items) => parse::decode_records(Exchange::Mexc, items, HistoryPosition::into_position),
        Value::Object(mut obj) => match obj.remove("list") {
            Some(Value::Array(items)) => parse::decode_records(Exchange::Mexc, items, Deal::into_position),
            _ => Batch::default(),
        },
        _ => Batch::default(),
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    code: i64,
    #[serde(default, alias = "msg")]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Overview {
    #[serde(default, deserialize_with = "parse::decimal")]
    account_balance: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPosition {
    #[serde(default, deserialize_with = "parse::string")]
    position_id: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default, deserialize_with = "parse::integer")]
    position_type: Option<i64>,
    #[serde(default, deserialize_with = "parse::decimal")]
    close_vol: Option<Decimal>,
    #[serde(default, deserialize_with = "parse::decimal")]
    open_avg_price: Option<Decimal>,
    #[serde(default, deserialize_with = "parse::integer")]
    leverage: Option<i64>,
    #[serde(default, deserialize_with = "parse::decimal")]
    close_profit_loss: Option<Decimal>,
    #[serde(default, deserialize_with = "parse::millis")]
    update_time: Option<DateTime<Utc>>,
}

impl HistoryPosition {
    fn into_position(self) -> Result<ClosedPosition, String> {
        let symbol = self.symbol.filter(|s| !s.is_empty()).ok_or("missing symbol")?;
        let side = match self.position_type {
            Some(1) => Side::Buy,
            Some(2) => Side::Sell,
            other => return Err(format!("unknown positionType {other:?}")),
        };
        let qty = self.close_vol.ok_or("missing closeVol")?;
        let price = self.open_avg_price.ok_or("missing openAvgPrice")?;
        Ok(ClosedPosition {
            external_id: self.position_id.ok_or("missing positionId")?,
            exchange: Exchange::Mexc,
            volume: contract_volume(&symbol, qty, price),
            symbol,
            side,
            leverage: normalize_leverage(self.leverage),
            closed_pnl: self.close_profit_loss.ok_or("missing closeProfitLoss")?,
            updated_at: self.update_time.ok_or("missing updateTime")?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Deal {
    #[serde(default, deserialize_with = "parse::string")]
    order_id: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default, deserialize_with = "parse::integer")]
    side: Option<i64>,
    #[serde(default, deserialize_with = "parse::decimal")]
    deal_avg_price: Option<Decimal>,
    #[serde(default, deserialize_with = "parse::decimal")]
    deal_qty: Option<Decimal>,
    #[serde(default, deserialize_with = "parse::integer")]
    leverage: Option<i64>,
    #[serde(default, deserialize_with = "parse::decimal")]
    profit: Option<Decimal>,
    #[serde(default, deserialize_with = "parse::millis")]
    create_time: Option<DateTime<Utc>>,
}

impl Deal {
    fn into_position(self) -> Result<ClosedPosition, String> {
        let symbol = self.symbol.filter(|s| !s.is_empty()).ok_or("missing symbol")?;
        // 1 open long, 2 close short, 3 open short, 4 close long
        let side = match self.side {
            Some(1) | Some(2) => Side::Buy,
            Some(3) | Some(4) => Side::Sell,
            other => return Err(format!("unknown side {other:?}")),
        };
        let qty = self.deal_qty.ok_or("missing dealQty")?;
        let price = self.deal_avg_price.ok_or("missing dealAvgPrice")?;
        Ok(ClosedPosition {
            external_id: self.order_id.ok_or("missing orderId")?,
            exchange: Exchange::Mexc,
            volume: contract_volume(&symbol, qty, price),
            symbol,
            side,
            leverage: normalize_leverage(self.leverage),
            closed_pnl: self.profit.unwrap_or(Decimal::ZERO),
            updated_at: self.create_time.ok_or("missing createTime")?,
        })
    }
}
