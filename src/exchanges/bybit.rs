use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Months, TimeDelta, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::auth::{bybit_signature, canonical_query};
use super::paging::{collect_pages, collect_windows, time_windows, Batch, Page, TimeWindow};
use super::{build_client, now_millis, parse, require_complete, send, RawResponse};
use super::{ExchangeAdapter, ExchangeError, FetchOutcome};
use crate::config::AppConfig;
use crate::models::position::normalize_leverage;
use crate::models::{ClosedPosition, Credential, Exchange, Side};

const CLOSED_PNL_PATH: &str = "/v5/position/closed-pnl";
const EXECUTION_PATH: &str = "/v5/execution/list";
const WALLET_PATH: &str = "/v5/account/wallet-balance";
const PAGE_SIZE: usize = 100;

const RATE_LIMIT_CODES: &[i64] = &[10006, 10018];
const AUTH_CODES: &[i64] = &[10003, 10004, 10005, 33004];
const RETENTION_MARKER: &str = "earlier than 2 years";

#[derive(Debug, Clone)]
pub struct BybitConfig {
    pub base_url: String,
    pub recv_window: u64,
    pub timeout: Duration,
    pub request_delay: Duration,
    /// Widest time range the API accepts per request.
    pub window: TimeDelta,
    /// How far back the execution-history fallback looks.
    pub fallback_lookback: TimeDelta,
}

impl Default for BybitConfig {
    fn default() -> Self {
        Self {
            base_url: crate::config::DEFAULT_BYBIT_URL.into(),
            recv_window: 30_000,
            timeout: Duration::from_secs(30),
            request_delay: Duration::from_millis(50),
            window: TimeDelta::days(7),
            fallback_lookback: TimeDelta::days(30),
        }
    }
}

impl BybitConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            base_url: config.bybit_base_url.clone(),
            recv_window: config.bybit_recv_window,
            timeout: config.http_timeout,
            request_delay: config.request_delay,
            ..Self::default()
        }
    }
}

/// Oldest instant the closed-pnl endpoint serves: two calendar years back,
/// plus a day of margin.
pub fn history_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(24))
        .unwrap_or(now)
        + TimeDelta::days(1)
}

pub struct BybitAdapter {
    http: Client,
    config: BybitConfig,
}

impl BybitAdapter {
    pub fn new(config: BybitConfig) -> Result<Self, ExchangeError> {
        Ok(Self {
            http: build_client(config.timeout)?,
            config,
        })
    }

    /// Signed GET returning the `result` object of a successful envelope.
    async fn get(
        &self,
        creds: &Credential,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value, ExchangeError> {
        let raw = self.get_raw(creds, path, params).await?;
        unwrap_envelope(&raw)
    }

    /// Signed GET without status or envelope handling.
    async fn get_raw(
        &self,
        creds: &Credential,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<RawResponse, ExchangeError> {
        let query = canonical_query(params);
        let timestamp = now_millis();
        let signature = bybit_signature(
            &creds.api_secret,
            timestamp,
            &creds.api_key,
            self.config.recv_window,
            &query,
        )?;

        let url = format!("{}{}?{}", self.config.base_url, path, query);
        send(
            self.http
                .get(&url)
                .header("X-BAPI-API-KEY", &creds.api_key)
                .header("X-BAPI-SIGN", signature)
                .header("X-BAPI-TIMESTAMP", timestamp.to_string())
                .header("X-BAPI-RECV-WINDOW", self.config.recv_window.to_string()),
        )
        .await
    }

    async fn list_page(
        &self,
        creds: &Credential,
        path: &str,
        window: TimeWindow,
        cursor: Option<String>,
    ) -> Result<(Vec<Value>, Option<String>), ExchangeError> {
        let mut params = vec![
            ("category", "linear".to_string()),
            ("limit", PAGE_SIZE.to_string()),
            ("startTime", window.start.timestamp_millis().to_string()),
            ("endTime", window.end.timestamp_millis().to_string()),
        ];
        if let Some(c) = cursor {
            params.push(("cursor", c));
        }
        let result: ListResult = serde_json::from_value(self.get(creds, path, &params).await?)?;
        let next = result.next_page_cursor.filter(|c| !c.is_empty());
        Ok((result.list, next))
    }

    async fn closed_pnl_window(
        &self,
        creds: &Credential,
        window: TimeWindow,
    ) -> Result<FetchOutcome, ExchangeError> {
        collect_pages(PAGE_SIZE, self.config.request_delay, |cursor| async move {
            let (items, next) = self.list_page(creds, CLOSED_PNL_PATH, window, cursor).await?;
            Ok(Page {
                batch: parse::decode_records(Exchange::Bybit, items, ClosedPnlItem::into_position),
                next,
            })
        })
        .await
    }

    async fn execution_window(
        &self,
        creds: &Credential,
        window: TimeWindow,
    ) -> Result<Batch<Execution>, ExchangeError> {
        collect_pages(PAGE_SIZE, self.config.request_delay, |cursor| async move {
            let (items, next) = self.list_page(creds, EXECUTION_PATH, window, cursor).await?;
            Ok(Page {
                batch: parse::decode_records(Exchange::Bybit, items, Execution::validate),
                next,
            })
        })
        .await
    }

    /// Primary strategy: closed-pnl records in fixed windows back to the
    /// retention limit.
    async fn fetch_closed_pnl(&self, creds: &Credential) -> Result<FetchOutcome, ExchangeError> {
        let now = Utc::now();
        let windows = time_windows(now, history_start(now), self.config.window);
        collect_windows(&windows, self.config.request_delay, |window| {
            self.closed_pnl_window(creds, window)
        })
        .await
    }

    /// Fallback strategy: rebuild positions from closing executions.
    async fn fetch_from_executions(&self, creds: &Credential) -> Result<FetchOutcome, ExchangeError> {
        let now = Utc::now();
        let windows = time_windows(now, now - self.config.fallback_lookback, self.config.window);
        let executions = collect_windows(&windows, self.config.request_delay, |window| {
            self.execution_window(creds, window)
        })
        .await?;

        Ok(Batch {
            items: aggregate_executions(executions.items),
            skipped: executions.skipped,
        })
    }
}

#[async_trait]
impl ExchangeAdapter for BybitAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Bybit
    }

    async fn fetch_closed_positions(&self, creds: &Credential) -> Result<FetchOutcome, ExchangeError> {
        require_complete(creds)?;

        let primary = self.fetch_closed_pnl(creds).await?;
        if !primary.items.is_empty() {
            return Ok(primary);
        }

        tracing::debug!(exchange = "bybit", "closed-pnl returned nothing, trying execution-history");
        let mut fallback = self.fetch_from_executions(creds).await?;
        fallback.skipped += primary.skipped;
        Ok(fallback)
    }

    async fn fetch_balance(&self, creds: &Credential) -> Result<Decimal, ExchangeError> {
        require_complete(creds)?;

        let raw = self
            .get_raw(creds, WALLET_PATH, &[("accountType", "UNIFIED".to_string())])
            .await?;
        if raw.status == 404 {
            return Ok(Decimal::ZERO);
        }
        let result = unwrap_envelope(&raw)?;
        let wallet: WalletResult = serde_json::from_value(result)?;
        Ok(wallet
            .list
            .first()
            .and_then(|account| account.total_equity)
            .unwrap_or(Decimal::ZERO))
    }
}

fn unwrap_envelope(raw: &RawResponse) -> Result<Value, ExchangeError> {
    raw.check_status(&[429, 403])?;

    let envelope: Envelope = serde_json::from_str(&raw.body)?;
    if envelope.ret_code != 0 {
        return Err(classify(envelope.ret_code, &envelope.ret_msg));
    }
    Ok(envelope.result)
}

/// Map a non-zero retCode. The retention message is checked before the
/// code, since it arrives under a generic parameter-error code.
fn classify(code: i64, message: &str) -> ExchangeError {
    if message.to_lowercase().contains(RETENTION_MARKER) {
        ExchangeError::RetentionExceeded(message.to_string())
    } else if RATE_LIMIT_CODES.contains(&code) {
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
#[serde(rename_all = "camelCase")]
struct Envelope {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResult {
    #[serde(default)]
    list: Vec<Value>,
    #[serde(default)]
    next_page_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WalletResult {
    #[serde(default)]
    list: Vec<WalletAccount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletAccount {
    #[serde(default, deserialize_with = "parse::decimal")]
    total_equity: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClosedPnlItem {
    #[serde(default, deserialize_with = "parse::string")]
    order_id: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    side: Option<String>,
    #[serde(default, deserialize_with = "parse::decimal")]
    closed_size: Option<Decimal>,
    #[serde(default, deserialize_with = "parse::decimal")]
    avg_entry_price: Option<Decimal>,
    #[serde(default, deserialize_with = "parse::integer")]
    leverage: Option<i64>,
    #[serde(default, deserialize_with = "parse::decimal")]
    closed_pnl: Option<Decimal>,
    #[serde(default, deserialize_with = "parse::millis")]
    updated_time: Option<DateTime<Utc>>,
}

impl ClosedPnlItem {
    fn into_position(self) -> Result<ClosedPosition, String> {
        let side = self.side.ok_or("missing side")?;
        let qty = self.closed_size.ok_or("missing closedSize")?;
        let price = self.avg_entry_price.ok_or("missing avgEntryPrice")?;
        Ok(ClosedPosition {
            external_id: self.order_id.ok_or("missing orderId")?,
            exchange: Exchange::Bybit,
            symbol: self.symbol.filter(|s| !s.is_empty()).ok_or("missing symbol")?,
            side: Side::from_api_str(&side).ok_or_else(|| format!("unknown side {side:?}"))?,
            volume: qty * price,
            leverage: normalize_leverage(self.leverage),
            closed_pnl: self.closed_pnl.ok_or("missing closedPnl")?,
            updated_at: self.updated_time.ok_or("missing updatedTime")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Execution {
    #[serde(default, deserialize_with = "parse::string")]
    order_id: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    side: Option<String>,
    #[serde(default, deserialize_with = "parse::decimal")]
    closed_size: Option<Decimal>,
    #[serde(default, deserialize_with = "parse::decimal")]
    exec_price: Option<Decimal>,
    #[serde(default, deserialize_with = "parse::decimal")]
    closed_pnl: Option<Decimal>,
    #[serde(default, deserialize_with = "parse::decimal")]
    exec_pnl: Option<Decimal>,
    #[serde(default, deserialize_with = "parse::millis")]
    exec_time: Option<DateTime<Utc>>,
}

impl Execution {
    /// Keep the record if it decodes. Opening fills are filtered during
    /// aggregation, not counted as malformed.
    fn validate(self) -> Result<Execution, String> {
        if self.order_id.as_deref().unwrap_or("").is_empty() {
            return Err("missing orderId".into());
        }
        Ok(self)
    }
}

/// Fold closing fills (non-zero closedSize) into one position per order.
/// Output keeps the order in which each orderId was first seen.
fn aggregate_executions(executions: Vec<Execution>) -> Vec<ClosedPosition> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<ClosedPosition> = Vec::new();

    for exec in executions {
        let closed = exec.closed_size.unwrap_or(Decimal::ZERO);
        if closed.is_zero() {
            continue;
        }
        let (Some(order_id), Some(price), Some(exec_time)) =
            (exec.order_id.clone(), exec.exec_price, exec.exec_time)
        else {
            continue;
        };
        let Some(side) = exec.side.as_deref().and_then(Side::from_api_str) else {
            continue;
        };
        let pnl = exec.closed_pnl.or(exec.exec_pnl).unwrap_or(Decimal::ZERO);

        match index.get(&order_id) {
            Some(&i) => {
                let position = &mut out[i];
                position.volume += closed * price;
                position.closed_pnl += pnl;
                position.updated_at = position.updated_at.max(exec_time);
            }
            None => {
                index.insert(order_id.clone(), out.len());
                out.push(ClosedPosition {
                    external_id: order_id,
                    exchange: Exchange::Bybit,
                    symbol: exec.symbol.clone().unwrap_or_default(),
                    side,
                    volume: closed * price,
                    leverage: 1,
                    closed_pnl: pnl,
                    updated_at: exec_time,
                });
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_closed_pnl_item_maps_to_position() {
        let item: ClosedPnlItem = serde_json::from_value(json!({
            "orderId": "ord-1",
            "symbol": "BTCUSDT",
            "side": "Sell",
            "closedSize": "0.5",
            "avgEntryPrice": "40000",
            "leverage": "10",
            "closedPnl": "-12.5",
            "updatedTime": "1700000000000"
        }))
        .unwrap();
        let p = item.into_position().unwrap();

        assert_eq!(p.external_id, "ord-1");
        assert_eq!(p.side, Side::Sell);
        assert_eq!(p.volume, dec("20000"));
        assert_eq!(p.leverage, 10);
        assert_eq!(p.closed_pnl, dec("-12.5"));
        assert_eq!(p.updated_at.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_closed_pnl_item_missing_leverage_defaults() {
        let item: ClosedPnlItem = serde_json::from_value(json!({
            "orderId": "ord-2", "symbol": "ETHUSDT", "side": "Buy",
            "closedSize": "1", "avgEntryPrice": "2000", "leverage": "",
            "closedPnl": "3", "updatedTime": 1700000000000i64
        }))
        .unwrap();
        assert_eq!(item.into_position().unwrap().leverage, 1);
    }

    #[test]
    fn test_closed_pnl_item_without_id_is_rejected() {
        let item: ClosedPnlItem = serde_json::from_value(json!({
            "symbol": "ETHUSDT", "side": "Buy", "closedSize": "1",
            "avgEntryPrice": "2000", "closedPnl": "3", "updatedTime": "1"
        }))
        .unwrap();
        assert!(item.into_position().is_err());
    }

    #[test]
    fn test_aggregate_executions_per_order() {
        let raw = json!([
            {"orderId": "a", "symbol": "BTCUSDT", "side": "Sell", "closedSize": "0.1",
             "execPrice": "40000", "closedPnl": "5", "execTime": "1000"},
            {"orderId": "b", "symbol": "ETHUSDT", "side": "Buy", "closedSize": "0",
             "execPrice": "2000", "execTime": "1500"},
            {"orderId": "a", "symbol": "BTCUSDT", "side": "Sell", "closedSize": "0.2",
             "execPrice": "41000", "execPnl": "7", "execTime": "3000"},
            {"orderId": "c", "symbol": "ETHUSDT", "side": "Buy", "closedSize": "2",
             "execPrice": "2000", "execTime": "2000"}
        ]);
        let executions: Vec<Execution> = serde_json::from_value(raw).unwrap();
        let positions = aggregate_executions(executions);

        assert_eq!(positions.len(), 2);
        let a = &positions[0];
        assert_eq!(a.external_id, "a");
        // 0.1 × 40000 + 0.2 × 41000
        assert_eq!(a.volume, dec("12200"));
        assert_eq!(a.closed_pnl, dec("12"));
        assert_eq!(a.updated_at.timestamp_millis(), 3000);
        assert_eq!(a.leverage, 1);

        let c = &positions[1];
        assert_eq!(c.external_id, "c");
        assert_eq!(c.closed_pnl, Decimal::ZERO);
    }

    #[test]
    fn test_classify_ret_codes() {
        assert!(matches!(
            classify(10001, "The query time range cannot be earlier than 2 years"),
            ExchangeError::RetentionExceeded(_)
        ));
        assert!(matches!(classify(10006, "Too many visits"), ExchangeError::RateLimited { .. }));
        assert!(matches!(classify(10018, "ip limit"), ExchangeError::RateLimited { .. }));
        assert!(matches!(classify(10003, "invalid key"), ExchangeError::Auth(_)));
        assert!(matches!(classify(10001, "params error"), ExchangeError::Api { .. }));
    }

    #[test]
    fn test_history_start_is_two_years_minus_a_day() {
        let now = DateTime::parse_from_rfc3339("2025-06-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let start = history_start(now);
        assert_eq!(start.to_rfc3339(), "2023-06-16T12:00:00+00:00");
    }
}
