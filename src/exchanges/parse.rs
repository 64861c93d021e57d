//! Lenient field decoding for exchange payloads.
//!
//! Exchanges send numbers as JSON strings, JSON numbers, or empty strings
//! depending on the endpoint. A missing value decodes to `None`; a value
//! that is present but unparsable fails the whole record so the caller
//! can skip it.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::paging::Batch;
use crate::models::Exchange;

fn raw<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!("expected string or number, got {other}"))),
    }
}

pub fn decimal<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Decimal>, D::Error> {
    raw(d)?
        .map(|s| {
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .map_err(|e| D::Error::custom(format!("invalid decimal {s:?}: {e}")))
        })
        .transpose()
}

pub fn integer<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    raw(d)?
        .map(|s| {
            s.parse::<i64>()
                .or_else(|_| s.parse::<f64>().map(|f| f.trunc() as i64))
                .map_err(|e| D::Error::custom(format!("invalid integer {s:?}: {e}")))
        })
        .transpose()
}

/// Epoch milliseconds.
pub fn millis<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    match integer(d)? {
        None => Ok(None),
        Some(ms) => DateTime::from_timestamp_millis(ms)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {ms}"))),
    }
}

/// Identifier sent as either a string or a number.
pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    raw(d)
}

/// Decode each raw record independently. Records that fail to decode, or
/// that `convert` rejects, are logged and counted instead of failing the
/// page.
pub fn decode_records<R, T, F>(exchange: Exchange, items: Vec<Value>, convert: F) -> Batch<T>
where
    R: DeserializeOwned,
    F: Fn(R) -> Result<T, String>,
{
    let mut batch = Batch::with_capacity(items.len());
    for item in items {
        let parsed = serde_json::from_value::<R>(item)
            .map_err(|e| e.to_string())
            .and_then(&convert);
        match parsed {
            Ok(record) => batch.items.push(record),
            Err(reason) => {
                batch.skipped += 1;
                tracing::debug!(%exchange, %reason, "Skipping malformed record");
            }
        }
    }
    batch
}
