use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::ExchangeError;

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(secret: &str, message: &str) -> Result<Vec<u8>, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Signing(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Bybit v5: hex(HMAC(secret, timestamp + apiKey + recvWindow + queryString)).
pub fn bybit_signature(
    secret: &str,
    timestamp: i64,
    api_key: &str,
    recv_window: u64,
    query: &str,
) -> Result<String, ExchangeError> {
    let message = format!("{timestamp}{api_key}{recv_window}{query}");
    Ok(hex::encode(hmac_sha256(secret, &message)?))
}

/// MEXC contract: hex(HMAC(secret, apiKey + timestamp + queryString)).
pub fn mexc_signature(
    secret: &str,
    api_key: &str,
    timestamp: i64,
    query: &str,
) -> Result<String, ExchangeError> {
    let message = format!("{api_key}{timestamp}{query}");
    Ok(hex::encode(hmac_sha256(secret, &message)?))
}

/// Bitget v2: base64(HMAC(secret, timestamp + METHOD + requestPath + body)).
/// `request_path` includes the `?query` part when present.
pub fn bitget_signature(
    secret: &str,
    timestamp: i64,
    method: &str,
    request_path: &str,
    body: &str,
) -> Result<String, ExchangeError> {
    let message = format!("{timestamp}{}{request_path}{body}", method.to_uppercase());
    Ok(BASE64.encode(hmac_sha256(secret, &message)?))
}

/// Build a query string with keys in sorted order and values url-encoded.
/// The same string is signed and sent, so the two can never disagree.
pub fn canonical_query(params: &[(&str, String)]) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bybit_signature_vector() {
        let sig = bybit_signature(
            "bybit-secret",
            1_700_000_000_000,
            "bybit-key",
            30_000,
            "category=linear&limit=100",
        )
        .unwrap();
        assert_eq!(
            sig,
            "185c0d62e9d0d5fb4302defbd048fccbb2602e7b16bbefa64d4aaf9da04fadef"
        );
    }

    #[test]
    fn test_mexc_signature_vector() {
        let sig = mexc_signature(
            "mexc-secret",
            "mexc-key",
            1_700_000_000_000,
            "page_num=1&page_size=100",
        )
        .unwrap();
        assert_eq!(
            sig,
            "6b2a371d35255a4c6738c34b105ba64e1f4bd9ee6b0314c30ffeca2bd66c7eb4"
        );
    }

    #[test]
    fn test_bitget_signature_vector() {
        let sig = bitget_signature(
            "bitget-secret",
            1_700_000_000_000,
            "get",
            "/api/v2/mix/account/accounts?productType=USDT-FUTURES",
            "",
        )
        .unwrap();
        assert_eq!(sig, "6v5uzCQXSzYhiRtHZcZ+KU2IEh4DrgV8U+9J48fbSXA=");
    }

    #[test]
    fn test_canonical_query_sorts_and_encodes() {
        let q = canonical_query(&[
            ("limit", "100".into()),
            ("cursor", "a b&c".into()),
            ("category", "linear".into()),
        ]);
        assert_eq!(q, "category=linear&cursor=a%20b%26c&limit=100");
        assert_eq!(canonical_query(&[]), "");
    }
}
