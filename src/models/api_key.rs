use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row for the api_keys table. One row per exchange.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub id: Uuid,
    pub exchange: String,
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiKey {
    /// Copy with key, secret and passphrase masked for read responses.
    pub fn masked(&self) -> Self {
        Self {
            api_key: mask_secret(&self.api_key),
            api_secret: mask_secret(&self.api_secret),
            passphrase: self.passphrase.as_deref().map(mask_secret),
            ..self.clone()
        }
    }
}

/// The part of a credential the adapters need.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub exchange: String,
    pub api_key: String,
    pub api_secret: String,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Credential {
    pub fn new(exchange: &str, api_key: &str, api_secret: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            passphrase: None,
            is_active: true,
        }
    }

    /// Key and secret are both present.
    pub fn is_complete(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.api_secret.trim().is_empty()
    }

    /// Active and complete: usable for authenticated calls.
    pub fn is_usable(&self) -> bool {
        self.is_active && self.is_complete()
    }
}

impl From<ApiKey> for Credential {
    fn from(row: ApiKey) -> Self {
        Self {
            exchange: row.exchange,
            api_key: row.api_key,
            api_secret: row.api_secret,
            passphrase: row.passphrase,
            is_active: row.is_active,
        }
    }
}

/// `ABCD****WXYZ` for values longer than 8 chars, `****` otherwise.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    if chars.len() <= 8 {
        return "****".into();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("ABCDEFGHIJWXYZ"), "ABCD****WXYZ");
        assert_eq!(mask_secret("short"), "****");
        assert_eq!(mask_secret("12345678"), "****");
        assert_eq!(mask_secret(""), "");
    }

    #[test]
    fn test_masked_row_hides_all_secrets() {
        let row = ApiKey {
            id: Uuid::new_v4(),
            exchange: "bitget".into(),
            api_key: "bg_0123456789abcdef".into(),
            api_secret: "secret-secret-secret".into(),
            passphrase: Some("pass".into()),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let masked = row.masked();
        assert_eq!(masked.api_key, "bg_0****cdef");
        assert_eq!(masked.api_secret, "secr****cret");
        assert_eq!(masked.passphrase.as_deref(), Some("****"));
        assert_eq!(masked.exchange, "bitget");
    }

    #[test]
    fn test_credential_usability() {
        let mut cred = Credential::new("bybit", "key", "secret");
        assert!(cred.is_usable());

        cred.api_secret = "  ".into();
        assert!(!cred.is_complete());

        let mut inactive = Credential::new("mexc", "key", "secret");
        inactive.is_active = false;
        assert!(inactive.is_complete());
        assert!(!inactive.is_usable());
    }
}
