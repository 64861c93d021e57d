use std::env;
use std::time::Duration;

use crate::models::{Credential, Exchange};

pub const DEFAULT_BYBIT_URL: &str = "https://api.bybit.com";
pub const DEFAULT_MEXC_URL: &str = "https://api.mexc.com";
pub const DEFAULT_BITGET_URL: &str = "https://api.bitget.com";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    // Sync scheduler
    pub sync_exchanges: Vec<Exchange>,
    pub sync_interval: Duration,
    pub sync_timeout: Duration,

    // Exchange HTTP
    pub http_timeout: Duration,
    pub request_delay: Duration,
    pub bybit_base_url: String,
    pub mexc_base_url: String,
    pub bitget_base_url: String,
    pub bybit_recv_window: u64,

    /// Credentials from the environment, upserted into the store at boot.
    pub bootstrap_credentials: Vec<Credential>,

    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            host: "0.0.0.0".into(),
            port: 8080,
            sync_exchanges: vec![Exchange::Bybit, Exchange::Mexc],
            sync_interval: Duration::from_secs(30),
            sync_timeout: Duration::from_secs(120),
            http_timeout: Duration::from_secs(30),
            request_delay: Duration::from_millis(50),
            bybit_base_url: DEFAULT_BYBIT_URL.into(),
            mexc_base_url: DEFAULT_MEXC_URL.into(),
            bitget_base_url: DEFAULT_BITGET_URL.into(),
            bybit_recv_window: 30_000,
            bootstrap_credentials: Vec::new(),
            log_json: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let sync_exchanges = match env::var("SYNC_EXCHANGES") {
            Ok(raw) => parse_exchanges(&raw)?,
            Err(_) => defaults.sync_exchanges,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            host: env::var("HOST").unwrap_or(defaults.host),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,

            sync_exchanges,
            sync_interval: Duration::from_secs(env_u64("SYNC_INTERVAL_SECS", 30)?),
            sync_timeout: Duration::from_secs(env_u64("SYNC_TIMEOUT_SECS", 120)?),

            http_timeout: Duration::from_secs(env_u64("HTTP_TIMEOUT_SECS", 30)?),
            request_delay: Duration::from_millis(env_u64("REQUEST_DELAY_MS", 50)?),
            bybit_base_url: env::var("BYBIT_BASE_URL").unwrap_or(defaults.bybit_base_url),
            mexc_base_url: env::var("MEXC_BASE_URL").unwrap_or(defaults.mexc_base_url),
            bitget_base_url: env::var("BITGET_BASE_URL").unwrap_or(defaults.bitget_base_url),
            bybit_recv_window: env_u64("BYBIT_RECV_WINDOW", 30_000)?,

            bootstrap_credentials: bootstrap_credentials(),

            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }
}

fn env_u64(name: &str, default: u64) -> anyhow::Result<u64> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{name} must be a non-negative integer: {e}")),
        Err(_) => Ok(default),
    }
}

/// Comma-separated exchange names. Duplicates collapse; unknown names fail.
pub fn parse_exchanges(raw: &str) -> anyhow::Result<Vec<Exchange>> {
    let mut out = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let exchange = Exchange::from_str(name)
            .ok_or_else(|| anyhow::anyhow!("unsupported exchange in SYNC_EXCHANGES: {name}"))?;
        if !out.contains(&exchange) {
            out.push(exchange);
        }
    }
    Ok(out)
}

fn bootstrap_credentials() -> Vec<Credential> {
    let mut creds = Vec::new();
    for exchange in Exchange::ALL {
        let prefix = exchange.as_str().to_uppercase();
        let key = env::var(format!("{prefix}_API_KEY")).unwrap_or_default();
        let secret = env::var(format!("{prefix}_API_SECRET")).unwrap_or_default();
        let mut cred = Credential::new(exchange.as_str(), &key, &secret);
        cred.passphrase = env::var(format!("{prefix}_PASSPHRASE"))
            .ok()
            .filter(|p| !p.is_empty());
        if cred.is_complete() {
            creds.push(cred);
        }
    }
    creds
}
