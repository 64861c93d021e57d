use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("api error {code}: {message}")]
    Api { code: String, message: String },

    #[error("rate limited (code {code})")]
    RateLimited { code: String },

    /// The requested window lies beyond the exchange's history retention.
    #[error("history retention exceeded: {0}")]
    RetentionExceeded(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("credential incomplete: {0}")]
    MissingCredential(String),
}

impl ExchangeError {
    /// Errors that are expected to clear up on a later tick.
    pub fn is_transient(&self) -> bool {
        match self {
            ExchangeError::RateLimited { .. } | ExchangeError::RetentionExceeded(_) => true,
            ExchangeError::Http(e) => e.is_timeout() || e.is_connect(),
            ExchangeError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
