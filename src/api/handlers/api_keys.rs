use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::db::api_key_repo;
use crate::errors::AppError;
use crate::models::{ApiKey, Credential};
use crate::AppState;

use super::{exchange_filter, ok, parse_exchange, ApiResponse};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub exchange: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveKeyRequest {
    pub exchange: String,
    pub api_key: String,
    pub api_secret: String,
    #[serde(default)]
    pub passphrase: Option<String>,
}

/// GET /api/v1/api-keys — secrets are always masked
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<ApiKey>>>, AppError> {
    let rows: Vec<ApiKey> = match exchange_filter(query.exchange.as_deref())? {
        Some(exchange) => api_key_repo::get_by_exchange(&state.db, &exchange)
            .await?
            .into_iter()
            .collect(),
        None => api_key_repo::get_all(&state.db).await?,
    };

    Ok(ok(rows.iter().map(ApiKey::masked).collect()))
}

/// POST /api/v1/api-keys — upsert a batch of credentials, one per exchange
pub async fn save(
    State(state): State<AppState>,
    Json(requests): Json<Vec<SaveKeyRequest>>,
) -> Result<Json<ApiResponse<Vec<ApiKey>>>, AppError> {
    if requests.is_empty() {
        return Err(AppError::BadRequest("at least one credential is required".into()));
    }

    // Validate everything before writing anything.
    let mut credentials = Vec::with_capacity(requests.len());
    for req in requests {
        let exchange = parse_exchange(&req.exchange)?;
        let mut credential = Credential::new(exchange.as_str(), req.api_key.trim(), req.api_secret.trim());
        credential.passphrase = req.passphrase.filter(|p| !p.is_empty());
        if !credential.is_complete() {
            return Err(AppError::BadRequest(format!(
                "apiKey and apiSecret are required for {exchange}"
            )));
        }
        credentials.push(credential);
    }

    let mut saved = Vec::with_capacity(credentials.len());
    for credential in &credentials {
        let row = api_key_repo::upsert(&state.db, credential).await?;
        tracing::info!(exchange = %row.exchange, "API key saved");
        saved.push(row.masked());
    }

    Ok(ok(saved))
}
