use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gantry_core::AppError;
use serde::Deserialize;

use crate::{AppState, auth::CurrentAccount, handlers::db_error};

#[derive(Debug, Deserialize)]
pub struct WebhookSecretRequest {
    pub secret: String,
}

/// Set the shared secret deliveries are verified against. An empty secret
/// switches the account back to unsecured mode.
pub async fn set_webhook_secret(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Json(request): Json<WebhookSecretRequest>,
) -> Result<Response, AppError> {
    state.db.update_webhook_secret(account.id, &request.secret).await.map_err(db_error)?;
    tracing::info!("Updated webhook secret for `{}`", account.login);
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[derive(Debug, Deserialize)]
pub struct AccessTokenRequest {
    pub token: String,
}

/// Set the source-control token build jobs are published with.
pub async fn set_access_token(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Json(request): Json<AccessTokenRequest>,
) -> Result<Response, AppError> {
    if request.token.is_empty() {
        return Ok((StatusCode::BAD_REQUEST, "Token not provided").into_response());
    }
    state.db.update_access_token(account.id, &request.token).await.map_err(db_error)?;
    tracing::info!("Updated access token for `{}`", account.login);
    Ok(StatusCode::NO_CONTENT.into_response())
}
