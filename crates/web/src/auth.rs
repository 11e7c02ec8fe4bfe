//! Bearer-token authorization for the management API.
//!
//! Tokens are HS256 JWTs minted by the identity service; this tier only
//! validates them and resolves the account. There is no login endpoint here.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use gantry_core::models::Account;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account login.
    pub sub: String,
    #[serde(default)]
    pub admin: bool,
    pub exp: u64,
}

/// Extractor for the account behind the `Authorization: Bearer` header.
/// Admin status comes from the account row, not the token claim, so a
/// demotion takes effect without waiting for token expiry.
pub struct CurrentAccount(pub Account);

impl FromRequestParts<AppState> for CurrentAccount {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| (StatusCode::UNAUTHORIZED, "Missing bearer token").into_response())?;
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.config.auth.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|err| {
            tracing::debug!("Rejected bearer token: {err}");
            (StatusCode::UNAUTHORIZED, "Invalid bearer token").into_response()
        })?
        .claims;
        let account = state
            .db
            .find_account_by_login(&claims.sub)
            .await
            .map_err(|err| {
                tracing::error!("Account lookup failed: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            })?
            .ok_or_else(|| (StatusCode::UNAUTHORIZED, "Unknown account").into_response())?;
        Ok(CurrentAccount(account))
    }
}
