use axum::{
    Router,
    http::StatusCode,
    routing::{delete, get, post, put},
};
use gantry_core::{
    AppError,
    models::{Account, Repository},
};
use gantry_db::DbError;

use crate::AppState;

mod account;
mod branches;
mod repos;
mod webhook;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/webhooks/{login}", post(webhook::receive))
        .route("/api/v1/account/webhook-secret", put(account::set_webhook_secret))
        .route("/api/v1/account/access-token", put(account::set_access_token))
        .route("/api/v1/repos", post(repos::create))
        .route("/api/v1/repos", get(repos::list))
        .route("/api/v1/repos/{id}", get(repos::get))
        .route("/api/v1/repos/{id}", delete(repos::remove))
        .route("/api/v1/repos/{id}/branches", post(branches::create))
        .route("/api/v1/repos/{id}/branches", get(branches::list))
        .route("/api/v1/repos/{id}/branches/{branch}", delete(branches::remove))
}

pub(crate) fn db_error(err: DbError) -> AppError {
    match err {
        DbError::NotFound => AppError::Status(StatusCode::NOT_FOUND),
        DbError::Conflict(message) => {
            tracing::debug!("Conflict: {message}");
            AppError::Status(StatusCode::CONFLICT)
        }
        DbError::Sqlx(err) => AppError::Internal(err.into()),
    }
}

/// Resolve a repository and check the caller may manage it. Owners and
/// admins only.
pub(crate) async fn authorize_repository(
    state: &AppState,
    account: &Account,
    repository_id: i64,
) -> Result<Repository, AppError> {
    let repository = state
        .db
        .find_repository_by_id(repository_id)
        .await
        .map_err(db_error)?
        .ok_or(AppError::Status(StatusCode::NOT_FOUND))?;
    if !account.is_admin && repository.account_id != account.id {
        return Err(AppError::Status(StatusCode::FORBIDDEN));
    }
    Ok(repository)
}
