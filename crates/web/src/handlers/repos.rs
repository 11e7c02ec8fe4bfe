use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gantry_core::{AppError, models::Repository};
use serde::Deserialize;

use crate::{
    AppState,
    auth::CurrentAccount,
    handlers::{authorize_repository, db_error},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRepositoryRequest {
    pub full_name: String,
}

pub async fn create(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Json(request): Json<CreateRepositoryRequest>,
) -> Result<Response, AppError> {
    if request.full_name.is_empty() {
        return Ok((StatusCode::BAD_REQUEST, "Repository name not provided").into_response());
    }
    let repository =
        state.db.create_repository(&request.full_name, account.id).await.map_err(db_error)?;
    tracing::info!("Bound repository `{}` to `{}`", repository.full_name, account.login);
    Ok((StatusCode::CREATED, Json(repository)).into_response())
}

pub async fn list(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<Vec<Repository>>, AppError> {
    Ok(Json(state.db.list_repositories(account.id).await.map_err(db_error)?))
}

pub async fn get(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Path(id): Path<i64>,
) -> Result<Json<Repository>, AppError> {
    let repository = authorize_repository(&state, &account, id).await?;
    Ok(Json(repository))
}

pub async fn remove(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let repository = authorize_repository(&state, &account, id).await?;
    state.db.delete_repository(repository.id).await.map_err(db_error)?;
    tracing::info!("Unbound repository `{}`", repository.full_name);
    Ok(StatusCode::NO_CONTENT.into_response())
}
