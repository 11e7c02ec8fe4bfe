use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gantry_core::{AppError, models::BranchConfig};
use serde::Deserialize;

use crate::{
    AppState,
    auth::CurrentAccount,
    handlers::{authorize_repository, db_error},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBranchConfigRequest {
    pub branch: String,
    /// Creating a config opts the branch in unless explicitly disabled.
    #[serde(default = "default_enabled")]
    pub ci_enabled: bool,
}

fn default_enabled() -> bool { true }

pub async fn create(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Path(id): Path<i64>,
    Json(request): Json<CreateBranchConfigRequest>,
) -> Result<Response, AppError> {
    if request.branch.is_empty() {
        return Ok((StatusCode::BAD_REQUEST, "Branch name not provided").into_response());
    }
    let repository = authorize_repository(&state, &account, id).await?;
    let config = state
        .db
        .create_branch_config(repository.id, &request.branch, request.ci_enabled)
        .await
        .map_err(db_error)?;
    tracing::info!(
        "Configured branch `{}` of `{}` (ci_enabled = {})",
        config.branch,
        repository.full_name,
        config.ci_enabled
    );
    Ok((StatusCode::CREATED, Json(config)).into_response())
}

pub async fn list(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Path(id): Path<i64>,
) -> Result<Json<Vec<BranchConfig>>, AppError> {
    let repository = authorize_repository(&state, &account, id).await?;
    Ok(Json(state.db.list_branch_configs(repository.id).await.map_err(db_error)?))
}

pub async fn remove(
    State(state): State<AppState>,
    CurrentAccount(account): CurrentAccount,
    Path((id, branch)): Path<(i64, String)>,
) -> Result<Response, AppError> {
    let repository = authorize_repository(&state, &account, id).await?;
    state.db.delete_branch_config(repository.id, &branch).await.map_err(db_error)?;
    tracing::info!("Removed branch config `{}` of `{}`", branch, repository.full_name);
    Ok(StatusCode::NO_CONTENT.into_response())
}
