use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Account, BranchConfig, Repository};

/// The lookups the webhook pipeline performs against the control-plane data
/// layer. Kept behind a trait so the pipeline can be exercised without a
/// database.
#[async_trait]
pub trait ControlPlaneStore: Send + Sync {
    async fn find_account_by_login(&self, login: &str) -> Result<Option<Account>>;

    async fn find_repository_by_full_name(&self, full_name: &str) -> Result<Option<Repository>>;

    async fn find_branch_config(
        &self,
        repository_id: i64,
        branch: &str,
    ) -> Result<Option<BranchConfig>>;
}
