use std::fmt;

use serde::Serialize;

/// An account that receives webhooks at `/webhooks/{login}`.
///
/// An empty `webhook_secret` disables signature verification for the
/// account's deliveries. The `access_token` is never used by the ingress
/// tier itself; it is carried into the build job for the worker to clone
/// with.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: i64,
    pub login: String,
    #[serde(skip_serializing)]
    pub webhook_secret: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("login", &self.login)
            .field("webhook_secret", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .field("is_admin", &self.is_admin)
            .finish()
    }
}

/// Binding of a source-host repository ("owner/repo") to an owning account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: i64,
    pub full_name: String,
    pub account_id: i64,
}

/// Per-branch CI opt-in. Absence of a row means the branch is disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchConfig {
    pub repository_id: i64,
    pub branch: String,
    pub ci_enabled: bool,
}
