//! Postgres data access for the control plane: accounts, repository
//! bindings, and branch trigger configs.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use gantry_core::{
    config::DbConfig,
    models::{Account, BranchConfig, Repository},
    store::ControlPlaneStore,
};
use sqlx::{
    Row,
    postgres::{PgPool, PgPoolOptions, PgRow},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("row not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    /// Connect and bring the schema up to date. Any failure here is fatal:
    /// the process must not serve webhooks it cannot resolve.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.url)
            .await
            .context("Failed to connect to database")?;
        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;
        tracing::debug!("Database pool created, schema up to date");
        Ok(Self { pool })
    }

    pub async fn close(&self) { self.pool.close().await }

    // =========================================================================
    // Accounts
    // =========================================================================

    pub async fn find_account_by_login(&self, login: &str) -> Result<Option<Account>, DbError> {
        let row = sqlx::query(
            r#"
            SELECT id, login, webhook_secret, access_token, is_admin
            FROM accounts
            WHERE login = $1
            "#,
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| account_from_row(&row)).transpose()
    }

    /// Create the account if it does not exist yet. Used for the startup
    /// admin bootstrap; regular provisioning happens out of band.
    pub async fn ensure_account(&self, login: &str, is_admin: bool) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (login, is_admin)
            VALUES ($1, $2)
            ON CONFLICT (login) DO NOTHING
            "#,
        )
        .bind(login)
        .bind(is_admin)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_webhook_secret(
        &self,
        account_id: i64,
        secret: &str,
    ) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE accounts SET webhook_secret = $2 WHERE id = $1")
            .bind(account_id)
            .bind(secret)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn update_access_token(&self, account_id: i64, token: &str) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE accounts SET access_token = $2 WHERE id = $1")
            .bind(account_id)
            .bind(token)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    // =========================================================================
    // Repository bindings
    // =========================================================================

    pub async fn create_repository(
        &self,
        full_name: &str,
        account_id: i64,
    ) -> Result<Repository, DbError> {
        let row = sqlx::query(
            r#"
            INSERT INTO repositories (full_name, account_id)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(full_name)
        .bind(account_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(format!("repository `{full_name}` is already bound"))
            }
            e => DbError::Sqlx(e),
        })?;
        Ok(Repository { id: row.try_get("id")?, full_name: full_name.to_string(), account_id })
    }

    pub async fn find_repository_by_id(&self, id: i64) -> Result<Option<Repository>, DbError> {
        let row = sqlx::query(
            "SELECT id, full_name, account_id FROM repositories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| repository_from_row(&row)).transpose()
    }

    pub async fn find_repository_by_full_name(
        &self,
        full_name: &str,
    ) -> Result<Option<Repository>, DbError> {
        let row = sqlx::query(
            "SELECT id, full_name, account_id FROM repositories WHERE full_name = $1",
        )
        .bind(full_name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| repository_from_row(&row)).transpose()
    }

    pub async fn list_repositories(&self, account_id: i64) -> Result<Vec<Repository>, DbError> {
        let rows = sqlx::query(
            "SELECT id, full_name, account_id FROM repositories WHERE account_id = $1 ORDER BY id",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(repository_from_row).collect()
    }

    pub async fn delete_repository(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM repositories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    // =========================================================================
    // Branch trigger configs
    // =========================================================================

    pub async fn create_branch_config(
        &self,
        repository_id: i64,
        branch: &str,
        ci_enabled: bool,
    ) -> Result<BranchConfig, DbError> {
        sqlx::query(
            r#"
            INSERT INTO branch_configs (repository_id, branch, ci_enabled)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(repository_id)
        .bind(branch)
        .bind(ci_enabled)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(format!("branch `{branch}` is already configured"))
            }
            e => DbError::Sqlx(e),
        })?;
        Ok(BranchConfig { repository_id, branch: branch.to_string(), ci_enabled })
    }

    pub async fn find_branch_config(
        &self,
        repository_id: i64,
        branch: &str,
    ) -> Result<Option<BranchConfig>, DbError> {
        let row = sqlx::query(
            r#"
            SELECT repository_id, branch, ci_enabled
            FROM branch_configs
            WHERE repository_id = $1 AND branch = $2
            "#,
        )
        .bind(repository_id)
        .bind(branch)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| branch_config_from_row(&row)).transpose()
    }

    pub async fn list_branch_configs(
        &self,
        repository_id: i64,
    ) -> Result<Vec<BranchConfig>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT repository_id, branch, ci_enabled
            FROM branch_configs
            WHERE repository_id = $1
            ORDER BY branch
            "#,
        )
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(branch_config_from_row).collect()
    }

    pub async fn delete_branch_config(
        &self,
        repository_id: i64,
        branch: &str,
    ) -> Result<(), DbError> {
        let result =
            sqlx::query("DELETE FROM branch_configs WHERE repository_id = $1 AND branch = $2")
                .bind(repository_id)
                .bind(branch)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

fn account_from_row(row: &PgRow) -> Result<Account, DbError> {
    Ok(Account {
        id: row.try_get("id")?,
        login: row.try_get("login")?,
        webhook_secret: row.try_get("webhook_secret")?,
        access_token: row.try_get("access_token")?,
        is_admin: row.try_get("is_admin")?,
    })
}

fn repository_from_row(row: &PgRow) -> Result<Repository, DbError> {
    Ok(Repository {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        account_id: row.try_get("account_id")?,
    })
}

fn branch_config_from_row(row: &PgRow) -> Result<BranchConfig, DbError> {
    Ok(BranchConfig {
        repository_id: row.try_get("repository_id")?,
        branch: row.try_get("branch")?,
        ci_enabled: row.try_get("ci_enabled")?,
    })
}

#[async_trait]
impl ControlPlaneStore for Database {
    async fn find_account_by_login(&self, login: &str) -> Result<Option<Account>> {
        Ok(Database::find_account_by_login(self, login).await?)
    }

    async fn find_repository_by_full_name(&self, full_name: &str) -> Result<Option<Repository>> {
        Ok(Database::find_repository_by_full_name(self, full_name).await?)
    }

    async fn find_branch_config(
        &self,
        repository_id: i64,
        branch: &str,
    ) -> Result<Option<BranchConfig>> {
        Ok(Database::find_branch_config(self, repository_id, branch).await?)
    }
}
