//! Authorization engine for the Organization → Wiki → Document tree.
//!
//! Every (user, scope) pair holds at most one explicit record. Nothing is
//! inherited at check time: grants and revokes are materialized down the tree
//! by the cascade, and checks are single-record reads.
//!
//! - `store` persists records
//! - `tree` discovers child resources
//! - `cascade` propagates grants and revokes
//! - `delegation` guards one user changing another's role
//! - `checks` answers view / edit / delete
//! - `listing` serves membership and visibility queries

mod cascade;
mod checks;
mod delegation;
mod directory;
mod listing;
pub mod store;
pub mod tree;

pub use checks::Action;
pub use directory::{SqliteUserDirectory, UserDirectory};

use std::sync::Arc;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::AppResult;
use crate::models::authorization::{AuthRecord, Role, Scope};

/// Stable reasons carried by `AppError::Forbidden`.
pub mod reasons {
    pub const NO_ROLE_AT_SCOPE: &str = "acting user holds no role at this scope";
    pub const INSUFFICIENT_ROLE: &str = "only a creator or admin may change other users' roles";
    pub const ELEVATED_ROLE_REQUIRES_CREATOR: &str = "only a creator may assign or remove the creator or admin role";
    pub const TARGET_IS_CREATOR: &str = "a creator's role cannot be changed";
    pub const TARGET_IS_ADMIN: &str = "only a creator may change an admin's role";
    pub const VIEW_DENIED: &str = "access to this scope is blocked";
    pub const EDIT_DENIED: &str = "editing requires the creator or admin role";
    pub const DELETE_DENIED: &str = "deleting requires the creator role";
    pub const NOT_ORGANIZATION_MEMBER: &str = "user is not a member of the organization";
    pub const HOME_DOCUMENT_PROTECTED: &str = "a wiki's home document cannot be deleted";
}

#[derive(Clone)]
pub struct AccessEngine {
    pool: SqlitePool,
    config: EngineConfig,
    directory: Arc<dyn UserDirectory>,
}

impl std::fmt::Debug for AccessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessEngine").field("config", &self.config).finish_non_exhaustive()
    }
}

impl AccessEngine {
    pub fn new(pool: SqlitePool, config: EngineConfig) -> Self {
        let directory = Arc::new(SqliteUserDirectory::new(pool.clone()));
        Self { pool, config, directory }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The record at exactly `scope`, if any. No traversal.
    pub async fn get_record(&self, user_id: Uuid, scope: &Scope) -> AppResult<Option<AuthRecord>> {
        let mut conn = self.pool.acquire().await?;
        store::find_record(&mut conn, user_id, scope).await
    }

    pub async fn get_role(&self, user_id: Uuid, scope: &Scope) -> AppResult<Option<Role>> {
        Ok(self.get_record(user_id, scope).await?.map(|record| record.role))
    }

    /// Write a single record without cascading.
    pub async fn upsert_record(&self, user_id: Uuid, scope: &Scope, role: Role) -> AppResult<AuthRecord> {
        let mut conn = self.pool.acquire().await?;
        store::upsert_record(&mut conn, user_id, scope, role).await
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Raw resource rows for engine tests.

    use sqlx::SqlitePool;
    use uuid::Uuid;

    use crate::utils::utc_now;

    pub async fn user(pool: &SqlitePool, name: &str) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        let now = utc_now();
        sqlx::query("INSERT INTO users (id, name, email, created_at, updated_at) VALUES (?, ?, NULL, ?, ?)")
            .bind(id.to_string())
            .bind(name)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await?;
        Ok(id)
    }

    pub async fn organization(pool: &SqlitePool, creator: Uuid) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        let now = utc_now();
        sqlx::query(
            "INSERT INTO organizations (id, name, description, create_user_id, is_personal, created_at, updated_at) VALUES (?, ?, NULL, ?, 0, ?, ?)",
        )
        .bind(id.to_string())
        .bind(format!("org-{id}"))
        .bind(creator.to_string())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(id)
    }

    pub async fn wiki(pool: &SqlitePool, organization_id: Uuid, creator: Uuid) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        let now = utc_now();
        sqlx::query(
            "INSERT INTO wikis (id, organization_id, name, description, create_user_id, home_document_id, created_at, updated_at) VALUES (?, ?, ?, NULL, ?, NULL, ?, ?)",
        )
        .bind(id.to_string())
        .bind(organization_id.to_string())
        .bind(format!("wiki-{id}"))
        .bind(creator.to_string())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(id)
    }

    pub async fn document(pool: &SqlitePool, organization_id: Uuid, wiki_id: Uuid, creator: Uuid) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        let now = utc_now();
        sqlx::query(
            "INSERT INTO documents (id, organization_id, wiki_id, parent_document_id, title, create_user_id, is_wiki_home, created_at, updated_at) VALUES (?, ?, ?, NULL, 'Untitled', ?, 0, ?, ?)",
        )
        .bind(id.to_string())
        .bind(organization_id.to_string())
        .bind(wiki_id.to_string())
        .bind(creator.to_string())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(id)
    }
}
