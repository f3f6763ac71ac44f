use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::row_parsers;
use crate::errors::AppResult;
use crate::models::user::User;
use crate::utils::placeholders;

/// Resolves user ids to identities. The engine only asks whether a user exists
/// and how to display a batch of them.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn exists(&self, user_id: Uuid) -> AppResult<bool>;

    async fn find_many(&self, user_ids: &[Uuid]) -> AppResult<Vec<User>>;
}

/// Directory backed by the local `users` table.
#[derive(Debug, Clone)]
pub struct SqliteUserDirectory {
    pool: SqlitePool,
}

impl SqliteUserDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn exists(&self, user_id: Uuid) -> AppResult<bool> {
        let found: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }

    async fn find_many(&self, user_ids: &[Uuid]) -> AppResult<Vec<User>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, name, email, created_at, updated_at FROM users WHERE id IN ({})",
            placeholders(user_ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in user_ids {
            query = query.bind(id.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_parsers::user_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::fixtures;
    use crate::db;

    #[tokio::test]
    async fn resolves_known_users_only() -> anyhow::Result<()> {
        let pool = db::memory_pool().await?;
        let ada = fixtures::user(&pool, "ada").await?;
        let directory = SqliteUserDirectory::new(pool);

        assert!(directory.exists(ada).await?);
        assert!(!directory.exists(Uuid::new_v4()).await?);

        let users = directory.find_many(&[ada, Uuid::new_v4()]).await?;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "ada");
        assert!(directory.find_many(&[]).await?.is_empty());
        Ok(())
    }
}
