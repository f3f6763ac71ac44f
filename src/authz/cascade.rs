use std::sync::Arc;

use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::{store, tree, AccessEngine};
use crate::config::CascadeMode;
use crate::errors::{AppError, AppResult};
use crate::models::authorization::{AuthRecord, Role, Scope};

// Every sequence below opens with a write. Inside a deferred SQLite
// transaction that takes the write lock up front, so a concurrent writer
// cannot invalidate an earlier read snapshot and force SQLITE_BUSY on upgrade.

#[derive(Debug, Clone, Copy)]
enum CascadeOp {
    Grant(Role),
    Revoke,
}

async fn apply(conn: &mut SqliteConnection, user_id: Uuid, scope: &Scope, op: CascadeOp) -> AppResult<u64> {
    match op {
        CascadeOp::Grant(role) => store::upsert_record(conn, user_id, scope, role).await.map(|_| 1),
        CascadeOp::Revoke => store::delete_record(conn, user_id, scope).await,
    }
}

async fn grant_tree(conn: &mut SqliteConnection, user_id: Uuid, scope: &Scope, role: Role) -> AppResult<AuthRecord> {
    let record = store::upsert_record(conn, user_id, scope, role).await?;
    for descendant in tree::descendants(conn, scope).await? {
        store::upsert_record(conn, user_id, &descendant, role).await?;
    }
    Ok(record)
}

async fn revoke_tree(conn: &mut SqliteConnection, user_id: Uuid, scope: &Scope) -> AppResult<u64> {
    let mut removed = store::delete_record(conn, user_id, scope).await?;
    for descendant in tree::descendants(conn, scope).await? {
        removed += store::delete_record(conn, user_id, &descendant).await?;
    }
    removed += store::delete_user_records_below(conn, user_id, scope).await?;
    Ok(removed)
}

async fn clear_scope(conn: &mut SqliteConnection, scope: &Scope) -> AppResult<u64> {
    let holders = store::take_scope_holders(conn, scope).await?;
    let mut removed = holders.len() as u64;
    for user_id in holders {
        removed += revoke_tree(conn, user_id, scope).await?;
    }
    removed += store::delete_scope_subtree(conn, scope).await?;
    Ok(removed)
}

async fn seed_child(conn: &mut SqliteConnection, parent: &Scope, child: &Scope, creator: Uuid) -> AppResult<AuthRecord> {
    let record = grant_tree(conn, creator, child, Role::Creator).await?;
    let (members, _) = store::records_at_scope(conn, parent, &Role::RECOGNIZED, None).await?;
    for member in members.iter().filter(|m| m.user_id != creator) {
        grant_tree(conn, member.user_id, child, member.role).await?;
    }
    Ok(record)
}

fn ensure_beneath(parent: &Scope, child: &Scope) -> AppResult<()> {
    if !parent.contains(child) || parent == child {
        return Err(AppError::bad_request(format!("{child} is not beneath {parent}")));
    }
    Ok(())
}

/// Apply `op` to every scope as bounded concurrent tasks. Every task is
/// awaited; the first failure is returned and completed writes are kept.
async fn fan_out(pool: &SqlitePool, limit: usize, user_id: Uuid, scopes: Vec<Scope>, op: CascadeOp) -> AppResult<u64> {
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut tasks = JoinSet::new();

    for scope in scopes {
        let pool = pool.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| AppError::internal(format!("cascade semaphore closed: {e}")))?;
            let mut conn = pool.acquire().await?;
            apply(&mut conn, user_id, &scope, op).await.map_err(|err| {
                tracing::warn!(user_id = %user_id, scope = %scope, error = %err, "cascade step failed");
                err
            })
        });
    }

    let mut affected = 0;
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(count)) => affected += count,
            Ok(Err(err)) => {
                first_error.get_or_insert(err);
            }
            Err(join_err) => {
                first_error.get_or_insert(AppError::internal(format!("cascade task failed: {join_err}")));
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(affected),
    }
}

impl AccessEngine {
    /// Set `role` for the user at `scope` and at every scope beneath it.
    pub async fn grant(&self, user_id: Uuid, scope: &Scope, role: Role) -> AppResult<AuthRecord> {
        let record = match self.config.cascade_mode {
            CascadeMode::Transactional => {
                let mut tx = self.pool.begin().await?;
                let record = grant_tree(&mut tx, user_id, scope, role).await?;
                tx.commit().await?;
                record
            }
            CascadeMode::Concurrent => {
                let (record, descendants) = {
                    let mut conn = self.pool.acquire().await?;
                    let record = store::upsert_record(&mut conn, user_id, scope, role).await?;
                    (record, tree::descendants(&mut conn, scope).await?)
                };
                fan_out(&self.pool, self.config.cascade_concurrency, user_id, descendants, CascadeOp::Grant(role)).await?;
                record
            }
        };

        tracing::info!(user_id = %user_id, scope = %scope, role = %role, "role granted");
        Ok(record)
    }

    /// Remove the user's record at `scope` and every record of theirs beneath it.
    /// Returns how many records were removed.
    pub async fn revoke(&self, user_id: Uuid, scope: &Scope) -> AppResult<u64> {
        let removed = match self.config.cascade_mode {
            CascadeMode::Transactional => {
                let mut tx = self.pool.begin().await?;
                let removed = revoke_tree(&mut tx, user_id, scope).await?;
                tx.commit().await?;
                removed
            }
            CascadeMode::Concurrent => {
                let (root, descendants) = {
                    let mut conn = self.pool.acquire().await?;
                    let root = store::delete_record(&mut conn, user_id, scope).await?;
                    (root, tree::descendants(&mut conn, scope).await?)
                };
                let below = fan_out(&self.pool, self.config.cascade_concurrency, user_id, descendants, CascadeOp::Revoke).await?;
                let mut conn = self.pool.acquire().await?;
                root + below + store::delete_user_records_below(&mut conn, user_id, scope).await?
            }
        };

        tracing::info!(user_id = %user_id, scope = %scope, removed, "role revoked");
        Ok(removed)
    }

    /// Clear every user's records at and beneath `scope`.
    pub async fn revoke_scope(&self, scope: &Scope) -> AppResult<u64> {
        let removed = match self.config.cascade_mode {
            CascadeMode::Transactional => {
                let mut tx = self.pool.begin().await?;
                let removed = clear_scope(&mut tx, scope).await?;
                tx.commit().await?;
                removed
            }
            CascadeMode::Concurrent => {
                let holders = {
                    let mut conn = self.pool.acquire().await?;
                    store::users_at_scope(&mut conn, scope).await?
                };
                let mut removed = 0;
                for user_id in holders {
                    removed += self.revoke(user_id, scope).await?;
                }
                let mut conn = self.pool.acquire().await?;
                removed + store::delete_scope_subtree(&mut conn, scope).await?
            }
        };

        tracing::info!(scope = %scope, removed, "scope cleared");
        Ok(removed)
    }

    /// Seed a freshly created child resource: every holder at `parent` gets
    /// their parent role at `child`, and `creator` becomes its creator.
    pub async fn inherit_members(&self, parent: &Scope, child: &Scope, creator: Uuid) -> AppResult<AuthRecord> {
        ensure_beneath(parent, child)?;

        let record = match self.config.cascade_mode {
            CascadeMode::Transactional => {
                let mut tx = self.pool.begin().await?;
                let record = seed_child(&mut tx, parent, child, creator).await?;
                tx.commit().await?;
                record
            }
            CascadeMode::Concurrent => {
                let record = self.grant(creator, child, Role::Creator).await?;
                let members = {
                    let mut conn = self.pool.acquire().await?;
                    store::records_at_scope(&mut conn, parent, &Role::RECOGNIZED, None).await?.0
                };
                for member in members.iter().filter(|m| m.user_id != creator) {
                    self.grant(member.user_id, child, member.role).await?;
                }
                record
            }
        };

        tracing::info!(parent = %parent, child = %child, creator = %creator, "members inherited");
        Ok(record)
    }

    // Resource lifecycle runs these on the caller's transaction so the
    // resource row and its records commit or roll back together. They are
    // sequential whatever the cascade mode.

    /// [`grant`](Self::grant) on the caller's connection.
    pub async fn grant_in(&self, conn: &mut SqliteConnection, user_id: Uuid, scope: &Scope, role: Role) -> AppResult<AuthRecord> {
        let record = grant_tree(conn, user_id, scope, role).await?;
        tracing::info!(user_id = %user_id, scope = %scope, role = %role, "role granted");
        Ok(record)
    }

    /// [`revoke_scope`](Self::revoke_scope) on the caller's connection.
    pub async fn revoke_scope_in(&self, conn: &mut SqliteConnection, scope: &Scope) -> AppResult<u64> {
        let removed = clear_scope(conn, scope).await?;
        tracing::info!(scope = %scope, removed, "scope cleared");
        Ok(removed)
    }

    /// [`inherit_members`](Self::inherit_members) on the caller's connection.
    pub async fn inherit_members_in(
        &self,
        conn: &mut SqliteConnection,
        parent: &Scope,
        child: &Scope,
        creator: Uuid,
    ) -> AppResult<AuthRecord> {
        ensure_beneath(parent, child)?;
        let record = seed_child(conn, parent, child, creator).await?;
        tracing::info!(parent = %parent, child = %child, creator = %creator, "members inherited");
        Ok(record)
    }
}
