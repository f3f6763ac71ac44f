//! Authorization store: keyed persistence of authorization records.
//!
//! Every function takes a `&mut SqliteConnection` so the same statements run
//! against a pooled connection or inside a transaction. No policy lives here.

use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::db::row_parsers;
use crate::errors::{AppError, AppResult};
use crate::models::authorization::{AuthRecord, Pagination, Role, Scope, ScopeLevel};
use crate::utils::{placeholders, utc_now};

const RECORD_COLUMNS: &str = "id, user_id, organization_id, wiki_id, document_id, role, created_at, updated_at";

/// Exact-scope lookup. No traversal up or down the tree.
pub async fn find_record(conn: &mut SqliteConnection, user_id: Uuid, scope: &Scope) -> AppResult<Option<AuthRecord>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM authorizations WHERE user_id = ? AND scope_key = ?");

    let row = sqlx::query(&sql)
        .bind(user_id.to_string())
        .bind(scope.key())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_parsers::auth_record_from_row).transpose()
}

/// Insert the record, or change its role in place. Writing the role a record
/// already has leaves the row untouched, `updated_at` included.
pub async fn upsert_record(conn: &mut SqliteConnection, user_id: Uuid, scope: &Scope, role: Role) -> AppResult<AuthRecord> {
    let now = utc_now();

    sqlx::query(
        r#"
        INSERT INTO authorizations (id, user_id, organization_id, wiki_id, document_id, scope_key, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (user_id, scope_key) DO UPDATE
            SET role = excluded.role, updated_at = excluded.updated_at
            WHERE authorizations.role <> excluded.role
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(scope.organization_id().to_string())
    .bind(scope.wiki_id().map(|id| id.to_string()))
    .bind(scope.document_id().map(|id| id.to_string()))
    .bind(scope.key())
    .bind(role.as_str())
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    find_record(conn, user_id, scope)
        .await?
        .ok_or_else(|| AppError::internal(format!("authorization for {user_id} at {scope} missing after upsert")))
}

/// Remove the user's record at exactly `scope`. Returns rows removed (0 or 1).
pub async fn delete_record(conn: &mut SqliteConnection, user_id: Uuid, scope: &Scope) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM authorizations WHERE user_id = ? AND scope_key = ?")
        .bind(user_id.to_string())
        .bind(scope.key())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

/// Remove every record the user holds strictly beneath `scope`, whether or not
/// the resource row it points at still exists.
pub async fn delete_user_records_below(conn: &mut SqliteConnection, user_id: Uuid, scope: &Scope) -> AppResult<u64> {
    let result = match (scope.level(), scope.wiki_id()) {
        (ScopeLevel::Organization, _) => {
            sqlx::query("DELETE FROM authorizations WHERE user_id = ? AND organization_id = ? AND wiki_id IS NOT NULL")
                .bind(user_id.to_string())
                .bind(scope.organization_id().to_string())
                .execute(&mut *conn)
                .await?
        }
        (ScopeLevel::Wiki, Some(wiki_id)) => {
            sqlx::query(
                "DELETE FROM authorizations WHERE user_id = ? AND organization_id = ? AND wiki_id = ? AND document_id IS NOT NULL",
            )
            .bind(user_id.to_string())
            .bind(scope.organization_id().to_string())
            .bind(wiki_id.to_string())
            .execute(&mut *conn)
            .await?
        }
        _ => return Ok(0),
    };

    Ok(result.rows_affected())
}

/// Remove every record at exactly `scope` and return whose they were.
pub async fn take_scope_holders(conn: &mut SqliteConnection, scope: &Scope) -> AppResult<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar("DELETE FROM authorizations WHERE scope_key = ? RETURNING user_id")
        .bind(scope.key())
        .fetch_all(&mut *conn)
        .await?;

    ids.iter()
        .map(|id| Uuid::parse_str(id).map_err(|e| AppError::internal(format!("invalid uuid in user_id: {}", e))))
        .collect()
}

/// Remove every user's records at and beneath `scope`, deepest level first.
pub async fn delete_scope_subtree(conn: &mut SqliteConnection, scope: &Scope) -> AppResult<u64> {
    let org = scope.organization_id().to_string();
    let mut removed = 0;

    match (scope.level(), scope.wiki_id()) {
        (ScopeLevel::Organization, _) => {
            removed += sqlx::query("DELETE FROM authorizations WHERE organization_id = ? AND document_id IS NOT NULL")
                .bind(&org)
                .execute(&mut *conn)
                .await?
                .rows_affected();
            removed += sqlx::query(
                "DELETE FROM authorizations WHERE organization_id = ? AND wiki_id IS NOT NULL AND document_id IS NULL",
            )
            .bind(&org)
            .execute(&mut *conn)
            .await?
            .rows_affected();
        }
        (ScopeLevel::Wiki, Some(wiki_id)) => {
            removed += sqlx::query(
                "DELETE FROM authorizations WHERE organization_id = ? AND wiki_id = ? AND document_id IS NOT NULL",
            )
            .bind(&org)
            .bind(wiki_id.to_string())
            .execute(&mut *conn)
            .await?
            .rows_affected();
        }
        _ => {}
    }

    removed += sqlx::query("DELETE FROM authorizations WHERE scope_key = ?")
        .bind(scope.key())
        .execute(&mut *conn)
        .await?
        .rows_affected();

    Ok(removed)
}

/// Records at exactly `scope` whose role is in `roles`, oldest first, with the
/// unpaginated total.
pub async fn records_at_scope(
    conn: &mut SqliteConnection,
    scope: &Scope,
    roles: &[Role],
    pagination: Option<Pagination>,
) -> AppResult<(Vec<AuthRecord>, i64)> {
    let role_list = placeholders(roles.len());

    let count_sql = format!("SELECT COUNT(*) FROM authorizations WHERE scope_key = ? AND role IN ({role_list})");
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(scope.key());
    for role in roles {
        count_query = count_query.bind(role.as_str());
    }
    let total = count_query.fetch_one(&mut *conn).await?;

    let mut sql = format!(
        "SELECT {RECORD_COLUMNS} FROM authorizations WHERE scope_key = ? AND role IN ({role_list}) ORDER BY created_at ASC, user_id ASC"
    );
    if pagination.is_some() {
        sql.push_str(" LIMIT ? OFFSET ?");
    }

    let mut query = sqlx::query(&sql).bind(scope.key());
    for role in roles {
        query = query.bind(role.as_str());
    }
    if let Some(page) = pagination {
        query = query.bind(page.limit()).bind(page.offset());
    }

    let rows = query.fetch_all(&mut *conn).await?;
    let records = rows
        .iter()
        .map(row_parsers::auth_record_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok((records, total))
}

/// Every user holding any record at exactly `scope`.
pub async fn users_at_scope(conn: &mut SqliteConnection, scope: &Scope) -> AppResult<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar("SELECT user_id FROM authorizations WHERE scope_key = ? ORDER BY created_at ASC")
        .bind(scope.key())
        .fetch_all(&mut *conn)
        .await?;

    ids.iter()
        .map(|id| Uuid::parse_str(id).map_err(|e| AppError::internal(format!("invalid uuid in user_id: {}", e))))
        .collect()
}

/// A user's records within one organization at the given level, filtered by role.
pub async fn user_records_at_level(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    organization_id: Uuid,
    level: ScopeLevel,
    wiki_id: Option<Uuid>,
    roles: &[Role],
) -> AppResult<Vec<AuthRecord>> {
    let level_clause = match level {
        ScopeLevel::Organization => "wiki_id IS NULL AND document_id IS NULL",
        ScopeLevel::Wiki => "wiki_id IS NOT NULL AND document_id IS NULL",
        ScopeLevel::Document => "document_id IS NOT NULL",
    };
    let wiki_clause = if wiki_id.is_some() { " AND wiki_id = ?" } else { "" };

    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM authorizations WHERE user_id = ? AND organization_id = ? AND {level_clause}{wiki_clause} AND role IN ({}) ORDER BY created_at ASC",
        placeholders(roles.len())
    );

    let mut query = sqlx::query(&sql)
        .bind(user_id.to_string())
        .bind(organization_id.to_string());
    if let Some(wiki_id) = wiki_id {
        query = query.bind(wiki_id.to_string());
    }
    for role in roles {
        query = query.bind(role.as_str());
    }

    let rows = query.fetch_all(&mut *conn).await?;
    rows.iter().map(row_parsers::auth_record_from_row).collect()
}

/// Organizations where the user holds an organization-scope record with one of `roles`.
pub async fn user_organization_ids(conn: &mut SqliteConnection, user_id: Uuid, roles: &[Role]) -> AppResult<Vec<Uuid>> {
    let sql = format!(
        "SELECT organization_id FROM authorizations WHERE user_id = ? AND wiki_id IS NULL AND document_id IS NULL AND role IN ({}) ORDER BY created_at ASC",
        placeholders(roles.len())
    );

    let mut query = sqlx::query_scalar::<_, String>(&sql).bind(user_id.to_string());
    for role in roles {
        query = query.bind(role.as_str());
    }

    let ids = query.fetch_all(&mut *conn).await?;
    ids.iter()
        .map(|id| Uuid::parse_str(id).map_err(|e| AppError::internal(format!("invalid uuid in organization_id: {}", e))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn upsert_is_idempotent() -> anyhow::Result<()> {
        let pool = db::memory_pool().await?;
        let mut conn = pool.acquire().await?;
        let user = Uuid::new_v4();
        let scope = Scope::organization(Uuid::new_v4());

        let first = upsert_record(&mut conn, user, &scope, Role::Member).await?;
        let second = upsert_record(&mut conn, user, &scope, Role::Member).await?;

        assert_eq!(first, second);
        let (records, total) = records_at_scope(&mut conn, &scope, &Role::RECOGNIZED, None).await?;
        assert_eq!(total, 1);
        assert_eq!(records[0].role, Role::Member);
        Ok(())
    }

    #[tokio::test]
    async fn upsert_changes_role_in_place() -> anyhow::Result<()> {
        let pool = db::memory_pool().await?;
        let mut conn = pool.acquire().await?;
        let user = Uuid::new_v4();
        let scope = Scope::wiki(Uuid::new_v4(), Uuid::new_v4());

        let first = upsert_record(&mut conn, user, &scope, Role::Member).await?;
        let second = upsert_record(&mut conn, user, &scope, Role::Admin).await?;

        assert_eq!(first.id, second.id);
        assert_eq!(second.role, Role::Admin);
        assert!(second.updated_at >= first.updated_at);
        Ok(())
    }

    #[tokio::test]
    async fn absence_is_none_not_error() -> anyhow::Result<()> {
        let pool = db::memory_pool().await?;
        let mut conn = pool.acquire().await?;

        let found = find_record(&mut conn, Uuid::new_v4(), &Scope::organization(Uuid::new_v4())).await?;
        assert!(found.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn organization_and_wiki_scopes_do_not_collide() -> anyhow::Result<()> {
        let pool = db::memory_pool().await?;
        let mut conn = pool.acquire().await?;
        let user = Uuid::new_v4();
        let org = Uuid::new_v4();
        let wiki = Uuid::new_v4();

        upsert_record(&mut conn, user, &Scope::organization(org), Role::Admin).await?;
        upsert_record(&mut conn, user, &Scope::wiki(org, wiki), Role::Member).await?;

        let org_record = find_record(&mut conn, user, &Scope::organization(org)).await?.unwrap();
        let wiki_record = find_record(&mut conn, user, &Scope::wiki(org, wiki)).await?.unwrap();
        assert_eq!(org_record.role, Role::Admin);
        assert_eq!(wiki_record.role, Role::Member);
        assert_eq!(wiki_record.scope(), Scope::wiki(org, wiki));
        Ok(())
    }

    #[tokio::test]
    async fn user_sweep_leaves_other_users_alone() -> anyhow::Result<()> {
        let pool = db::memory_pool().await?;
        let mut conn = pool.acquire().await?;
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let org = Uuid::new_v4();
        let wiki = Scope::wiki(org, Uuid::new_v4());

        for user in [alice, bob] {
            upsert_record(&mut conn, user, &Scope::organization(org), Role::Member).await?;
            upsert_record(&mut conn, user, &wiki, Role::Member).await?;
        }

        let removed = delete_user_records_below(&mut conn, alice, &Scope::organization(org)).await?;
        assert_eq!(removed, 1);
        assert!(find_record(&mut conn, alice, &Scope::organization(org)).await?.is_some());
        assert!(find_record(&mut conn, alice, &wiki).await?.is_none());
        assert!(find_record(&mut conn, bob, &wiki).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn taking_holders_empties_only_that_scope() -> anyhow::Result<()> {
        let pool = db::memory_pool().await?;
        let mut conn = pool.acquire().await?;
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let org = Scope::organization(Uuid::new_v4());
        let wiki = Scope::wiki(org.organization_id(), Uuid::new_v4());

        for user in [alice, bob] {
            upsert_record(&mut conn, user, &org, Role::Member).await?;
        }
        upsert_record(&mut conn, alice, &wiki, Role::Member).await?;

        let mut holders = take_scope_holders(&mut conn, &org).await?;
        holders.sort();
        let mut expected = vec![alice, bob];
        expected.sort();

        assert_eq!(holders, expected);
        assert!(users_at_scope(&mut conn, &org).await?.is_empty());
        assert!(find_record(&mut conn, alice, &wiki).await?.is_some());
        Ok(())
    }
}
