//! Resource tree lookups. Child discovery reads the resource tables, never
//! other users' authorization records, so a wiki nobody has been granted on
//! is still reached by an organization-level cascade.

use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::authorization::{Scope, ScopeLevel};

fn parse_ids(ids: Vec<String>, column: &str) -> AppResult<Vec<Uuid>> {
    ids.iter()
        .map(|id| Uuid::parse_str(id).map_err(|e| AppError::internal(format!("invalid uuid in {}: {}", column, e))))
        .collect()
}

pub async fn wiki_ids(conn: &mut SqliteConnection, organization_id: Uuid) -> AppResult<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM wikis WHERE organization_id = ? ORDER BY created_at ASC")
        .bind(organization_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

    parse_ids(ids, "wikis.id")
}

pub async fn document_ids(conn: &mut SqliteConnection, organization_id: Uuid, wiki_id: Uuid) -> AppResult<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM documents WHERE organization_id = ? AND wiki_id = ? ORDER BY created_at ASC",
    )
    .bind(organization_id.to_string())
    .bind(wiki_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    parse_ids(ids, "documents.id")
}

/// Every scope strictly beneath `scope`, each wiki listed before its documents.
pub async fn descendants(conn: &mut SqliteConnection, scope: &Scope) -> AppResult<Vec<Scope>> {
    let org = scope.organization_id();
    let mut scopes = Vec::new();

    match (scope.level(), scope.wiki_id()) {
        (ScopeLevel::Organization, _) => {
            for wiki in wiki_ids(conn, org).await? {
                scopes.push(Scope::wiki(org, wiki));
                for document in document_ids(conn, org, wiki).await? {
                    scopes.push(Scope::document(org, wiki, document));
                }
            }
        }
        (ScopeLevel::Wiki, Some(wiki)) => {
            for document in document_ids(conn, org, wiki).await? {
                scopes.push(Scope::document(org, wiki, document));
            }
        }
        _ => {}
    }

    Ok(scopes)
}
