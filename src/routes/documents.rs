use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::reasons;
use crate::db::row_parsers;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::identity::AuthUser;
use crate::models::authorization::Scope;
use crate::models::document::{Document, DocumentUpdateRequest};
use crate::utils::{placeholders, utc_now};

const DOCUMENT_COLUMNS: &str =
    "id, organization_id, wiki_id, parent_document_id, title, create_user_id, is_wiki_home, created_at, updated_at";

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/documents/:id",
        get(get_document).patch(update_document).delete(delete_document),
    )
}

pub(crate) struct NewDocument<'a> {
    pub organization_id: Uuid,
    pub wiki_id: Uuid,
    pub parent_document_id: Option<Uuid>,
    pub title: &'a str,
    pub create_user_id: Uuid,
    pub is_wiki_home: bool,
}

pub(crate) async fn insert_document(conn: &mut SqliteConnection, new: NewDocument<'_>) -> AppResult<Document> {
    let now = utc_now();
    let document = Document {
        id: Uuid::new_v4(),
        organization_id: new.organization_id,
        wiki_id: new.wiki_id,
        parent_document_id: new.parent_document_id,
        title: new.title.to_string(),
        create_user_id: new.create_user_id,
        is_wiki_home: new.is_wiki_home,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO documents (id, organization_id, wiki_id, parent_document_id, title, create_user_id, is_wiki_home, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(document.id.to_string())
    .bind(document.organization_id.to_string())
    .bind(document.wiki_id.to_string())
    .bind(document.parent_document_id.map(|id| id.to_string()))
    .bind(&document.title)
    .bind(document.create_user_id.to_string())
    .bind(document.is_wiki_home)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(document)
}

pub(crate) async fn fetch_document(pool: &SqlitePool, id: Uuid) -> AppResult<Document> {
    let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("document {id} not found")))?;

    row_parsers::document_from_row(&row)
}

pub(crate) async fn fetch_documents(pool: &SqlitePool, ids: &[Uuid]) -> AppResult<Vec<Document>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id IN ({}) ORDER BY created_at ASC",
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id.to_string());
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(row_parsers::document_from_row).collect()
}

pub(crate) fn document_scope(document: &Document) -> Scope {
    Scope::document(document.organization_id, document.wiki_id, document.id)
}

#[utoipa::path(
    get,
    path = "/documents/{id}",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document detail", body = Document),
        (status = 403, description = "No visible role at this document"),
    )
)]
pub async fn get_document(State(state): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>) -> AppResult<Json<Document>> {
    let document = fetch_document(&state.pool, id).await?;
    state.engine.can_view(auth.user_id, &document_scope(&document)).await?;
    Ok(Json(document))
}

/// Retitle a document. Creator or admin at the document.
#[utoipa::path(
    patch,
    path = "/documents/{id}",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    request_body = DocumentUpdateRequest,
    responses(
        (status = 200, description = "Document updated", body = Document),
        (status = 403, description = "Caller may not edit this document"),
    )
)]
pub async fn update_document(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<DocumentUpdateRequest>,
) -> AppResult<Json<Document>> {
    let previous = fetch_document(&state.pool, id).await?;
    state.engine.can_edit(auth.user_id, &document_scope(&previous)).await?;

    let mut document = previous.clone();
    if let Some(title) = payload.title.as_deref().map(str::trim).filter(|title| !title.is_empty()) {
        document.title = title.to_string();
    }
    document.updated_at = utc_now();

    sqlx::query("UPDATE documents SET title = ?, updated_at = ? WHERE id = ?")
        .bind(&document.title)
        .bind(document.updated_at)
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &document,
        Some(&previous),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(document))
}

/// Delete a document. Its children move up to its parent. A wiki's home
/// document is only removed together with the wiki.
#[utoipa::path(
    delete,
    path = "/documents/{id}",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 204, description = "Document deleted"),
        (status = 403, description = "Caller is not the creator, or this is the wiki's home document"),
    )
)]
pub async fn delete_document(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let document = fetch_document(&state.pool, id).await?;
    let scope = document_scope(&document);
    state.engine.can_delete(auth.user_id, &scope).await?;

    if document.is_wiki_home {
        return Err(AppError::forbidden(reasons::HOME_DOCUMENT_PROTECTED));
    }

    let mut tx = state.pool.begin().await?;
    state.engine.revoke_scope_in(&mut tx, &scope).await?;
    sqlx::query("UPDATE documents SET parent_document_id = ?, updated_at = ? WHERE parent_document_id = ?")
        .bind(document.parent_document_id.map(|id| id.to_string()))
        .bind(utc_now())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &document,
        Some(&document),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}
