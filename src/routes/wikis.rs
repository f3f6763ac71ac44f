use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::db::row_parsers;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::identity::AuthUser;
use crate::models::authorization::Scope;
use crate::models::document::{Document, DocumentCreateRequest, UNTITLED_DOCUMENT};
use crate::models::wiki::{Wiki, WikiAccess, WikiCreateRequest, WikiListQuery, WikiUpdateRequest};
use crate::routes::documents::{fetch_document, fetch_documents, insert_document, NewDocument};
use crate::routes::organizations::fetch_organization;
use crate::utils::{placeholders, utc_now};

const WIKI_COLUMNS: &str = "id, organization_id, name, description, create_user_id, home_document_id, created_at, updated_at";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/organizations/:id/wikis", get(list_wikis).post(create_wiki))
        .route("/wikis/:id", get(get_wiki).patch(update_wiki).delete(delete_wiki))
        .route("/wikis/:id/documents", get(list_documents).post(create_document))
}

pub(crate) async fn fetch_wiki(pool: &SqlitePool, id: Uuid) -> AppResult<Wiki> {
    let sql = format!("SELECT {WIKI_COLUMNS} FROM wikis WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("wiki {id} not found")))?;

    row_parsers::wiki_from_row(&row)
}

async fn fetch_wikis(pool: &SqlitePool, ids: &[Uuid]) -> AppResult<Vec<Wiki>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!("SELECT {WIKI_COLUMNS} FROM wikis WHERE id IN ({})", placeholders(ids.len()));
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id.to_string());
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(row_parsers::wiki_from_row).collect()
}

/// Create a wiki and its home document. Organization members carry over
/// with their organization role; the caller becomes creator of both.
#[utoipa::path(
    post,
    path = "/organizations/{id}/wikis",
    tag = "Wikis",
    params(("id" = Uuid, Path, description = "Organization id")),
    request_body = WikiCreateRequest,
    responses(
        (status = 201, description = "Wiki created", body = Wiki),
        (status = 403, description = "No visible role at the organization"),
    )
)]
pub async fn create_wiki(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(organization_id): Path<Uuid>,
    Json(payload): Json<WikiCreateRequest>,
) -> AppResult<(StatusCode, Json<Wiki>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    fetch_organization(&state.pool, organization_id).await?;
    let org_scope = Scope::organization(organization_id);
    state.engine.can_view(auth.user_id, &org_scope).await?;

    let wiki_id = Uuid::new_v4();
    let now = utc_now();

    let mut tx = state.pool.begin().await?;
    sqlx::query(
        "INSERT INTO wikis (id, organization_id, name, description, create_user_id, home_document_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, NULL, ?, ?)",
    )
    .bind(wiki_id.to_string())
    .bind(organization_id.to_string())
    .bind(name)
    .bind(&payload.description)
    .bind(auth.user_id.to_string())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let wiki_scope = Scope::wiki(organization_id, wiki_id);
    let record = state
        .engine
        .inherit_members_in(&mut tx, &org_scope, &wiki_scope, auth.user_id)
        .await?;

    let home = insert_document(
        &mut tx,
        NewDocument {
            organization_id,
            wiki_id,
            parent_document_id: None,
            title: name,
            create_user_id: auth.user_id,
            is_wiki_home: true,
        },
    )
    .await?;
    let home_scope = Scope::document(organization_id, wiki_id, home.id);
    state
        .engine
        .inherit_members_in(&mut tx, &wiki_scope, &home_scope, auth.user_id)
        .await?;

    sqlx::query("UPDATE wikis SET home_document_id = ?, updated_at = ? WHERE id = ?")
        .bind(home.id.to_string())
        .bind(utc_now())
        .bind(wiki_id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    let wiki = fetch_wiki(&state.pool, wiki_id).await?;

    let context = RequestContext::from_headers(&headers);
    log_activity_with_context(&state.event_bus, "created", Some(auth.user_id), &wiki, None, Some(context.clone()));
    log_activity_with_context(&state.event_bus, "created", Some(auth.user_id), &home, None, Some(context.clone()));
    log_activity_with_context(&state.event_bus, "granted", Some(auth.user_id), &record, None, Some(context));

    Ok((StatusCode::CREATED, Json(wiki)))
}

/// The caller's wikis in an organization, with their role on each.
#[utoipa::path(
    get,
    path = "/organizations/{id}/wikis",
    tag = "Wikis",
    params(("id" = Uuid, Path, description = "Organization id"), WikiListQuery),
    responses((status = 200, description = "Wikis matching the filter", body = Vec<WikiAccess>))
)]
pub async fn list_wikis(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(organization_id): Path<Uuid>,
    Query(query): Query<WikiListQuery>,
) -> AppResult<Json<Vec<WikiAccess>>> {
    state.engine.can_view(auth.user_id, &Scope::organization(organization_id)).await?;

    let records = state
        .engine
        .list_user_wikis(auth.user_id, organization_id, query.filter.unwrap_or_default())
        .await?;
    let ids: Vec<Uuid> = records.iter().filter_map(|record| record.wiki_id).collect();
    let mut wikis = fetch_wikis(&state.pool, &ids).await?;

    // Records for deleted wikis have no row to show.
    let listing = records
        .iter()
        .filter_map(|record| {
            let position = wikis.iter().position(|wiki| Some(wiki.id) == record.wiki_id)?;
            Some(WikiAccess { wiki: wikis.swap_remove(position), role: record.role })
        })
        .collect();

    Ok(Json(listing))
}

#[utoipa::path(
    get,
    path = "/wikis/{id}",
    tag = "Wikis",
    params(("id" = Uuid, Path, description = "Wiki id")),
    responses(
        (status = 200, description = "Wiki detail", body = Wiki),
        (status = 403, description = "No visible role at this wiki"),
    )
)]
pub async fn get_wiki(State(state): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>) -> AppResult<Json<Wiki>> {
    let wiki = fetch_wiki(&state.pool, id).await?;
    state.engine.can_view(auth.user_id, &Scope::wiki(wiki.organization_id, wiki.id)).await?;
    Ok(Json(wiki))
}

/// Rename a wiki or change its description. Creator or admin at the wiki.
#[utoipa::path(
    patch,
    path = "/wikis/{id}",
    tag = "Wikis",
    params(("id" = Uuid, Path, description = "Wiki id")),
    request_body = WikiUpdateRequest,
    responses(
        (status = 200, description = "Wiki updated", body = Wiki),
        (status = 400, description = "Name is empty"),
        (status = 403, description = "Caller may not edit this wiki"),
    )
)]
pub async fn update_wiki(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<WikiUpdateRequest>,
) -> AppResult<Json<Wiki>> {
    let previous = fetch_wiki(&state.pool, id).await?;
    state
        .engine
        .can_edit(auth.user_id, &Scope::wiki(previous.organization_id, previous.id))
        .await?;

    let mut wiki = previous.clone();
    if let Some(name) = payload.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::bad_request("name must not be empty"));
        }
        wiki.name = name.to_string();
    }
    if let Some(description) = payload.description {
        wiki.description = Some(description);
    }
    wiki.updated_at = utc_now();

    sqlx::query("UPDATE wikis SET name = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(&wiki.name)
        .bind(&wiki.description)
        .bind(wiki.updated_at)
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &wiki,
        Some(&previous),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(wiki))
}

#[utoipa::path(
    delete,
    path = "/wikis/{id}",
    tag = "Wikis",
    params(("id" = Uuid, Path, description = "Wiki id")),
    responses(
        (status = 204, description = "Wiki and its documents deleted"),
        (status = 403, description = "Caller is not the wiki's creator"),
    )
)]
pub async fn delete_wiki(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let wiki = fetch_wiki(&state.pool, id).await?;
    let scope = Scope::wiki(wiki.organization_id, wiki.id);
    state.engine.can_delete(auth.user_id, &scope).await?;

    let mut tx = state.pool.begin().await?;
    state.engine.revoke_scope_in(&mut tx, &scope).await?;
    sqlx::query("DELETE FROM documents WHERE wiki_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM wikis WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &wiki,
        Some(&wiki),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Documents in the wiki the caller can see.
#[utoipa::path(
    get,
    path = "/wikis/{id}/documents",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Wiki id")),
    responses((status = 200, description = "Visible documents", body = Vec<Document>))
)]
pub async fn list_documents(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Document>>> {
    let wiki = fetch_wiki(&state.pool, id).await?;
    state.engine.can_view(auth.user_id, &Scope::wiki(wiki.organization_id, wiki.id)).await?;

    let records = state
        .engine
        .list_viewable_documents(auth.user_id, wiki.organization_id, wiki.id)
        .await?;
    let ids: Vec<Uuid> = records.iter().filter_map(|record| record.document_id).collect();

    Ok(Json(fetch_documents(&state.pool, &ids).await?))
}

/// Create a document in a wiki. Wiki members carry over with their wiki role.
#[utoipa::path(
    post,
    path = "/wikis/{id}/documents",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Wiki id")),
    request_body = DocumentCreateRequest,
    responses(
        (status = 201, description = "Document created", body = Document),
        (status = 400, description = "Parent document is not in this wiki"),
    )
)]
pub async fn create_document(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<DocumentCreateRequest>,
) -> AppResult<(StatusCode, Json<Document>)> {
    let wiki = fetch_wiki(&state.pool, id).await?;
    let wiki_scope = Scope::wiki(wiki.organization_id, wiki.id);
    state.engine.can_view(auth.user_id, &wiki_scope).await?;

    if let Some(parent_id) = payload.parent_document_id {
        let parent = fetch_document(&state.pool, parent_id).await?;
        if parent.wiki_id != wiki.id {
            return Err(AppError::bad_request("parent document belongs to another wiki"));
        }
    }

    let title = payload
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(UNTITLED_DOCUMENT);

    let mut tx = state.pool.begin().await?;
    let document = insert_document(
        &mut tx,
        NewDocument {
            organization_id: wiki.organization_id,
            wiki_id: wiki.id,
            parent_document_id: payload.parent_document_id,
            title,
            create_user_id: auth.user_id,
            is_wiki_home: false,
        },
    )
    .await?;

    let scope = Scope::document(wiki.organization_id, wiki.id, document.id);
    let record = state
        .engine
        .inherit_members_in(&mut tx, &wiki_scope, &scope, auth.user_id)
        .await?;
    tx.commit().await?;

    let context = RequestContext::from_headers(&headers);
    log_activity_with_context(&state.event_bus, "created", Some(auth.user_id), &document, None, Some(context.clone()));
    log_activity_with_context(&state.event_bus, "granted", Some(auth.user_id), &record, None, Some(context));

    Ok((StatusCode::CREATED, Json(document)))
}
