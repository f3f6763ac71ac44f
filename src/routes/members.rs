//! Membership endpoints for organizations, wikis and documents.
//!
//! Every role change goes through the delegation guard and is published as a
//! critical `authorization.granted` / `authorization.revoked` event.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};
use axum::{Json, Router};
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppResult;
use crate::events::{log_activity_with_context, RequestContext};
use crate::identity::AuthUser;
use crate::models::authorization::{AuthRecord, MemberPage, MemberRemoveRequest, MemberRoleRequest, PaginationQuery, Scope};
use crate::routes::documents::{document_scope, fetch_document};
use crate::routes::organizations::fetch_organization;
use crate::routes::wikis::fetch_wiki;

// =============================================================================
// ROUTER
// =============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/organizations/:id/members",
            get(list_organization_members)
                .post(add_organization_member)
                .put(update_organization_member)
                .delete(remove_organization_member),
        )
        .route(
            "/wikis/:id/members",
            get(list_wiki_members)
                .post(add_wiki_member)
                .put(update_wiki_member)
                .delete(remove_wiki_member),
        )
        .route("/documents/:id/members", put(update_document_member))
}

// =============================================================================
// SHARED
// =============================================================================

async fn organization_scope(state: &AppState, id: Uuid) -> AppResult<Scope> {
    let organization = fetch_organization(&state.pool, id).await?;
    Ok(Scope::organization(organization.id))
}

async fn wiki_scope(state: &AppState, id: Uuid) -> AppResult<Scope> {
    let wiki = fetch_wiki(&state.pool, id).await?;
    Ok(Scope::wiki(wiki.organization_id, wiki.id))
}

async fn list_at(state: &AppState, auth: AuthUser, scope: Scope, query: PaginationQuery) -> AppResult<Json<MemberPage>> {
    state.engine.can_view(auth.user_id, &scope).await?;
    let page = state.engine.list_members(&scope, query.into_pagination()).await?;
    Ok(Json(page.into()))
}

async fn add_at(
    state: &AppState,
    auth: AuthUser,
    headers: &HeaderMap,
    scope: Scope,
    req: MemberRoleRequest,
) -> AppResult<(StatusCode, Json<AuthRecord>)> {
    let record = state.engine.add_member(auth.user_id, req.user_id, &scope, req.role).await?;

    log_activity_with_context(
        &state.event_bus,
        "granted",
        Some(auth.user_id),
        &record,
        None,
        Some(RequestContext::from_headers(headers)),
    );

    Ok((StatusCode::CREATED, Json(record)))
}

async fn set_at(
    state: &AppState,
    auth: AuthUser,
    headers: &HeaderMap,
    scope: Scope,
    req: MemberRoleRequest,
) -> AppResult<Json<AuthRecord>> {
    let previous = state.engine.get_record(req.user_id, &scope).await?;
    let record = state.engine.set_other_user_role(auth.user_id, req.user_id, &scope, req.role).await?;

    log_activity_with_context(
        &state.event_bus,
        "granted",
        Some(auth.user_id),
        &record,
        previous.as_ref(),
        Some(RequestContext::from_headers(headers)),
    );

    Ok(Json(record))
}

async fn remove_at(
    state: &AppState,
    auth: AuthUser,
    headers: &HeaderMap,
    scope: Scope,
    req: MemberRemoveRequest,
) -> AppResult<StatusCode> {
    let previous = state.engine.get_record(req.user_id, &scope).await?;
    state.engine.revoke_other_user_role(auth.user_id, req.user_id, &scope).await?;

    if let Some(previous) = previous {
        log_activity_with_context(
            &state.event_bus,
            "revoked",
            Some(auth.user_id),
            &previous,
            Some(&previous),
            Some(RequestContext::from_headers(headers)),
        );
    }

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// ORGANIZATION MEMBERS
// =============================================================================

#[utoipa::path(
    get,
    path = "/organizations/{id}/members",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Organization id"), PaginationQuery),
    responses((status = 200, description = "Organization members", body = MemberPage))
)]
pub async fn list_organization_members(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<PaginationQuery>,
) -> AppResult<Json<MemberPage>> {
    let scope = organization_scope(&state, id).await?;
    list_at(&state, auth, scope, query).await
}

#[utoipa::path(
    post,
    path = "/organizations/{id}/members",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Organization id")),
    request_body = MemberRoleRequest,
    responses(
        (status = 201, description = "Member added; the role cascades to every wiki and document", body = AuthRecord),
        (status = 403, description = "Delegation rules forbid this change"),
        (status = 404, description = "Target user not found"),
    )
)]
pub async fn add_organization_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<MemberRoleRequest>,
) -> AppResult<(StatusCode, Json<AuthRecord>)> {
    let scope = organization_scope(&state, id).await?;
    add_at(&state, auth, &headers, scope, req).await
}

#[utoipa::path(
    put,
    path = "/organizations/{id}/members",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Organization id")),
    request_body = MemberRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = AuthRecord),
        (status = 403, description = "Delegation rules forbid this change"),
    )
)]
pub async fn update_organization_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<MemberRoleRequest>,
) -> AppResult<Json<AuthRecord>> {
    let scope = organization_scope(&state, id).await?;
    set_at(&state, auth, &headers, scope, req).await
}

#[utoipa::path(
    delete,
    path = "/organizations/{id}/members",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Organization id")),
    request_body = MemberRemoveRequest,
    responses(
        (status = 204, description = "Member removed from the organization and everything in it"),
        (status = 403, description = "Delegation rules forbid this change"),
        (status = 404, description = "Target holds no role here"),
    )
)]
pub async fn remove_organization_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<MemberRemoveRequest>,
) -> AppResult<StatusCode> {
    let scope = organization_scope(&state, id).await?;
    remove_at(&state, auth, &headers, scope, req).await
}

// =============================================================================
// WIKI MEMBERS
// =============================================================================

#[utoipa::path(
    get,
    path = "/wikis/{id}/members",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Wiki id"), PaginationQuery),
    responses((status = 200, description = "Wiki members", body = MemberPage))
)]
pub async fn list_wiki_members(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<PaginationQuery>,
) -> AppResult<Json<MemberPage>> {
    let scope = wiki_scope(&state, id).await?;
    list_at(&state, auth, scope, query).await
}

#[utoipa::path(
    post,
    path = "/wikis/{id}/members",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Wiki id")),
    request_body = MemberRoleRequest,
    responses(
        (status = 201, description = "Member added to the wiki and its documents", body = AuthRecord),
        (status = 403, description = "Target is not an organization member, or delegation rules forbid it"),
    )
)]
pub async fn add_wiki_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<MemberRoleRequest>,
) -> AppResult<(StatusCode, Json<AuthRecord>)> {
    let scope = wiki_scope(&state, id).await?;
    add_at(&state, auth, &headers, scope, req).await
}

#[utoipa::path(
    put,
    path = "/wikis/{id}/members",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Wiki id")),
    request_body = MemberRoleRequest,
    responses((status = 200, description = "Role changed", body = AuthRecord))
)]
pub async fn update_wiki_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<MemberRoleRequest>,
) -> AppResult<Json<AuthRecord>> {
    let scope = wiki_scope(&state, id).await?;
    set_at(&state, auth, &headers, scope, req).await
}

#[utoipa::path(
    delete,
    path = "/wikis/{id}/members",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Wiki id")),
    request_body = MemberRemoveRequest,
    responses((status = 204, description = "Member removed from the wiki and its documents"))
)]
pub async fn remove_wiki_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<MemberRemoveRequest>,
) -> AppResult<StatusCode> {
    let scope = wiki_scope(&state, id).await?;
    remove_at(&state, auth, &headers, scope, req).await
}

// =============================================================================
// DOCUMENT MEMBERS
// =============================================================================

#[utoipa::path(
    put,
    path = "/documents/{id}/members",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Document id")),
    request_body = MemberRoleRequest,
    responses((status = 200, description = "Role changed at this document", body = AuthRecord))
)]
pub async fn update_document_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<MemberRoleRequest>,
) -> AppResult<Json<AuthRecord>> {
    let document = fetch_document(&state.pool, id).await?;
    set_at(&state, auth, &headers, document_scope(&document), req).await
}
