use axum::extract::{Path, State};
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
use crate::models::authorization::{Role, Scope, ViewableScopes};
use crate::models::organization::{Organization, OrganizationCreateRequest, OrganizationUpdateRequest};
use crate::utils::{placeholders, utc_now};

const ORGANIZATION_COLUMNS: &str = "id, name, description, create_user_id, is_personal, created_at, updated_at";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/organizations", get(list_organizations).post(create_organization))
        .route(
            "/organizations/:id",
            get(get_organization).patch(update_organization).delete(delete_organization),
        )
        .route("/organizations/:id/viewable", get(viewable_scopes))
}

pub(crate) async fn fetch_organization(pool: &SqlitePool, id: Uuid) -> AppResult<Organization> {
    let sql = format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("organization {id} not found")))?;

    row_parsers::organization_from_row(&row)
}

#[utoipa::path(
    post,
    path = "/organizations",
    tag = "Organizations",
    request_body = OrganizationCreateRequest,
    responses(
        (status = 201, description = "Organization created; caller becomes its creator", body = Organization),
        (status = 409, description = "Organization limit reached"),
    )
)]
pub async fn create_organization(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<OrganizationCreateRequest>,
) -> AppResult<(StatusCode, Json<Organization>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let owned: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM organizations WHERE create_user_id = ?")
        .bind(auth.user_id.to_string())
        .fetch_one(&state.pool)
        .await?;
    if owned >= state.config.max_organizations_per_user {
        return Err(AppError::conflict(format!(
            "a user may create at most {} organizations",
            state.config.max_organizations_per_user
        )));
    }

    let id = Uuid::new_v4();
    let now = utc_now();

    let mut tx = state.pool.begin().await?;
    sqlx::query(
        "INSERT INTO organizations (id, name, description, create_user_id, is_personal, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(name)
    .bind(&payload.description)
    .bind(auth.user_id.to_string())
    .bind(payload.is_personal)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    let record = state
        .engine
        .grant_in(&mut tx, auth.user_id, &Scope::organization(id), Role::Creator)
        .await?;
    tx.commit().await?;

    let organization = fetch_organization(&state.pool, id).await?;

    let context = RequestContext::from_headers(&headers);
    log_activity_with_context(&state.event_bus, "created", Some(auth.user_id), &organization, None, Some(context.clone()));
    log_activity_with_context(&state.event_bus, "granted", Some(auth.user_id), &record, None, Some(context));

    Ok((StatusCode::CREATED, Json(organization)))
}

/// Organizations the caller holds an active role in.
#[utoipa::path(
    get,
    path = "/organizations",
    tag = "Organizations",
    responses((status = 200, description = "Visible organizations", body = Vec<Organization>))
)]
pub async fn list_organizations(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Organization>>> {
    let ids = state.engine.list_viewable_organizations(auth.user_id).await?;
    if ids.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let sql = format!(
        "SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id IN ({}) ORDER BY created_at ASC",
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in &ids {
        query = query.bind(id.to_string());
    }

    let rows = query.fetch_all(&state.pool).await?;
    let organizations = rows
        .iter()
        .map(row_parsers::organization_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(organizations))
}

#[utoipa::path(
    get,
    path = "/organizations/{id}",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Organization detail", body = Organization),
        (status = 403, description = "No visible role at this organization"),
    )
)]
pub async fn get_organization(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Organization>> {
    let organization = fetch_organization(&state.pool, id).await?;
    state.engine.can_view(auth.user_id, &Scope::organization(id)).await?;
    Ok(Json(organization))
}

/// Wikis and documents inside the organization the caller can open.
#[utoipa::path(
    get,
    path = "/organizations/{id}/viewable",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Ids of the caller's viewable wikis and documents", body = ViewableScopes),
        (status = 403, description = "No visible role at this organization"),
    )
)]
pub async fn viewable_scopes(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ViewableScopes>> {
    fetch_organization(&state.pool, id).await?;
    state.engine.can_view(auth.user_id, &Scope::organization(id)).await?;
    Ok(Json(state.engine.list_viewable_scopes(auth.user_id, id).await?))
}

/// Rename or re-describe an organization. Creator or admin.
#[utoipa::path(
    patch,
    path = "/organizations/{id}",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    request_body = OrganizationUpdateRequest,
    responses(
        (status = 200, description = "Organization updated", body = Organization),
        (status = 403, description = "Caller may not edit this organization"),
    )
)]
pub async fn update_organization(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<OrganizationUpdateRequest>,
) -> AppResult<Json<Organization>> {
    let previous = fetch_organization(&state.pool, id).await?;
    state.engine.can_edit(auth.user_id, &Scope::organization(id)).await?;

    let mut organization = previous.clone();
    if let Some(name) = payload.name.as_deref().map(str::trim) {
        if name.is_empty() {
            return Err(AppError::bad_request("name must not be empty"));
        }
        organization.name = name.to_string();
    }
    if payload.description.is_some() {
        organization.description = payload.description;
    }
    organization.updated_at = utc_now();

    sqlx::query("UPDATE organizations SET name = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(&organization.name)
        .bind(&organization.description)
        .bind(organization.updated_at)
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &organization,
        Some(&previous),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(organization))
}

/// Delete an organization with all its wikis and documents. Creator only.
#[utoipa::path(
    delete,
    path = "/organizations/{id}",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    responses(
        (status = 204, description = "Organization deleted"),
        (status = 403, description = "Caller is not the creator"),
    )
)]
pub async fn delete_organization(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let organization = fetch_organization(&state.pool, id).await?;
    let scope = Scope::organization(id);
    state.engine.can_delete(auth.user_id, &scope).await?;

    let mut tx = state.pool.begin().await?;
    state.engine.revoke_scope_in(&mut tx, &scope).await?;
    sqlx::query("DELETE FROM documents WHERE organization_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM wikis WHERE organization_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM organizations WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &organization,
        Some(&organization),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}
