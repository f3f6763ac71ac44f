use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::db::row_parsers;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::identity::AuthUser;
use crate::models::user::{User, UserCreateRequest};
use crate::routes::conflict_on_unique;
use crate::utils::utc_now;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/me", get(me))
}

pub(crate) async fn fetch_user(pool: &SqlitePool, id: Uuid) -> AppResult<User> {
    let row = sqlx::query("SELECT id, name, email, created_at, updated_at FROM users WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user {id} not found")))?;

    row_parsers::user_from_row(&row)
}

/// Register an identity issued by the identity provider.
#[utoipa::path(
    post,
    path = "/users",
    tag = "Users",
    request_body = UserCreateRequest,
    responses(
        (status = 201, description = "User registered", body = User),
        (status = 409, description = "Name or id already registered"),
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UserCreateRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let id = payload.id.unwrap_or_else(Uuid::new_v4);
    let now = utc_now();

    sqlx::query("INSERT INTO users (id, name, email, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(name)
        .bind(&payload.email)
        .bind(now)
        .bind(now)
        .execute(&state.pool)
        .await
        .map_err(|err| conflict_on_unique(err, "user already registered"))?;

    let user = fetch_user(&state.pool, id).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(user.id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    get,
    path = "/users/me",
    tag = "Users",
    responses(
        (status = 200, description = "Calling user", body = User),
        (status = 401, description = "Identity header missing"),
    )
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<User>> {
    let user = fetch_user(&state.pool, auth.user_id).await?;
    Ok(Json(user))
}
