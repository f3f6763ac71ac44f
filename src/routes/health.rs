use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: &'static str,
    pub db_ok: bool,
    pub db_error: Option<String>,
    #[schema(example = "transactional")]
    pub cascade_mode: &'static str,
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, description = "Service and database status", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_error = sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .err()
        .map(|e| e.to_string());

    Json(HealthResponse {
        status: if db_error.is_none() { "ok" } else { "degraded" },
        db_ok: db_error.is_none(),
        db_error,
        cascade_mode: state.engine.config().cascade_mode.as_str(),
    })
}
