use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::AccessEngine;
use crate::config::ServiceConfig;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::routes::{documents, health, members, organizations, users, wikis};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub engine: Arc<AccessEngine>,
    pub event_bus: EventBus,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: ServiceConfig, event_bus: EventBus) -> Self {
        let engine = AccessEngine::new(pool.clone(), config.engine.clone());
        Self {
            pool,
            engine: Arc::new(engine),
            event_bus,
            config: Arc::new(config),
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let config = ServiceConfig::from_env()?;
    create_app_with(pool, config).await
}

pub async fn create_app_with(pool: SqlitePool, config: ServiceConfig) -> Result<Router, AppError> {
    let (event_bus, rx) = init_event_bus();
    tokio::spawn(start_activity_listener(rx, pool.clone()));

    tracing::info!(
        cascade_mode = config.engine.cascade_mode.as_str(),
        cascade_concurrency = config.engine.cascade_concurrency,
        "authorization engine configured"
    );

    let state = AppState::new(pool, config, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/api/health", get(health::health))
        .merge(users::routes())
        .merge(organizations::routes())
        .merge(wikis::routes())
        .merge(documents::routes())
        .merge(members::routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
