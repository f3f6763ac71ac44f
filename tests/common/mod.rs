#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use kb_access::config::{CascadeMode, ServiceConfig};
use kb_access::create_app_with;

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    // keeps the database file alive for the test's duration
    _dir: TempDir,
}

pub async fn setup() -> Result<TestApp> {
    setup_with(ServiceConfig::default()).await
}

pub async fn setup_with_mode(mode: CascadeMode) -> Result<TestApp> {
    let mut config = ServiceConfig::default();
    config.engine = config.engine.with_mode(mode);
    setup_with(config).await
}

pub async fn setup_with(config: ServiceConfig) -> Result<TestApp> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true)
        .foreign_keys(true);
    // One connection: request handlers and the activity listener take turns.
    let pool = SqlitePoolOptions::new().max_connections(1).connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    let app = create_app_with(pool.clone(), config).await?;

    Ok(TestApp { app, pool, _dir: dir })
}

impl TestApp {
    pub async fn send(&self, method: &str, uri: &str, user: Option<Uuid>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user.to_string());
        }
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let resp = self.app.clone().oneshot(req).await?;
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };

        Ok((status, value))
    }

    pub async fn register(&self, name: &str) -> Result<Uuid> {
        let (status, body) = self.send("POST", "/users", None, Some(json!({ "name": name }))).await?;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        id_of(&body)
    }

    pub async fn create_organization(&self, user: Uuid, name: &str) -> Result<Uuid> {
        let (status, body) = self
            .send("POST", "/organizations", Some(user), Some(json!({ "name": name })))
            .await?;
        assert_eq!(status, StatusCode::CREATED, "organization create failed: {body}");
        id_of(&body)
    }

    /// Returns (wiki id, home document id).
    pub async fn create_wiki(&self, user: Uuid, organization_id: Uuid, name: &str) -> Result<(Uuid, Uuid)> {
        let (status, body) = self
            .send(
                "POST",
                &format!("/organizations/{organization_id}/wikis"),
                Some(user),
                Some(json!({ "name": name })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "wiki create failed: {body}");
        let home = body
            .get("home_document_id")
            .and_then(Value::as_str)
            .context("missing home_document_id")?;
        Ok((id_of(&body)?, Uuid::parse_str(home)?))
    }

    pub async fn create_document(&self, user: Uuid, wiki_id: Uuid, title: &str, parent: Option<Uuid>) -> Result<Uuid> {
        let (status, body) = self
            .send(
                "POST",
                &format!("/wikis/{wiki_id}/documents"),
                Some(user),
                Some(json!({ "title": title, "parent_document_id": parent })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "document create failed: {body}");
        id_of(&body)
    }

    /// Role stored for (user, scope), read straight from the table.
    pub async fn role_at(&self, user: Uuid, org: Uuid, wiki: Option<Uuid>, doc: Option<Uuid>) -> Result<Option<String>> {
        let key = format!(
            "{}/{}/{}",
            org,
            wiki.map(|id| id.to_string()).unwrap_or_default(),
            doc.map(|id| id.to_string()).unwrap_or_default()
        );
        let role = sqlx::query_scalar("SELECT role FROM authorizations WHERE user_id = ? AND scope_key = ?")
            .bind(user.to_string())
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }
}

pub fn id_of(body: &Value) -> Result<Uuid> {
    let id = body.get("id").and_then(Value::as_str).context("missing id")?;
    Ok(Uuid::parse_str(id)?)
}
