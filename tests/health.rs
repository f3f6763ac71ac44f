mod common;

use anyhow::Result;
use axum::http::StatusCode;

use kb_access::config::CascadeMode;

#[tokio::test]
async fn health_endpoint_reports_db_ok() -> Result<()> {
    let t = common::setup().await?;

    let (status, body) = t.send("GET", "/api/health", None, None).await?;
    assert_eq!(status, StatusCode::OK, "health endpoint did not return 200");
    assert_eq!(body["db_ok"], true, "expected db_ok: true, got: {body}");
    assert_eq!(body["cascade_mode"], "transactional");

    Ok(())
}

#[tokio::test]
async fn health_endpoint_reports_configured_cascade_mode() -> Result<()> {
    let t = common::setup_with_mode(CascadeMode::Concurrent).await?;

    let (status, body) = t.send("GET", "/api/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cascade_mode"], "concurrent");

    Ok(())
}
