use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::util::ServiceExt; // for `oneshot`

use kb_access::docs::{build_openapi, swagger_routes};

#[test]
fn openapi_documents_authorization_records() -> Result<()> {
    let doc = build_openapi(8000)?;
    let v = serde_json::to_value(&doc)?;

    let props = v
        .pointer("/components/schemas/AuthRecord/properties")
        .and_then(Value::as_object)
        .expect("components.schemas.AuthRecord.properties must exist");

    for key in ["user_id", "organization_id", "wiki_id", "document_id", "role"] {
        assert!(props.contains_key(key), "OpenAPI AuthRecord schema missing '{key}'");
    }

    let roles = v
        .pointer("/components/schemas/Role/enum")
        .and_then(Value::as_array)
        .expect("Role must be an enum");
    assert!(roles.iter().any(|r| r == "noAccess"));

    Ok(())
}

#[tokio::test]
async fn openapi_json_is_served() -> Result<()> {
    let app = swagger_routes(build_openapi(8000)?)?;

    let req = Request::builder()
        .method("GET")
        .uri("/api-docs/openapi.json")
        .body(Body::empty())?;
    let resp = app.oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let v: Value = serde_json::from_slice(&bytes)?;
    assert!(v.pointer("/paths/~1wikis~1{id}~1members").is_some(), "wiki member path missing");
    assert_eq!(v.pointer("/components/securitySchemes/userIdHeader/name"), Some(&Value::from("x-user-id")));

    Ok(())
}
