mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::setup;

#[tokio::test]
async fn organization_lifecycle_end_to_end() -> Result<()> {
    let t = setup().await?;
    let alice = t.register("alice").await?;
    let bob = t.register("bob").await?;
    let carol = t.register("carol").await?;

    // alice creates the organization and becomes its creator
    let org = t.create_organization(alice, "Acme").await?;
    assert_eq!(t.role_at(alice, org, None, None).await?.as_deref(), Some("creator"));

    // the new wiki and its home document inherit alice's creator role
    let (wiki, home) = t.create_wiki(alice, org, "Runbooks").await?;
    let doc = t.create_document(alice, wiki, "Paging", None).await?;
    assert_eq!(t.role_at(alice, org, Some(wiki), None).await?.as_deref(), Some("creator"));
    assert_eq!(t.role_at(alice, org, Some(wiki), Some(home)).await?.as_deref(), Some("creator"));

    // granting bob member at the organization reaches the wiki and every document
    let (status, body) = t
        .send(
            "POST",
            &format!("/organizations/{org}/members"),
            Some(alice),
            Some(json!({ "user_id": bob, "role": "member" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "add member failed: {body}");
    assert_eq!(body["role"], "member");
    assert_eq!(t.role_at(bob, org, Some(wiki), None).await?.as_deref(), Some("member"));
    assert_eq!(t.role_at(bob, org, Some(wiki), Some(home)).await?.as_deref(), Some("member"));
    assert_eq!(t.role_at(bob, org, Some(wiki), Some(doc)).await?.as_deref(), Some("member"));

    // carol joins the organization, then bob, a plain member, tries to make her a wiki admin
    let (status, _) = t
        .send(
            "POST",
            &format!("/organizations/{org}/members"),
            Some(alice),
            Some(json!({ "user_id": carol, "role": "member" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = t
        .send(
            "PUT",
            &format!("/wikis/{wiki}/members"),
            Some(bob),
            Some(json!({ "user_id": carol, "role": "admin" })),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
    assert_eq!(t.role_at(carol, org, Some(wiki), None).await?.as_deref(), Some("member"));

    // only the creator may delete; deleting clears every record beneath the organization
    let (status, _) = t.send("DELETE", &format!("/organizations/{org}"), Some(bob), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t.send("DELETE", &format!("/organizations/{org}"), Some(alice), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM authorizations WHERE organization_id = ?")
        .bind(org.to_string())
        .fetch_one(&t.pool)
        .await?;
    assert_eq!(remaining, 0);

    let (status, _) = t.send("GET", &format!("/wikis/{wiki}"), Some(alice), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn requests_without_identity_are_rejected() -> Result<()> {
    let t = setup().await?;

    let (status, body) = t.send("GET", "/organizations", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    Ok(())
}

#[tokio::test]
async fn organization_limit_is_enforced() -> Result<()> {
    let t = setup().await?;
    let alice = t.register("alice").await?;

    for i in 0..5 {
        t.create_organization(alice, &format!("org-{i}")).await?;
    }

    let (status, body) = t
        .send("POST", "/organizations", Some(alice), Some(json!({ "name": "one too many" })))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT, "expected conflict, got {body}");

    let (status, body) = t.send("GET", "/organizations", Some(alice), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(5));

    Ok(())
}

#[tokio::test]
async fn documents_follow_wiki_membership() -> Result<()> {
    let t = setup().await?;
    let alice = t.register("alice").await?;
    let bob = t.register("bob").await?;
    let org = t.create_organization(alice, "Acme").await?;
    let (wiki, home) = t.create_wiki(alice, org, "Design").await?;

    // outsiders cannot be added below the organization
    let (status, body) = t
        .send(
            "POST",
            &format!("/wikis/{wiki}/members"),
            Some(alice),
            Some(json!({ "user_id": bob, "role": "member" })),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "forbidden: user is not a member of the organization");

    // block bob at the organization; the block cascades
    let (status, _) = t
        .send(
            "POST",
            &format!("/organizations/{org}/members"),
            Some(alice),
            Some(json!({ "user_id": bob, "role": "noAccess" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = t.send("GET", &format!("/wikis/{wiki}"), Some(bob), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // alice still sees the wiki she created
    let (status, body) = t
        .send("GET", &format!("/organizations/{org}/wikis?filter=joined"), Some(alice), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    // open up the wiki for bob
    let (status, body) = t
        .send(
            "POST",
            &format!("/wikis/{wiki}/members"),
            Some(alice),
            Some(json!({ "user_id": bob, "role": "member" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "wiki member add failed: {body}");

    let child = t.create_document(bob, wiki, "Notes", Some(home)).await?;
    let grandchild = t.create_document(bob, wiki, "Details", Some(child)).await?;
    assert_eq!(t.role_at(bob, org, Some(wiki), Some(child)).await?.as_deref(), Some("creator"));
    assert_eq!(t.role_at(alice, org, Some(wiki), Some(child)).await?.as_deref(), Some("creator"));

    let (status, body) = t.send("GET", &format!("/wikis/{wiki}/documents"), Some(bob), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(3));

    // the home document is protected
    let (status, body) = t.send("DELETE", &format!("/documents/{home}"), Some(alice), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "forbidden: a wiki's home document cannot be deleted");

    // deleting a document moves its children up
    let (status, _) = t.send("DELETE", &format!("/documents/{child}"), Some(bob), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = t.send("GET", &format!("/documents/{grandchild}"), Some(bob), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["parent_document_id"], home.to_string());
    assert_eq!(t.role_at(bob, org, Some(wiki), Some(child)).await?, None);

    Ok(())
}

#[tokio::test]
async fn concurrent_cascade_reaches_every_document() -> Result<()> {
    let t = common::setup_with_mode(kb_access::config::CascadeMode::Concurrent).await?;
    let alice = t.register("alice").await?;
    let bob = t.register("bob").await?;
    let org = t.create_organization(alice, "Acme").await?;
    let (wiki, home) = t.create_wiki(alice, org, "Runbooks").await?;
    let mut docs = vec![home];
    for title in ["a", "b", "c"] {
        docs.push(t.create_document(alice, wiki, title, None).await?);
    }

    let (status, _) = t
        .send(
            "POST",
            &format!("/organizations/{org}/members"),
            Some(alice),
            Some(json!({ "user_id": bob, "role": "admin" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    for doc in docs {
        assert_eq!(t.role_at(bob, org, Some(wiki), Some(doc)).await?.as_deref(), Some("admin"));
    }

    Ok(())
}
