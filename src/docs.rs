use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::identity::USER_ID_HEADER;
use crate::models;
use crate::routes::{documents, health, members, organizations, users, wikis};

#[derive(OpenApi)]
#[openapi(
	paths(
		health::health,
		users::create_user,
		users::me,
		organizations::create_organization,
		organizations::list_organizations,
		organizations::get_organization,
		organizations::update_organization,
		organizations::viewable_scopes,
		organizations::delete_organization,
		wikis::create_wiki,
		wikis::list_wikis,
		wikis::get_wiki,
		wikis::update_wiki,
		wikis::delete_wiki,
		wikis::list_documents,
		wikis::create_document,
		documents::get_document,
		documents::update_document,
		documents::delete_document,
		members::list_organization_members,
		members::add_organization_member,
		members::update_organization_member,
		members::remove_organization_member,
		members::list_wiki_members,
		members::add_wiki_member,
		members::update_wiki_member,
		members::remove_wiki_member,
		members::update_document_member
	),
	components(
		schemas(
			health::HealthResponse,
			models::user::User,
			models::user::UserCreateRequest,
			models::organization::Organization,
			models::organization::OrganizationCreateRequest,
			models::organization::OrganizationUpdateRequest,
			models::wiki::Wiki,
			models::wiki::WikiAccess,
			models::wiki::WikiCreateRequest,
			models::wiki::WikiUpdateRequest,
			models::wiki::WikiFilter,
			models::document::Document,
			models::document::DocumentCreateRequest,
			models::document::DocumentUpdateRequest,
			models::authorization::Role,
			models::authorization::AuthRecord,
			models::authorization::Member,
			models::authorization::MemberPage,
			models::authorization::MemberRoleRequest,
			models::authorization::MemberRemoveRequest,
			models::authorization::ViewableScopes
		)
	),
	tags(
		(name = "Health", description = "Service health"),
		(name = "Users", description = "Identity directory"),
		(name = "Organizations", description = "Organization lifecycle"),
		(name = "Wikis", description = "Wiki lifecycle"),
		(name = "Documents", description = "Document lifecycle"),
		(name = "Members", description = "Role delegation and membership listing")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	ensure_security_components(&mut doc);
	ensure_global_security(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn object_entry<'a>(parent: &'a mut Value, key: &str) -> Option<&'a mut Map<String, Value>> {
	parent
		.as_object_mut()?
		.entry(key)
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
}

// Swagger's Authorize dialog fills the identity header the gateway normally sets.
fn ensure_security_components(doc: &mut Value) {
	let Some(components) = object_entry(doc, "components") else {
		return;
	};
	let schemes = components
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()));

	if let Some(schemes) = schemes.as_object_mut() {
		schemes.insert(
			"userIdHeader".to_string(),
			json!({
				"type": "apiKey",
				"in": "header",
				"name": USER_ID_HEADER
			}),
		);
	}
}

fn ensure_global_security(doc: &mut Value) {
	if let Some(root) = doc.as_object_mut() {
		root.entry("security").or_insert_with(|| json!([{ "userIdHeader": [] }]));
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{}", port);

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}
