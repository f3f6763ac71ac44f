use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::events::Loggable;
use crate::models::authorization::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Wiki {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub create_user_id: Uuid,
    /// Set once the home document has been created alongside the wiki.
    pub home_document_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Wiki {
    fn entity_type() -> &'static str { "wiki" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WikiCreateRequest {
    #[schema(example = "Runbooks")]
    pub name: String,
    #[schema(example = "On-call procedures")]
    pub description: Option<String>,
}

/// Which of a user's wikis to list. The role sets are disjoint filters over
/// the user's wiki-scope records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WikiFilter {
    /// Every recognized role, `noAccess` included.
    #[default]
    Viewable,
    /// Only wikis the user created.
    Created,
    /// Wikis the user actively participates in.
    Joined,
}

impl WikiFilter {
    pub fn roles(&self) -> &'static [Role] {
        match self {
            WikiFilter::Viewable => &Role::RECOGNIZED,
            WikiFilter::Created => &[Role::Creator],
            WikiFilter::Joined => &Role::ACTIVE,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WikiListQuery {
    pub filter: Option<WikiFilter>,
}

/// A wiki together with the caller's role on it.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WikiAccess {
    pub wiki: Wiki,
    pub role: Role,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WikiUpdateRequest {
    #[schema(example = "Runbooks (archived)")]
    pub name: Option<String>,
    pub description: Option<String>,
}
