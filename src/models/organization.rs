use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub create_user_id: Uuid,
    pub is_personal: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Organization {
    fn entity_type() -> &'static str { "organization" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Important }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrganizationCreateRequest {
    #[schema(example = "Acme Docs")]
    pub name: String,
    #[schema(example = "Engineering handbook and runbooks")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_personal: bool,
}

/// Fields left out keep their current value.
#[derive(Debug, Deserialize, ToSchema)]
pub struct OrganizationUpdateRequest {
    #[schema(example = "Acme Handbook")]
    pub name: Option<String>,
    pub description: Option<String>,
}
