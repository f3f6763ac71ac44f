use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::Loggable;

/// Document metadata. Content and collaborative state are stored elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Document {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub wiki_id: Uuid,
    pub parent_document_id: Option<Uuid>,
    pub title: String,
    pub create_user_id: Uuid,
    pub is_wiki_home: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Document {
    fn entity_type() -> &'static str { "document" }
    fn subject_id(&self) -> Uuid { self.id }
}

pub const UNTITLED_DOCUMENT: &str = "Untitled";

#[derive(Debug, Deserialize, ToSchema)]
pub struct DocumentCreateRequest {
    #[schema(example = "Incident response")]
    pub title: Option<String>,
    pub parent_document_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DocumentUpdateRequest {
    #[schema(example = "Incident response v2")]
    pub title: Option<String>,
}
