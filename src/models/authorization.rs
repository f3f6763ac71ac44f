use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};
use crate::models::user::User;

// =============================================================================
// ROLE
// =============================================================================

/// Privilege level held at a single scope.
///
/// `Creator > Admin > Member`. `NoAccess` is an explicit, persisted block and
/// is not the same thing as holding no record at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Role {
    #[serde(rename = "creator")]
    Creator,
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "member")]
    Member,
    #[serde(rename = "noAccess")]
    NoAccess,
}

impl Role {
    /// Every role the listing queries recognize.
    pub const RECOGNIZED: [Role; 4] = [Role::Creator, Role::Admin, Role::Member, Role::NoAccess];

    /// Roles that grant visibility.
    pub const ACTIVE: [Role; 3] = [Role::Creator, Role::Admin, Role::Member];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Creator => "creator",
            Role::Admin => "admin",
            Role::Member => "member",
            Role::NoAccess => "noAccess",
        }
    }

    pub fn allows_view(&self) -> bool {
        !matches!(self, Role::NoAccess)
    }

    pub fn allows_edit(&self) -> bool {
        matches!(self, Role::Creator | Role::Admin)
    }

    pub fn allows_delete(&self) -> bool {
        matches!(self, Role::Creator)
    }

    /// Creator and admin may change other users' roles.
    pub fn can_delegate(&self) -> bool {
        self.allows_edit()
    }

    /// Creator and admin can only be handed out by a creator.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Creator | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creator" => Ok(Role::Creator),
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            "noAccess" | "no_access" => Ok(Role::NoAccess),
            other => Err(AppError::bad_request(format!("unknown role: {other}"))),
        }
    }
}

// =============================================================================
// SCOPE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    Organization,
    Wiki,
    Document,
}

/// The resource level a record applies to: an organization, a wiki inside it,
/// or a document inside that wiki.
///
/// A document scope always carries its wiki; the constructors make any other
/// shape unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "ScopeParts")]
pub struct Scope {
    organization_id: Uuid,
    wiki_id: Option<Uuid>,
    document_id: Option<Uuid>,
}

/// Unvalidated scope as it arrives over the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct ScopeParts {
    pub organization_id: Uuid,
    pub wiki_id: Option<Uuid>,
    pub document_id: Option<Uuid>,
}

impl TryFrom<ScopeParts> for Scope {
    type Error = AppError;

    fn try_from(parts: ScopeParts) -> Result<Self, Self::Error> {
        Scope::try_new(parts.organization_id, parts.wiki_id, parts.document_id)
    }
}

impl Scope {
    pub fn organization(organization_id: Uuid) -> Self {
        Self { organization_id, wiki_id: None, document_id: None }
    }

    pub fn wiki(organization_id: Uuid, wiki_id: Uuid) -> Self {
        Self { organization_id, wiki_id: Some(wiki_id), document_id: None }
    }

    pub fn document(organization_id: Uuid, wiki_id: Uuid, document_id: Uuid) -> Self {
        Self { organization_id, wiki_id: Some(wiki_id), document_id: Some(document_id) }
    }

    pub fn try_new(organization_id: Uuid, wiki_id: Option<Uuid>, document_id: Option<Uuid>) -> Result<Self, AppError> {
        match (wiki_id, document_id) {
            (None, Some(_)) => Err(AppError::bad_request("a document scope requires a wiki_id")),
            _ => Ok(Self { organization_id, wiki_id, document_id }),
        }
    }

    pub fn organization_id(&self) -> Uuid {
        self.organization_id
    }

    pub fn wiki_id(&self) -> Option<Uuid> {
        self.wiki_id
    }

    pub fn document_id(&self) -> Option<Uuid> {
        self.document_id
    }

    pub fn level(&self) -> ScopeLevel {
        match (self.wiki_id, self.document_id) {
            (None, _) => ScopeLevel::Organization,
            (Some(_), None) => ScopeLevel::Wiki,
            (Some(_), Some(_)) => ScopeLevel::Document,
        }
    }

    /// Canonical key used by the unique index: `org/wiki/doc`, empty segments for absent levels.
    pub fn key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.organization_id,
            self.wiki_id.map(|id| id.to_string()).unwrap_or_default(),
            self.document_id.map(|id| id.to_string()).unwrap_or_default(),
        )
    }

    pub fn organization_scope(&self) -> Scope {
        Scope::organization(self.organization_id)
    }

    /// True when `other` is this scope or lies beneath it.
    pub fn contains(&self, other: &Scope) -> bool {
        if self.organization_id != other.organization_id {
            return false;
        }
        match self.level() {
            ScopeLevel::Organization => true,
            ScopeLevel::Wiki => self.wiki_id == other.wiki_id,
            ScopeLevel::Document => self == other,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "org:{}", self.organization_id)?;
        if let Some(wiki_id) = self.wiki_id {
            write!(f, "/wiki:{wiki_id}")?;
        }
        if let Some(document_id) = self.document_id {
            write!(f, "/doc:{document_id}")?;
        }
        Ok(())
    }
}

// =============================================================================
// AUTHORIZATION RECORD
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuthRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub wiki_id: Option<Uuid>,
    pub document_id: Option<Uuid>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuthRecord {
    pub fn scope(&self) -> Scope {
        Scope {
            organization_id: self.organization_id,
            wiki_id: self.wiki_id,
            document_id: self.document_id,
        }
    }
}

impl Loggable for AuthRecord {
    fn entity_type() -> &'static str { "authorization" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

/// A record joined with the identity it belongs to.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Member {
    pub auth: AuthRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

/// Wikis and documents within one organization a user can currently see.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct ViewableScopes {
    pub wiki_ids: Vec<Uuid>,
    pub document_ids: Vec<Uuid>,
}

// =============================================================================
// REQUESTS
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct MemberRoleRequest {
    pub user_id: Uuid,
    #[schema(example = "member")]
    pub role: Role,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MemberRemoveRequest {
    pub user_id: Uuid,
}

// =============================================================================
// PAGINATION
// =============================================================================

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: DEFAULT_PAGE, page_size: DEFAULT_PAGE_SIZE }
    }
}

impl Pagination {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page: page.max(1), page_size: page_size.max(1) }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }
}

/// Query string form; omitting both fields means "return everything".
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationQuery {
    pub page: Option<u32>,
    #[serde(alias = "pageSize")]
    pub page_size: Option<u32>,
}

impl PaginationQuery {
    pub fn into_pagination(self) -> Option<Pagination> {
        match (self.page, self.page_size) {
            (None, None) => None,
            (page, page_size) => Some(Pagination::new(
                page.unwrap_or(DEFAULT_PAGE),
                page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub total: i64,
}

/// Documented shape of `Page<Member>`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MemberPage {
    pub records: Vec<Member>,
    pub total: i64,
}

impl From<Page<Member>> for MemberPage {
    fn from(page: Page<Member>) -> Self {
        Self { records: page.records, total: page.total }
    }
}
