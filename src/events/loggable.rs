use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retention class of an activity entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Kept for good. Role changes and deletions.
    Critical,
    #[default]
    Important,
    Noise,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Anything published on the bus as `<entity_type>.<action>`.
pub trait Loggable: Serialize + Send + Sync {
    fn entity_type() -> &'static str;

    /// Id the activity entry is filed under.
    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" | "granted" | "revoked" => Severity::Critical,
            _ => self.severity(),
        }
    }
}
