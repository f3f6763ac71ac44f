use uuid::Uuid;

use super::{reasons, AccessEngine};
use crate::errors::{AppError, AppResult};
use crate::models::authorization::{AuthRecord, Role, Scope};

/// What a caller wants to do at a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Edit,
    Delete,
}

impl Action {
    pub fn permits(&self, role: Role) -> bool {
        match self {
            Action::View => role.allows_view(),
            Action::Edit => role.allows_edit(),
            Action::Delete => role.allows_delete(),
        }
    }

    fn denial(&self) -> &'static str {
        match self {
            Action::View => reasons::VIEW_DENIED,
            Action::Edit => reasons::EDIT_DENIED,
            Action::Delete => reasons::DELETE_DENIED,
        }
    }
}

impl AccessEngine {
    /// Evaluation order:
    /// 1. no record at the scope -> deny
    /// 2. the record's role permits the action -> allow
    /// 3. deny
    pub async fn check(&self, user_id: Uuid, scope: &Scope, action: Action) -> AppResult<AuthRecord> {
        let Some(record) = self.get_record(user_id, scope).await? else {
            tracing::debug!(user_id = %user_id, scope = %scope, ?action, "no record at scope");
            return Err(AppError::forbidden(reasons::NO_ROLE_AT_SCOPE));
        };

        if action.permits(record.role) {
            tracing::debug!(user_id = %user_id, scope = %scope, role = %record.role, ?action, "access granted");
            Ok(record)
        } else {
            tracing::debug!(user_id = %user_id, scope = %scope, role = %record.role, ?action, "access denied");
            Err(AppError::forbidden(action.denial()))
        }
    }

    pub async fn can_view(&self, user_id: Uuid, scope: &Scope) -> AppResult<AuthRecord> {
        self.check(user_id, scope, Action::View).await
    }

    pub async fn can_edit(&self, user_id: Uuid, scope: &Scope) -> AppResult<AuthRecord> {
        self.check(user_id, scope, Action::Edit).await
    }

    pub async fn can_delete(&self, user_id: Uuid, scope: &Scope) -> AppResult<AuthRecord> {
        self.check(user_id, scope, Action::Delete).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::db;

    #[test]
    fn role_matrix() {
        assert!(Action::View.permits(Role::Member));
        assert!(!Action::View.permits(Role::NoAccess));
        assert!(Action::Edit.permits(Role::Admin));
        assert!(!Action::Edit.permits(Role::Member));
        assert!(Action::Delete.permits(Role::Creator));
        assert!(!Action::Delete.permits(Role::Admin));
    }

    #[tokio::test]
    async fn no_access_is_denied_differently_from_absence() -> anyhow::Result<()> {
        let pool = db::memory_pool().await?;
        let engine = AccessEngine::new(pool, EngineConfig::default());
        let blocked = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let scope = Scope::wiki(Uuid::new_v4(), Uuid::new_v4());

        engine.upsert_record(blocked, &scope, Role::NoAccess).await?;

        let blocked_err = engine.can_view(blocked, &scope).await.unwrap_err();
        let stranger_err = engine.can_view(stranger, &scope).await.unwrap_err();

        assert_eq!(blocked_err.forbidden_reason(), Some(reasons::VIEW_DENIED));
        assert_eq!(stranger_err.forbidden_reason(), Some(reasons::NO_ROLE_AT_SCOPE));
        Ok(())
    }

    #[tokio::test]
    async fn checks_return_the_matched_record() -> anyhow::Result<()> {
        let pool = db::memory_pool().await?;
        let engine = AccessEngine::new(pool, EngineConfig::default());
        let admin = Uuid::new_v4();
        let scope = Scope::organization(Uuid::new_v4());

        let granted = engine.upsert_record(admin, &scope, Role::Admin).await?;

        assert_eq!(engine.can_view(admin, &scope).await?, granted);
        assert_eq!(engine.can_edit(admin, &scope).await?, granted);
        let err = engine.can_delete(admin, &scope).await.unwrap_err();
        assert_eq!(err.forbidden_reason(), Some(reasons::DELETE_DENIED));
        Ok(())
    }

    #[tokio::test]
    async fn checks_do_not_inherit_from_parents() -> anyhow::Result<()> {
        let pool = db::memory_pool().await?;
        let engine = AccessEngine::new(pool, EngineConfig::default());
        let user = Uuid::new_v4();
        let org = Uuid::new_v4();

        engine.upsert_record(user, &Scope::organization(org), Role::Creator).await?;

        assert!(engine.can_view(user, &Scope::wiki(org, Uuid::new_v4())).await.is_err());
        Ok(())
    }
}
