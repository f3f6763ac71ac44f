use uuid::Uuid;

use super::{reasons, AccessEngine};
use crate::errors::{AppError, AppResult};
use crate::models::authorization::{AuthRecord, Role, Scope, ScopeLevel};

impl AccessEngine {
    async fn ensure_user_exists(&self, user_id: Uuid) -> AppResult<()> {
        if self.directory.exists(user_id).await? {
            Ok(())
        } else {
            Err(AppError::not_found(format!("user {user_id} not found")))
        }
    }

    /// Rules for `acting` changing `target`'s role at `scope`. `requested` is
    /// the role being assigned, or `None` when removing the target's role, in
    /// which case the target's current role is what gets checked.
    ///
    /// Returns the target's current record.
    async fn authorize_delegation(
        &self,
        acting_user_id: Uuid,
        target_user_id: Uuid,
        scope: &Scope,
        requested: Option<Role>,
    ) -> AppResult<Option<AuthRecord>> {
        let deny = |reason: &str| {
            tracing::warn!(
                acting_user_id = %acting_user_id,
                target_user_id = %target_user_id,
                scope = %scope,
                reason,
                "delegation denied"
            );
            AppError::forbidden(reason)
        };

        let acting = self
            .get_record(acting_user_id, scope)
            .await?
            .ok_or_else(|| deny(reasons::NO_ROLE_AT_SCOPE))?;

        if !acting.role.can_delegate() {
            return Err(deny(reasons::INSUFFICIENT_ROLE));
        }

        let target = self.get_record(target_user_id, scope).await?;
        let checked_role = requested.or(target.as_ref().map(|record| record.role));

        if checked_role.is_some_and(|role| role.is_elevated()) && acting.role != Role::Creator {
            return Err(deny(reasons::ELEVATED_ROLE_REQUIRES_CREATOR));
        }

        match target.as_ref().map(|record| record.role) {
            Some(Role::Creator) => Err(deny(reasons::TARGET_IS_CREATOR)),
            Some(Role::Admin) if acting.role != Role::Creator => Err(deny(reasons::TARGET_IS_ADMIN)),
            _ => Ok(target),
        }
    }

    /// Change another user's role at `scope`, cascading on success.
    pub async fn set_other_user_role(
        &self,
        acting_user_id: Uuid,
        target_user_id: Uuid,
        scope: &Scope,
        role: Role,
    ) -> AppResult<AuthRecord> {
        self.ensure_user_exists(target_user_id).await?;
        self.authorize_delegation(acting_user_id, target_user_id, scope, Some(role)).await?;
        self.grant(target_user_id, scope, role).await
    }

    /// Remove another user's role at `scope` and beneath it.
    pub async fn revoke_other_user_role(&self, acting_user_id: Uuid, target_user_id: Uuid, scope: &Scope) -> AppResult<u64> {
        self.ensure_user_exists(target_user_id).await?;
        let target = self.authorize_delegation(acting_user_id, target_user_id, scope, None).await?;
        if target.is_none() {
            return Err(AppError::not_found(format!("user {target_user_id} holds no role at {scope}")));
        }
        self.revoke(target_user_id, scope).await
    }

    /// Bring a user into `scope`. Below the organization level the user must
    /// already belong to the organization.
    pub async fn add_member(&self, acting_user_id: Uuid, target_user_id: Uuid, scope: &Scope, role: Role) -> AppResult<AuthRecord> {
        self.ensure_user_exists(target_user_id).await?;

        if scope.level() != ScopeLevel::Organization
            && self.get_record(target_user_id, &scope.organization_scope()).await?.is_none()
        {
            return Err(AppError::forbidden(reasons::NOT_ORGANIZATION_MEMBER));
        }

        self.authorize_delegation(acting_user_id, target_user_id, scope, Some(role)).await?;
        self.grant(target_user_id, scope, role).await
    }
}
