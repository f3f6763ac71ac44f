use std::collections::HashMap;

use uuid::Uuid;

use super::{store, AccessEngine};
use crate::errors::{AppError, AppResult};
use crate::models::authorization::{AuthRecord, Member, Page, Pagination, Role, Scope, ScopeLevel, ViewableScopes};
use crate::models::wiki::WikiFilter;

impl AccessEngine {
    /// Members of an organization or wiki, `noAccess` holders included, oldest
    /// first. Without pagination every member is returned.
    pub async fn list_members(&self, scope: &Scope, pagination: Option<Pagination>) -> AppResult<Page<Member>> {
        if scope.level() == ScopeLevel::Document {
            return Err(AppError::bad_request("members can only be listed for an organization or a wiki"));
        }

        let (records, total) = {
            let mut conn = self.pool.acquire().await?;
            store::records_at_scope(&mut conn, scope, &Role::RECOGNIZED, pagination).await?
        };

        let user_ids: Vec<Uuid> = records.iter().map(|record| record.user_id).collect();
        let mut users: HashMap<Uuid, _> = self
            .directory
            .find_many(&user_ids)
            .await?
            .into_iter()
            .map(|user| (user.id, user))
            .collect();

        let records = records
            .into_iter()
            .map(|auth| Member { user: users.remove(&auth.user_id), auth })
            .collect();

        Ok(Page { records, total })
    }

    /// The user's wiki-scope records in an organization, narrowed by `filter`.
    pub async fn list_user_wikis(&self, user_id: Uuid, organization_id: Uuid, filter: WikiFilter) -> AppResult<Vec<AuthRecord>> {
        let mut conn = self.pool.acquire().await?;
        store::user_records_at_level(&mut conn, user_id, organization_id, ScopeLevel::Wiki, None, filter.roles()).await
    }

    pub async fn list_viewable_scopes(&self, user_id: Uuid, organization_id: Uuid) -> AppResult<ViewableScopes> {
        let mut conn = self.pool.acquire().await?;
        let wikis =
            store::user_records_at_level(&mut conn, user_id, organization_id, ScopeLevel::Wiki, None, &Role::ACTIVE).await?;
        let documents =
            store::user_records_at_level(&mut conn, user_id, organization_id, ScopeLevel::Document, None, &Role::ACTIVE)
                .await?;

        Ok(ViewableScopes {
            wiki_ids: wikis.iter().filter_map(|record| record.wiki_id).collect(),
            document_ids: documents.iter().filter_map(|record| record.document_id).collect(),
        })
    }

    pub async fn list_viewable_organizations(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let mut conn = self.pool.acquire().await?;
        store::user_organization_ids(&mut conn, user_id, &Role::ACTIVE).await
    }

    /// The user's active document records inside one wiki.
    pub async fn list_viewable_documents(&self, user_id: Uuid, organization_id: Uuid, wiki_id: Uuid) -> AppResult<Vec<AuthRecord>> {
        let mut conn = self.pool.acquire().await?;
        store::user_records_at_level(
            &mut conn,
            user_id,
            organization_id,
            ScopeLevel::Document,
            Some(wiki_id),
            &Role::ACTIVE,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::fixtures;
    use crate::config::EngineConfig;
    use crate::db;

    #[tokio::test]
    async fn members_page_reports_full_total() -> anyhow::Result<()> {
        let pool = db::memory_pool().await?;
        let engine = AccessEngine::new(pool.clone(), EngineConfig::default());
        let org = Scope::organization(Uuid::new_v4());

        for (name, role) in [("ada", Role::Creator), ("bob", Role::Member), ("cy", Role::NoAccess)] {
            let user = fixtures::user(&pool, name).await?;
            engine.upsert_record(user, &org, role).await?;
        }

        let page = engine.list_members(&org, Some(Pagination::new(2, 1))).await?;
        assert_eq!(page.total, 3);
        assert_eq!(page.records.len(), 1);

        let all = engine.list_members(&org, None).await?;
        assert_eq!(all.records.len(), 3);
        assert!(all.records.iter().any(|m| m.auth.role == Role::NoAccess));
        assert!(all.records.iter().all(|m| m.user.is_some()));
        Ok(())
    }

    #[tokio::test]
    async fn document_members_are_rejected() -> anyhow::Result<()> {
        let pool = db::memory_pool().await?;
        let engine = AccessEngine::new(pool, EngineConfig::default());
        let scope = Scope::document(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        assert!(matches!(engine.list_members(&scope, None).await, Err(AppError::BadRequest(_))));
        Ok(())
    }

    #[tokio::test]
    async fn wiki_filters_select_by_role() -> anyhow::Result<()> {
        let pool = db::memory_pool().await?;
        let engine = AccessEngine::new(pool, EngineConfig::default());
        let user = Uuid::new_v4();
        let org = Uuid::new_v4();
        let (created, joined, blocked) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        engine.upsert_record(user, &Scope::organization(org), Role::Member).await?;
        engine.upsert_record(user, &Scope::wiki(org, created), Role::Creator).await?;
        engine.upsert_record(user, &Scope::wiki(org, joined), Role::Member).await?;
        engine.upsert_record(user, &Scope::wiki(org, blocked), Role::NoAccess).await?;
        engine.upsert_record(user, &Scope::document(org, joined, Uuid::new_v4()), Role::Member).await?;

        let ids = |records: Vec<AuthRecord>| {
            let mut ids: Vec<Uuid> = records.into_iter().filter_map(|r| r.wiki_id).collect();
            ids.sort();
            ids
        };
        let sorted = |mut ids: Vec<Uuid>| {
            ids.sort();
            ids
        };

        assert_eq!(ids(engine.list_user_wikis(user, org, WikiFilter::Created).await?), vec![created]);
        assert_eq!(ids(engine.list_user_wikis(user, org, WikiFilter::Joined).await?), sorted(vec![created, joined]));
        assert_eq!(
            ids(engine.list_user_wikis(user, org, WikiFilter::Viewable).await?),
            sorted(vec![created, joined, blocked])
        );
        Ok(())
    }

    #[tokio::test]
    async fn viewable_scopes_skip_blocked_records() -> anyhow::Result<()> {
        let pool = db::memory_pool().await?;
        let engine = AccessEngine::new(pool, EngineConfig::default());
        let user = Uuid::new_v4();
        let org = Uuid::new_v4();
        let (open, closed) = (Uuid::new_v4(), Uuid::new_v4());
        let (doc, hidden_doc) = (Uuid::new_v4(), Uuid::new_v4());

        engine.upsert_record(user, &Scope::organization(org), Role::Admin).await?;
        engine.upsert_record(user, &Scope::wiki(org, open), Role::Admin).await?;
        engine.upsert_record(user, &Scope::wiki(org, closed), Role::NoAccess).await?;
        engine.upsert_record(user, &Scope::document(org, open, doc), Role::Member).await?;
        engine.upsert_record(user, &Scope::document(org, open, hidden_doc), Role::NoAccess).await?;

        let scopes = engine.list_viewable_scopes(user, org).await?;
        assert_eq!(scopes.wiki_ids, vec![open]);
        assert_eq!(scopes.document_ids, vec![doc]);

        assert_eq!(engine.list_viewable_organizations(user).await?, vec![org]);
        let documents = engine.list_viewable_documents(user, org, open).await?;
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].document_id, Some(doc));
        assert!(engine.list_viewable_documents(user, org, closed).await?.is_empty());
        Ok(())
    }
}
