//! Per-user long-term memory.
//!
//! [`MemoryStore`] owns validation and expiry policy; persistence and the
//! atomic access counting live behind [`MemoryRepository`].

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use ragmem_core::defaults::MEMORY_LIST_LIMIT;
use ragmem_core::{
    expires_at_for, ConversationTurn, Error, Memory, MemoryQuery, MemoryRepository, MemoryUpdate,
    NewMemory, Result,
};
use ragmem_jobs::PeriodicTask;

/// CRUD and retrieval over one repository of memories.
#[derive(Clone)]
pub struct MemoryStore {
    repo: Arc<dyn MemoryRepository>,
}

impl MemoryStore {
    pub fn new(repo: Arc<dyn MemoryRepository>) -> Self {
        Self { repo }
    }

    /// Validate and persist a new memory. Expiry is banded from importance.
    #[instrument(skip(self, memory), fields(
        subsystem = "service",
        component = "memory_store",
        op = "add",
        user_id = %user_id,
    ))]
    pub async fn add(&self, user_id: Uuid, memory: NewMemory) -> Result<Memory> {
        memory.validate()?;
        let expires_at = expires_at_for(memory.importance, Utc::now());
        let stored = self.repo.insert(user_id, &memory, expires_at).await?;
        debug!(
            memory_id = %stored.id,
            importance = stored.importance,
            category = %stored.category,
            expires_at = ?stored.expires_at,
            "Memory added"
        );
        Ok(stored)
    }

    /// Active memories matching `query`, most important first.
    ///
    /// Every returned memory has its access counter bumped in the same
    /// operation that selected it.
    #[instrument(skip(self, query), fields(
        subsystem = "service",
        component = "memory_store",
        op = "retrieve",
        user_id = %user_id,
        limit = query.limit,
    ))]
    pub async fn retrieve(&self, user_id: Uuid, query: &MemoryQuery) -> Result<Vec<Memory>> {
        if !(0.0..=1.0).contains(&query.min_importance) {
            return Err(Error::InvalidInput(format!(
                "min_importance must be within [0, 1], got {}",
                query.min_importance
            )));
        }
        if query.limit == 0 {
            return Ok(vec![]);
        }
        let start = Instant::now();
        let memories = self.repo.retrieve_and_touch(user_id, query).await?;
        debug!(
            result_count = memories.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Memories retrieved"
        );
        Ok(memories)
    }

    /// Fetch one memory. Counts as an access.
    pub async fn get(&self, memory_id: Uuid, user_id: Uuid) -> Result<Memory> {
        self.repo
            .get_and_touch(memory_id, user_id)
            .await?
            .ok_or(Error::MemoryNotFound(memory_id))
    }

    /// Newest first, without touching access counters.
    pub async fn list(
        &self,
        user_id: Uuid,
        include_inactive: bool,
        limit: Option<usize>,
    ) -> Result<Vec<Memory>> {
        self.repo
            .list(user_id, include_inactive, limit.unwrap_or(MEMORY_LIST_LIMIT))
            .await
    }

    /// Apply a partial update. A new importance re-bands expiry from the
    /// memory's creation time.
    #[instrument(skip(self, update), fields(
        subsystem = "service",
        component = "memory_store",
        op = "update",
        memory_id = %memory_id,
    ))]
    pub async fn update(
        &self,
        memory_id: Uuid,
        user_id: Uuid,
        update: MemoryUpdate,
    ) -> Result<Memory> {
        update.validate()?;

        let expires_at = match update.importance {
            Some(importance) => {
                let current = self
                    .repo
                    .fetch(memory_id, user_id)
                    .await?
                    .ok_or(Error::MemoryNotFound(memory_id))?;
                Some(expires_at_for(importance, current.created_at))
            }
            None => None,
        };

        self.repo
            .update(memory_id, user_id, &update, expires_at)
            .await?
            .ok_or(Error::MemoryNotFound(memory_id))
    }

    /// Soft-delete. The row is kept with `is_active = false`.
    pub async fn deactivate(&self, memory_id: Uuid, user_id: Uuid) -> Result<()> {
        if self.repo.set_active(memory_id, user_id, false).await? {
            debug!(
                subsystem = "service",
                component = "memory_store",
                memory_id = %memory_id,
                "Memory deactivated"
            );
            Ok(())
        } else {
            Err(Error::MemoryNotFound(memory_id))
        }
    }

    /// Deactivate active memories whose expiry has passed, for one user or
    /// all users. Returns how many were deactivated.
    pub async fn cleanup_expired(&self, user_id: Option<Uuid>) -> Result<u64> {
        let start = Instant::now();
        let deactivated = self.repo.deactivate_expired(user_id, Utc::now()).await?;
        if deactivated > 0 {
            info!(
                subsystem = "service",
                component = "memory_store",
                op = "cleanup_expired",
                deactivated,
                duration_ms = start.elapsed().as_millis() as u64,
                "Expired memories deactivated"
            );
        }
        Ok(deactivated)
    }

    /// Hook for deriving memories from a finished conversation.
    ///
    /// Nothing is extracted yet.
    pub async fn extract_from_conversation(
        &self,
        user_id: Uuid,
        turns: &[ConversationTurn],
    ) -> Result<Vec<Memory>> {
        debug!(
            subsystem = "service",
            component = "memory_store",
            op = "extract_from_conversation",
            user_id = %user_id,
            turn_count = turns.len(),
            "Memory extraction not enabled"
        );
        Ok(vec![])
    }
}

#[async_trait]
impl PeriodicTask for MemoryStore {
    fn name(&self) -> &'static str {
        "memory_cleanup"
    }

    async fn run(&self) -> Result<u64> {
        self.cleanup_expired(None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ragmem_core::MemorySource;
    use ragmem_db::InMemoryStore;

    fn store() -> MemoryStore {
        MemoryStore::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_add_sets_expiry_band() {
        let store = store();
        let user = Uuid::now_v7();

        let before = Utc::now();
        let memory = store
            .add(user, NewMemory::new("Prefers metric units", 0.95))
            .await
            .unwrap();
        let expires = memory.expires_at.unwrap();
        let expected = before + Duration::days(180);
        assert!((expires - expected).num_seconds().abs() <= 1);
        assert_eq!(memory.access_count, 0);
        assert!(memory.is_active);
        assert_eq!(memory.category, "general");
        assert_eq!(memory.source, MemorySource::Manual);

        let low = store.add(user, NewMemory::new("Likes tea", 0.5)).await.unwrap();
        assert!(low.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_add_rejects_invalid_input() {
        let store = store();
        let user = Uuid::now_v7();
        assert!(matches!(
            store.add(user, NewMemory::new("   ", 0.5)).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.add(user, NewMemory::new("x", 1.5)).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.add(user, NewMemory::new("x".repeat(2001), 0.5)).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store
                .add(user, NewMemory::new("x", 0.5).with_category("c".repeat(51)))
                .await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_retrieve_filters_and_orders() {
        let store = store();
        let user = Uuid::now_v7();
        store.add(user, NewMemory::new("Deploy window is Tuesday", 0.4)).await.unwrap();
        store
            .add(user, NewMemory::new("Deploy freeze in December", 0.9).with_category("ops"))
            .await
            .unwrap();
        store.add(user, NewMemory::new("Favourite color is green", 0.8)).await.unwrap();

        let hits = store
            .retrieve(user, &MemoryQuery::default().with_query("DEPLOY"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "Deploy freeze in December");
        assert!(hits.iter().all(|m| m.access_count == 1 && m.last_accessed.is_some()));

        let ops = store
            .retrieve(user, &MemoryQuery::default().with_category("ops"))
            .await
            .unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].access_count, 2);
    }

    #[tokio::test]
    async fn test_min_importance_excludes_lower_memories() {
        let store = store();
        let user = Uuid::now_v7();
        store.add(user, NewMemory::new("Only a hunch", 0.5)).await.unwrap();

        let hits = store
            .retrieve(user, &MemoryQuery::default().with_min_importance(0.7))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_retrieval_counts_every_access() {
        let store = Arc::new(store());
        let user = Uuid::now_v7();
        let memory = store.add(user, NewMemory::new("Shared fact", 0.5)).await.unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let store = store.clone();
            tasks.spawn(async move {
                store.retrieve(user, &MemoryQuery::default()).await.unwrap();
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }

        let listed = store.list(user, false, None).await.unwrap();
        let stored = listed.iter().find(|m| m.id == memory.id).unwrap();
        assert_eq!(stored.access_count, 16);
    }

    #[tokio::test]
    async fn test_get_counts_as_access_and_is_owner_checked() {
        let store = store();
        let owner = Uuid::now_v7();
        let memory = store.add(owner, NewMemory::new("Owner only", 0.5)).await.unwrap();

        let fetched = store.get(memory.id, owner).await.unwrap();
        assert_eq!(fetched.access_count, 1);

        let stranger = Uuid::now_v7();
        assert!(matches!(
            store.get(memory.id, stranger).await,
            Err(Error::MemoryNotFound(id)) if id == memory.id
        ));
        assert!(store.retrieve(stranger, &MemoryQuery::default()).await.unwrap().is_empty());
        assert!(matches!(
            store.deactivate(memory.id, stranger).await,
            Err(Error::MemoryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_rebands_expiry_from_creation() {
        let store = store();
        let user = Uuid::now_v7();
        let memory = store.add(user, NewMemory::new("Rotates keys monthly", 0.5)).await.unwrap();
        assert!(memory.expires_at.is_none());

        let updated = store
            .update(
                memory.id,
                user,
                MemoryUpdate {
                    importance: Some(0.85),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.expires_at, Some(memory.created_at + Duration::days(90)));
        assert_eq!(updated.content, memory.content);

        let renamed = store
            .update(
                memory.id,
                user,
                MemoryUpdate {
                    content: Some("Rotates keys weekly".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.expires_at, updated.expires_at);
        assert_eq!(renamed.content, "Rotates keys weekly");

        assert!(matches!(
            store.update(Uuid::now_v7(), user, MemoryUpdate::default()).await,
            Err(Error::MemoryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_deactivated_memories_are_not_retrieved() {
        let store = store();
        let user = Uuid::now_v7();
        let memory = store.add(user, NewMemory::new("Old office address", 0.5)).await.unwrap();
        store.deactivate(memory.id, user).await.unwrap();

        assert!(store.retrieve(user, &MemoryQuery::default()).await.unwrap().is_empty());
        assert_eq!(store.list(user, true, None).await.unwrap().len(), 1);
        assert!(store.list(user, false, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let repo = Arc::new(InMemoryStore::new());
        let store = MemoryStore::new(repo.clone());
        let user = Uuid::now_v7();
        let past = Utc::now() - Duration::days(1);
        MemoryRepository::insert(
            repo.as_ref(),
            user,
            &NewMemory::new("Expired reminder", 0.65),
            Some(past),
        )
        .await
        .unwrap();
        store.add(user, NewMemory::new("Still fresh", 0.65)).await.unwrap();

        assert_eq!(store.cleanup_expired(None).await.unwrap(), 1);
        assert_eq!(store.cleanup_expired(None).await.unwrap(), 0);
        assert_eq!(store.retrieve(user, &MemoryQuery::default()).await.unwrap().len(), 1);
        assert_eq!(store.run().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_extraction_hook_returns_nothing() {
        let store = store();
        let turns = vec![ConversationTurn::user("Remember that I work nights")];
        let extracted = store
            .extract_from_conversation(Uuid::now_v7(), &turns)
            .await
            .unwrap();
        assert!(extracted.is_empty());
    }
}
