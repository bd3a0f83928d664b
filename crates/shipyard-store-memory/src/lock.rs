//! [`AgentLockRepository`] for [`InMemoryStore`]

use chrono::Duration;
use dashmap::mapref::entry::Entry;
use shipyard_core::repository::RepositoryResult;
use shipyard_core::AgentLockRepository;

use crate::InMemoryStore;

#[async_trait::async_trait]
impl AgentLockRepository for InMemoryStore {
    async fn try_acquire_lock(
        &self,
        agent_name: &str,
        lock_timeout_seconds: u64,
    ) -> RepositoryResult<bool> {
        let now = self.now();
        let max = i64::MAX / 1000;
        let ttl = Duration::seconds(i64::try_from(lock_timeout_seconds).map_or(max, |s| s.min(max)));
        let expires_at = now.checked_add_signed(ttl).unwrap_or(now);

        match self.leases.entry(agent_name.to_string()) {
            Entry::Occupied(mut lease) => {
                if *lease.get() > now {
                    return Ok(false);
                }
                tracing::debug!("lease on {} expired, taking over", agent_name);
                lease.insert(expires_at);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(expires_at);
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shipyard_core::MutableClock;

    use super::*;

    #[tokio::test]
    async fn lease_is_exclusive_until_it_expires() {
        let clock = Arc::new(MutableClock::default());
        let store = InMemoryStore::with_clock(clock.clone());

        assert!(store.try_acquire_lock("task-monitor", 60).await.unwrap());
        assert!(!store.try_acquire_lock("task-monitor", 60).await.unwrap());
        assert!(store.try_acquire_lock("preview-cleanup", 60).await.unwrap());

        clock.tick(Duration::seconds(61));
        assert!(store.try_acquire_lock("task-monitor", 60).await.unwrap());
        assert!(!store.try_acquire_lock("task-monitor", 60).await.unwrap());
    }
}
