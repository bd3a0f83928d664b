//! [`DiffFingerprintRepository`] for [`InMemoryStore`]

use shipyard_core::repository::RepositoryResult;
use shipyard_core::{DiffFingerprintRepository, ResourceDiff, ResourceId};

use crate::{Fingerprint, InMemoryStore};

#[async_trait::async_trait]
impl DiffFingerprintRepository for InMemoryStore {
    async fn store(&self, id: &ResourceId, diff: &ResourceDiff) -> RepositoryResult<()> {
        let hash = diff.fingerprint();
        let mut inner = self.inner.write();
        match inner.fingerprints.get_mut(id) {
            Some(existing) if existing.hash == hash => existing.count += 1,
            _ => {
                inner.fingerprints.insert(
                    id.clone(),
                    Fingerprint {
                        hash,
                        count: 1,
                        action_taken: 0,
                    },
                );
            }
        }
        Ok(())
    }

    async fn diff_count(&self, id: &ResourceId) -> RepositoryResult<u32> {
        Ok(self.inner.read().fingerprints.get(id).map_or(0, |f| f.count))
    }

    async fn action_taken_count(&self, id: &ResourceId) -> RepositoryResult<u32> {
        Ok(self.inner.read().fingerprints.get(id).map_or(0, |f| f.action_taken))
    }

    async fn mark_action_taken(&self, id: &ResourceId) -> RepositoryResult<()> {
        if let Some(f) = self.inner.write().fingerprints.get_mut(id) {
            f.action_taken += 1;
        }
        Ok(())
    }

    async fn clear(&self, id: &ResourceId) -> RepositoryResult<()> {
        self.inner.write().fingerprints.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn same_diff_counts_up_and_a_new_one_resets() {
        let store = InMemoryStore::new();
        let id = ResourceId::new("ec2:cluster:test:fnord");
        let drift = ResourceDiff::new(json!({"image": "2.0"}), Some(json!({"image": "1.0"})));
        let other = ResourceDiff::new(json!({"image": "3.0"}), Some(json!({"image": "1.0"})));

        DiffFingerprintRepository::store(&store, &id, &drift).await.unwrap();
        DiffFingerprintRepository::store(&store, &id, &drift).await.unwrap();
        store.mark_action_taken(&id).await.unwrap();
        assert_eq!(store.diff_count(&id).await.unwrap(), 2);
        assert_eq!(store.action_taken_count(&id).await.unwrap(), 1);

        DiffFingerprintRepository::store(&store, &id, &other).await.unwrap();
        assert_eq!(store.diff_count(&id).await.unwrap(), 1);
        assert_eq!(store.action_taken_count(&id).await.unwrap(), 0);

        store.clear(&id).await.unwrap();
        assert_eq!(store.diff_count(&id).await.unwrap(), 0);
    }
}
