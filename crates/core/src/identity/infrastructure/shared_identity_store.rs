use std::sync::{Arc, Mutex, MutexGuard};

use crate::identity::domain::identity_repository::StoreError;
use crate::identity::domain::identity_store::{IdentityStore, MatchCandidate};
use crate::identity::domain::person_id::PersonId;
use crate::shared::embedding::Embedding;

/// Cloneable handle to one process-wide [`IdentityStore`].
///
/// Each call holds the lock for its whole match, mutate and save sequence,
/// so concurrent enrollments cannot mint the same id or interleave writes.
#[derive(Clone)]
pub struct SharedIdentityStore {
    inner: Arc<Mutex<IdentityStore>>,
}

impl SharedIdentityStore {
    pub fn new(store: IdentityStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, IdentityStore>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Runs `f` inside the critical section.
    pub fn with<R>(&self, f: impl FnOnce(&mut IdentityStore) -> R) -> Result<R, StoreError> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }

    pub fn match_embedding(&self, embedding: &Embedding) -> Result<Option<PersonId>, StoreError> {
        Ok(self.lock()?.match_embedding(embedding))
    }

    pub fn nearest(&self, embedding: &Embedding) -> Result<Option<MatchCandidate>, StoreError> {
        Ok(self.lock()?.nearest(embedding))
    }

    pub fn enroll_or_update(&self, embedding: Embedding) -> Result<PersonId, StoreError> {
        self.lock()?.enroll_or_update(embedding)
    }

    pub fn update_samples(&self, index: usize, embedding: Embedding) -> Result<(), StoreError> {
        self.lock()?.update_samples(index, embedding)
    }

    pub fn save(&self) -> Result<(), StoreError> {
        self.lock()?.save()
    }

    /// Ids with their sample counts, in enrollment order.
    pub fn summary(&self) -> Result<Vec<(PersonId, usize)>, StoreError> {
        let store = self.lock()?;
        Ok(store
            .identities()
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, store.sample_count(i).unwrap_or(0)))
            .collect())
    }
}
