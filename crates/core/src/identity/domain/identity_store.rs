//! In-memory identity table with nearest-neighbour matching and bounded
//! per-identity sample history.

use std::collections::VecDeque;

use crate::shared::config::StoreConfig;
use crate::shared::embedding::Embedding;

use super::identity_repository::{IdentityRepository, IdentitySnapshot, StoreError, SNAPSHOT_VERSION};
use super::person_id::PersonId;

/// Closest identity to a probe, whether or not it is within threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchCandidate {
    pub index: usize,
    pub person_id: PersonId,
    pub distance: f64,
}

/// Identity list and sample lists, index-aligned.
///
/// Every identity holds between 1 and `max_samples` embeddings, oldest first.
pub struct IdentityStore {
    ids: Vec<PersonId>,
    samples: Vec<VecDeque<Embedding>>,
    /// `None` once `person_{u32::MAX}` has been issued.
    next_sequence: Option<u32>,
    config: StoreConfig,
    repository: Option<Box<dyn IdentityRepository>>,
}

impl IdentityStore {
    /// Empty store that never touches disk.
    pub fn in_memory(config: StoreConfig) -> Self {
        Self {
            ids: Vec::new(),
            samples: Vec::new(),
            next_sequence: Some(1),
            config,
            repository: None,
        }
    }

    /// Restores from `repository`. Missing, empty or corrupt state yields an
    /// empty store; enrollment must stay possible after a bad file.
    pub fn load(repository: Box<dyn IdentityRepository>, config: StoreConfig) -> Self {
        let snapshot = match repository.load() {
            Ok(Some(snapshot)) => match snapshot.validate() {
                Ok(()) => snapshot,
                Err(reason) => {
                    log::warn!(
                        "Ignoring inconsistent identity store at {}: {reason}",
                        repository.describe()
                    );
                    IdentitySnapshot::empty()
                }
            },
            Ok(None) => {
                log::info!("No identity store at {}, starting empty", repository.describe());
                IdentitySnapshot::empty()
            }
            Err(e) => {
                log::warn!("Ignoring unreadable identity store: {e}");
                IdentitySnapshot::empty()
            }
        };

        let mut store = Self::in_memory(config);
        store.restore(snapshot);
        store.repository = Some(repository);
        log::info!("Loaded {} identities", store.len());
        store
    }

    fn restore(&mut self, snapshot: IdentitySnapshot) {
        let max_sequence = snapshot.ids.iter().map(PersonId::sequence).max().unwrap_or(0);
        self.next_sequence = max_sequence
            .checked_add(1)
            .map(|n| n.max(snapshot.next_sequence).max(1));
        let cap = self.config.max_samples.max(1);
        self.ids = snapshot.ids;
        self.samples = snapshot
            .samples
            .into_iter()
            .map(|s| {
                let mut deque: VecDeque<Embedding> = s.into();
                while deque.len() > cap {
                    deque.pop_front();
                }
                deque
            })
            .collect();
    }

    pub fn snapshot(&self) -> IdentitySnapshot {
        IdentitySnapshot {
            version: SNAPSHOT_VERSION,
            next_sequence: self.next_sequence.unwrap_or(u32::MAX),
            ids: self.ids.clone(),
            samples: self
                .samples
                .iter()
                .map(|s| s.iter().cloned().collect())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn identities(&self) -> &[PersonId] {
        &self.ids
    }

    pub fn index_of(&self, person_id: &PersonId) -> Option<usize> {
        self.ids.iter().position(|id| id == person_id)
    }

    pub fn sample_count(&self, index: usize) -> Option<usize> {
        self.samples.get(index).map(VecDeque::len)
    }

    pub fn samples(&self, index: usize) -> Option<impl Iterator<Item = &Embedding>> {
        self.samples.get(index).map(|s| s.iter())
    }

    /// Identity with the smallest per-identity minimum sample distance.
    /// Exact ties keep the lowest index.
    pub fn nearest(&self, embedding: &Embedding) -> Option<MatchCandidate> {
        let mut best: Option<(usize, f64)> = None;
        for (index, samples) in self.samples.iter().enumerate() {
            let d = samples
                .iter()
                .map(|s| embedding.distance(s))
                .fold(f64::INFINITY, f64::min);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((index, d));
            }
        }
        best.map(|(index, distance)| MatchCandidate {
            index,
            person_id: self.ids[index],
            distance,
        })
    }

    /// Matching identity strictly closer than the configured threshold.
    pub fn match_embedding(&self, embedding: &Embedding) -> Option<PersonId> {
        self.nearest(embedding)
            .filter(|c| c.distance < self.config.match_threshold)
            .map(|c| c.person_id)
    }

    /// Appends to the matching identity, or mints a new one.
    ///
    /// With autosave on, a failed write is returned after the in-memory
    /// change has been applied.
    pub fn enroll_or_update(&mut self, embedding: Embedding) -> Result<PersonId, StoreError> {
        if let Some(candidate) = self.nearest(&embedding) {
            if candidate.distance < self.config.match_threshold {
                log::debug!(
                    "Matched {} at distance {:.4}",
                    candidate.person_id,
                    candidate.distance
                );
                self.update_samples(candidate.index, embedding)?;
                return Ok(candidate.person_id);
            }
        }

        let sequence = self.next_sequence.ok_or(StoreError::SequenceExhausted)?;
        let person_id = PersonId::from_sequence(sequence);
        self.next_sequence = sequence.checked_add(1);
        self.ids.push(person_id);
        self.samples.push(VecDeque::from([embedding]));
        log::info!("Enrolled new identity {person_id}");
        self.autosave()?;
        Ok(person_id)
    }

    /// Adds a confirmed sample to a known identity, evicting the oldest
    /// beyond `max_samples`.
    pub fn update_samples(&mut self, index: usize, embedding: Embedding) -> Result<(), StoreError> {
        let len = self.samples.len();
        let samples = self
            .samples
            .get_mut(index)
            .ok_or(StoreError::UnknownIdentity { index, len })?;
        samples.push_back(embedding);
        while samples.len() > self.config.max_samples.max(1) {
            samples.pop_front();
        }
        self.autosave()
    }

    /// Writes the full table through the repository. No-op in memory.
    pub fn save(&self) -> Result<(), StoreError> {
        let Some(repository) = &self.repository else {
            return Ok(());
        };
        repository.save(&self.snapshot())?;
        log::debug!("Saved {} identities to {}", self.len(), repository.describe());
        Ok(())
    }

    fn autosave(&self) -> Result<(), StoreError> {
        if self.config.autosave {
            self.save()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::constants::EMBEDDING_DIM;
    use approx::assert_relative_eq;
    use std::sync::{Arc, Mutex};

    /// Repository double recording every save.
    #[derive(Clone, Default)]
    struct MemoryRepository {
        stored: Arc<Mutex<Option<IdentitySnapshot>>>,
        saves: Arc<Mutex<usize>>,
        fail_load: bool,
    }

    impl IdentityRepository for MemoryRepository {
        fn load(&self) -> Result<Option<IdentitySnapshot>, StoreError> {
            if self.fail_load {
                return Err(StoreError::Corrupt {
                    path: "memory".into(),
                    reason: "test".into(),
                });
            }
            Ok(self.stored.lock().unwrap().clone())
        }

        fn save(&self, snapshot: &IdentitySnapshot) -> Result<(), StoreError> {
            *self.stored.lock().unwrap() = Some(snapshot.clone());
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }

        fn describe(&self) -> String {
            "memory".into()
        }
    }

    fn embedding(value: f32) -> Embedding {
        Embedding::new(vec![value; EMBEDDING_DIM]).unwrap()
    }

    /// Distance between `embedding(a)` and `embedding(b)` is |a-b|·√128.
    fn offset_for(distance: f64) -> f32 {
        (distance / (EMBEDDING_DIM as f64).sqrt()) as f32
    }

    fn store() -> IdentityStore {
        IdentityStore::in_memory(StoreConfig::default())
    }

    #[test]
    fn test_empty_store_matches_nothing() {
        let store = store();
        assert!(store.match_embedding(&embedding(0.3)).is_none());
        assert!(store.nearest(&embedding(0.3)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_first_enrollment_mints_person_0001() {
        let mut store = store();
        let id = store.enroll_or_update(embedding(0.3)).unwrap();
        assert_eq!(id.to_string(), "person_0001");
        assert_eq!(store.len(), 1);
        assert_eq!(store.sample_count(0), Some(1));
    }

    #[test]
    fn test_same_embedding_returns_same_id() {
        let mut store = store();
        let first = store.enroll_or_update(embedding(0.3)).unwrap();
        assert_eq!(store.match_embedding(&embedding(0.3)), Some(first));
        assert_eq!(store.enroll_or_update(embedding(0.3)).unwrap(), first);
        assert_eq!(store.len(), 1);
        assert_eq!(store.sample_count(0), Some(2));
    }

    #[test]
    fn test_small_perturbation_joins_identity() {
        let mut store = store();
        let first = store.enroll_or_update(embedding(0.3)).unwrap();
        let second = store
            .enroll_or_update(embedding(0.3 + offset_for(0.3)))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_large_perturbation_creates_new_identity() {
        let mut store = store();
        let first = store.enroll_or_update(embedding(0.3)).unwrap();
        let second = store
            .enroll_or_update(embedding(0.3 + offset_for(1.0)))
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(second.to_string(), "person_0002");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut store = IdentityStore::in_memory(StoreConfig {
            match_threshold: 1.0,
            ..StoreConfig::default()
        });
        store.enroll_or_update(embedding(0.0)).unwrap();
        // 0.125 · √128 ≈ 1.414, outside; 0.08 · √128 ≈ 0.905, inside
        assert!(store.match_embedding(&embedding(0.125)).is_none());
        assert!(store.match_embedding(&embedding(0.08)).is_some());
    }

    #[test]
    fn test_closest_identity_wins() {
        let mut store = IdentityStore::in_memory(StoreConfig {
            match_threshold: 5.0,
            ..StoreConfig::default()
        });
        let a = store.enroll_or_update(embedding(0.0)).unwrap();
        // force a second identity despite the wide threshold
        store.config.match_threshold = 0.1;
        let b = store.enroll_or_update(embedding(0.5)).unwrap();
        store.config.match_threshold = 5.0;

        assert_eq!(store.match_embedding(&embedding(0.1)), Some(a));
        assert_eq!(store.match_embedding(&embedding(0.4)), Some(b));
    }

    #[test]
    fn test_exact_tie_goes_to_lowest_index() {
        let mut store = IdentityStore::in_memory(StoreConfig {
            match_threshold: 0.1,
            ..StoreConfig::default()
        });
        let a = store.enroll_or_update(embedding(0.0)).unwrap();
        let _b = store.enroll_or_update(embedding(0.2)).unwrap();
        store.config.match_threshold = 5.0;
        let candidate = store.nearest(&embedding(0.1)).unwrap();
        assert_eq!(candidate.index, 0);
        assert_eq!(candidate.person_id, a);
    }

    #[test]
    fn test_minimum_over_samples_is_used() {
        let mut store = store();
        store.enroll_or_update(embedding(0.0)).unwrap();
        store.update_samples(0, embedding(0.9)).unwrap();
        let candidate = store.nearest(&embedding(0.9)).unwrap();
        assert_relative_eq!(candidate.distance, 0.0);
    }

    #[test]
    fn test_sample_cap_evicts_oldest_first() {
        let mut store = store();
        store.enroll_or_update(embedding(0.0)).unwrap();
        for i in 1..=20 {
            store.update_samples(0, embedding(i as f32 * 0.001)).unwrap();
        }
        assert_eq!(store.sample_count(0), Some(15));
        let oldest = store.samples(0).unwrap().next().unwrap();
        assert_relative_eq!(oldest.as_slice()[0], 0.006, epsilon = 1e-7);
    }

    #[test]
    fn test_repeated_enrollment_caps_samples() {
        let mut store = store();
        for _ in 0..20 {
            store.enroll_or_update(embedding(0.3)).unwrap();
        }
        assert_eq!(store.len(), 1);
        assert_eq!(store.sample_count(0), Some(15));
    }

    #[test]
    fn test_update_unknown_index_fails() {
        let mut store = store();
        let err = store.update_samples(3, embedding(0.1)).unwrap_err();
        assert!(matches!(err, StoreError::UnknownIdentity { index: 3, len: 0 }));
    }

    #[test]
    fn test_autosave_writes_each_mutation() {
        let repo = MemoryRepository::default();
        let mut store = IdentityStore::load(Box::new(repo.clone()), StoreConfig::default());
        store.enroll_or_update(embedding(0.3)).unwrap();
        store.enroll_or_update(embedding(0.3)).unwrap();
        assert_eq!(*repo.saves.lock().unwrap(), 2);
        let saved = repo.stored.lock().unwrap().clone().unwrap();
        assert_eq!(saved.samples[0].len(), 2);
    }

    #[test]
    fn test_autosave_off_defers_to_explicit_save() {
        let repo = MemoryRepository::default();
        let config = StoreConfig {
            autosave: false,
            ..StoreConfig::default()
        };
        let mut store = IdentityStore::load(Box::new(repo.clone()), config);
        store.enroll_or_update(embedding(0.3)).unwrap();
        assert_eq!(*repo.saves.lock().unwrap(), 0);
        store.save().unwrap();
        assert_eq!(*repo.saves.lock().unwrap(), 1);
    }

    #[test]
    fn test_reload_restores_identities_and_sequence() {
        let repo = MemoryRepository::default();
        let mut store = IdentityStore::load(Box::new(repo.clone()), StoreConfig::default());
        store.enroll_or_update(embedding(0.0)).unwrap();
        store.enroll_or_update(embedding(0.5)).unwrap();
        store.enroll_or_update(embedding(0.5)).unwrap();

        let mut reloaded = IdentityStore::load(Box::new(repo), StoreConfig::default());
        assert_eq!(reloaded.identities(), store.identities());
        assert_eq!(reloaded.sample_count(1), Some(2));
        let next = reloaded.enroll_or_update(embedding(0.9)).unwrap();
        assert_eq!(next.to_string(), "person_0003");
    }

    #[test]
    fn test_sequence_never_reuses_ids_below_max() {
        let repo = MemoryRepository::default();
        *repo.stored.lock().unwrap() = Some(IdentitySnapshot {
            version: SNAPSHOT_VERSION,
            next_sequence: 1,
            ids: vec![PersonId::from_sequence(7)],
            samples: vec![vec![embedding(0.0)]],
        });
        let mut store = IdentityStore::load(Box::new(repo), StoreConfig::default());
        let id = store.enroll_or_update(embedding(0.9)).unwrap();
        assert_eq!(id.sequence(), 8);
    }

    #[test]
    fn test_exhausted_sequence_refuses_new_identity() {
        let repo = MemoryRepository::default();
        *repo.stored.lock().unwrap() = Some(IdentitySnapshot {
            version: SNAPSHOT_VERSION,
            next_sequence: 1,
            ids: vec![PersonId::from_sequence(u32::MAX)],
            samples: vec![vec![embedding(0.0)]],
        });
        let mut store = IdentityStore::load(Box::new(repo.clone()), StoreConfig::default());

        let err = store.enroll_or_update(embedding(0.9)).unwrap_err();
        assert!(matches!(err, StoreError::SequenceExhausted));
        assert_eq!(store.len(), 1);
        // matching an existing identity still works
        assert_eq!(
            store.enroll_or_update(embedding(0.0)).unwrap(),
            PersonId::from_sequence(u32::MAX)
        );

        let reloaded = IdentityStore::load(Box::new(repo), StoreConfig::default());
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.sample_count(0), Some(2));
    }

    #[test]
    fn test_last_sequence_is_issued_exactly_once() {
        let repo = MemoryRepository::default();
        *repo.stored.lock().unwrap() = Some(IdentitySnapshot {
            version: SNAPSHOT_VERSION,
            next_sequence: u32::MAX,
            ids: vec![PersonId::from_sequence(1)],
            samples: vec![vec![embedding(0.0)]],
        });
        let mut store = IdentityStore::load(Box::new(repo.clone()), StoreConfig::default());

        let last = store.enroll_or_update(embedding(0.5)).unwrap();
        assert_eq!(last.sequence(), u32::MAX);
        assert!(matches!(
            store.enroll_or_update(embedding(0.9)),
            Err(StoreError::SequenceExhausted)
        ));

        let mut reloaded = IdentityStore::load(Box::new(repo), StoreConfig::default());
        assert_eq!(reloaded.identities(), store.identities());
        assert!(reloaded.enroll_or_update(embedding(0.9)).is_err());
    }

    #[test]
    fn test_failed_load_starts_empty_and_still_enrolls() {
        let repo = MemoryRepository {
            fail_load: true,
            ..MemoryRepository::default()
        };
        let mut store = IdentityStore::load(Box::new(repo), StoreConfig::default());
        assert!(store.is_empty());
        assert_eq!(
            store.enroll_or_update(embedding(0.1)).unwrap().to_string(),
            "person_0001"
        );
    }

    #[test]
    fn test_restore_trims_to_configured_cap() {
        let repo = MemoryRepository::default();
        *repo.stored.lock().unwrap() = Some(IdentitySnapshot {
            version: SNAPSHOT_VERSION,
            next_sequence: 2,
            ids: vec![PersonId::from_sequence(1)],
            samples: vec![(0..10).map(|i| embedding(i as f32 * 0.01)).collect()],
        });
        let config = StoreConfig {
            max_samples: 4,
            ..StoreConfig::default()
        };
        let store = IdentityStore::load(Box::new(repo), config);
        assert_eq!(store.sample_count(0), Some(4));
    }
}
