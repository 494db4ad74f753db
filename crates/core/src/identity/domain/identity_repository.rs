use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::embedding::Embedding;

use super::person_id::PersonId;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read identity store {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("identity store {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("failed to write identity store {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize identity store: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no identity at index {index} (store has {len})")]
    UnknownIdentity { index: usize, len: usize },
    #[error("person id sequence exhausted; no new identity can be enrolled")]
    SequenceExhausted,
    #[error("identity store lock poisoned")]
    Poisoned,
}

/// Persisted form of the identity table: two index-aligned lists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub version: u32,
    pub next_sequence: u32,
    pub ids: Vec<PersonId>,
    pub samples: Vec<Vec<Embedding>>,
}

impl IdentitySnapshot {
    pub fn empty() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            next_sequence: 1,
            ids: Vec::new(),
            samples: Vec::new(),
        }
    }

    /// Checks the structural invariants; the message names the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if self.version != SNAPSHOT_VERSION {
            return Err(format!("unsupported version {}", self.version));
        }
        if self.ids.len() != self.samples.len() {
            return Err(format!(
                "{} ids but {} sample lists",
                self.ids.len(),
                self.samples.len()
            ));
        }
        if let Some(pos) = self.samples.iter().position(|s| s.is_empty()) {
            return Err(format!("{} has no samples", self.ids[pos]));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.ids.iter().find(|id| !seen.insert(**id)) {
            return Err(format!("duplicate id {dup}"));
        }
        Ok(())
    }
}

/// Durable home of an [`IdentitySnapshot`].
pub trait IdentityRepository: Send {
    /// `Ok(None)` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<IdentitySnapshot>, StoreError>;

    fn save(&self, snapshot: &IdentitySnapshot) -> Result<(), StoreError>;

    /// Human-readable location for log messages.
    fn describe(&self) -> String;
}
