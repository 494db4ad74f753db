use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{PERSON_ID_PREFIX, PERSON_ID_WIDTH};

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid person id {0:?}, expected person_<number>")]
pub struct PersonIdError(pub String);

/// Stable identity key, rendered as `person_0001`, `person_0002`, ...
///
/// Sequence numbers start at 1 and are never reused within a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PersonId(u32);

impl PersonId {
    pub fn from_sequence(sequence: u32) -> Self {
        Self(sequence)
    }

    pub fn sequence(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PERSON_ID_PREFIX}{:0width$}", self.0, width = PERSON_ID_WIDTH)
    }
}

impl FromStr for PersonId {
    type Err = PersonIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix(PERSON_ID_PREFIX)
            .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| PersonIdError(s.to_string()))?;
        digits
            .parse()
            .map(Self)
            .map_err(|_| PersonIdError(s.to_string()))
    }
}

impl TryFrom<String> for PersonId {
    type Error = PersonIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PersonId> for String {
    fn from(id: PersonId) -> Self {
        id.to_string()
    }
}
