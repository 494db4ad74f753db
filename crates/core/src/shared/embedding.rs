use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::EMBEDDING_DIM;

#[derive(Error, Debug, PartialEq)]
pub enum EmbeddingError {
    #[error("embedding must have {expected} values, got {actual}")]
    Dimension { expected: usize, actual: usize },
    #[error("embedding contains a non-finite value at position {0}")]
    NonFinite(usize),
}

/// Fixed-length face descriptor. Construction guarantees
/// [`EMBEDDING_DIM`] finite values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Result<Self, EmbeddingError> {
        if values.len() != EMBEDDING_DIM {
            return Err(EmbeddingError::Dimension {
                expected: EMBEDDING_DIM,
                actual: values.len(),
            });
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(EmbeddingError::NonFinite(pos));
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Euclidean distance, accumulated in f64.
    pub fn distance(&self, other: &Embedding) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| {
                let d = *a as f64 - *b as f64;
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }

    pub fn norm(&self) -> f64 {
        self.0
            .iter()
            .map(|v| (*v as f64) * (*v as f64))
            .sum::<f64>()
            .sqrt()
    }

    /// Unit-length copy; a zero vector is returned unchanged.
    pub fn normalized(&self) -> Embedding {
        let mut values = self.0.clone();
        l2_normalize(&mut values);
        Embedding(values)
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = EmbeddingError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Embedding::new(values)
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(e: Embedding) -> Self {
        e.0
    }
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn constant(value: f32) -> Embedding {
        Embedding::new(vec![value; EMBEDDING_DIM]).unwrap()
    }

    #[test]
    fn test_rejects_wrong_dimension() {
        let err = Embedding::new(vec![0.0; 3]).unwrap_err();
        assert_eq!(
            err,
            EmbeddingError::Dimension {
                expected: EMBEDDING_DIM,
                actual: 3
            }
        );
    }

    #[test]
    fn test_rejects_nan() {
        let mut values = vec![0.0; EMBEDDING_DIM];
        values[7] = f32::NAN;
        assert_eq!(Embedding::new(values).unwrap_err(), EmbeddingError::NonFinite(7));
    }

    #[test]
    fn test_distance_between_constants() {
        // sqrt(128 * 0.5^2)
        let d = constant(0.0).distance(&constant(0.5));
        assert_relative_eq!(d, (EMBEDDING_DIM as f64 * 0.25).sqrt(), epsilon = 1e-9);
        assert_relative_eq!(constant(0.3).distance(&constant(0.3)), 0.0);
    }

    #[test]
    fn test_normalized_has_unit_norm() {
        assert_relative_eq!(constant(2.0).normalized().norm(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(constant(0.0).normalized().norm(), 0.0);
    }

    #[test]
    fn test_l2_normalize_small_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert_relative_eq!(v[0], 0.6, epsilon = 1e-6);
        assert_relative_eq!(v[1], 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_serde_enforces_dimension() {
        let json = serde_json::to_string(&constant(0.25)).unwrap();
        let back: Embedding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, constant(0.25));
        assert!(serde_json::from_str::<Embedding>("[1.0, 2.0]").is_err());
    }
}
