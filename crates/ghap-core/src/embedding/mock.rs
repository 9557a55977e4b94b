//! Deterministic mock embedding, grounded in
//! `learning_memory_server/embedding/mock.py`: hash the text with SHA-256,
//! use the digest to seed a PRNG, draw `dim` samples from a standard normal
//! distribution, then L2-normalize. Same text always yields the same
//! vector; different text yields (with overwhelming probability) a
//! different one, which is all the test fixtures downstream need.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use sha2::{Digest, Sha256};

use crate::error::Error;

use super::{l2_normalize, EmbeddingService};

pub struct MockEmbeddingService {
    dim: usize,
}

impl MockEmbeddingService {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Default for MockEmbeddingService {
    fn default() -> Self {
        Self::new(super::DEFAULT_EMBEDDING_DIM)
    }
}

impl EmbeddingService for MockEmbeddingService {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, Error> {
        let digest = Sha256::digest(text.as_bytes());
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        let mut rng = StdRng::from_seed(seed);
        let samples: Vec<f32> = (0..self.dim)
            .map(|_| StandardNormal.sample(&mut rng))
            .collect();
        Ok(l2_normalize(samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn embedding_is_deterministic_for_identical_input() {
        let svc = MockEmbeddingService::new(32);
        assert_eq!(svc.embed("hello world").unwrap(), svc.embed("hello world").unwrap());
    }

    #[test]
    fn embedding_differs_for_different_input() {
        let svc = MockEmbeddingService::new(32);
        assert_ne!(svc.embed("hello").unwrap(), svc.embed("goodbye").unwrap());
    }

    #[test]
    fn embedding_is_unit_norm_and_fixed_dimension() {
        let svc = MockEmbeddingService::new(768);
        let v = svc.embed("some observation").unwrap();
        assert_eq!(v.len(), 768);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn embed_batch_matches_individual_embed_calls() {
        let svc = MockEmbeddingService::new(16);
        let texts = vec!["a".to_string(), "b".to_string()];
        let batch = svc.embed_batch(&texts).unwrap();
        assert_eq!(batch[0], svc.embed("a").unwrap());
        assert_eq!(batch[1], svc.embed("b").unwrap());
    }

    proptest::proptest! {
        /// Unit norm and determinism must hold for arbitrary input, not just
        /// the handful of fixed strings above.
        #[test]
        fn embedding_is_always_unit_norm_and_deterministic(text in ".{0,200}") {
            let svc = MockEmbeddingService::new(32);
            let v = svc.embed(&text).unwrap();
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            prop_assert!((norm - 1.0).abs() < 1e-3);
            prop_assert_eq!(v, svc.embed(&text).unwrap());
        }
    }
}
