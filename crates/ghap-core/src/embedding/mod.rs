//! Embedding Service (§4.C): text → fixed-dim, L2-unit-norm, float-32
//! vector, deterministic for identical input.
//!
//! The service boundary matters more than any one implementation: spec §4.C
//! calls out fork safety explicitly — an embedding service wrapping an
//! accelerator runtime (GPU/Neural-Engine) must never be initialized in the
//! daemon's parent process before it daemonizes. `ghap-daemon` enforces that
//! by constructing its `EmbeddingService` only after the re-exec into the
//! foreground child (see that crate's process-control module); this trait
//! just keeps the call sites agnostic to which backend is live.

pub mod mock;

use crate::error::Error;

pub const DEFAULT_EMBEDDING_DIM: usize = 768;

pub trait EmbeddingService: Send + Sync {
    fn dim(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, Error>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

pub fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}
