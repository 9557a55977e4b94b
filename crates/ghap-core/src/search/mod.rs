//! Searcher (§4.F): query embedding + axis-scoped kNN + payload filters +
//! result shaping into plain-data `ExperienceResult` records.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::embedding::EmbeddingService;
use crate::enums::{self, axis_collection_name};
use crate::error::Error;
use crate::vector::{Filter, VectorStore};

pub const MIN_LIMIT: usize = 1;
pub const MAX_LIMIT: usize = 50;

/// A search hit, spelled out as plain data (§3/§9): never a nested
/// language-specific object graph, so it survives the dispatcher boundary
/// untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperienceResult {
    pub id: String,
    pub score: f32,
    pub domain: Option<String>,
    pub confidence_tier: Option<String>,
    pub payload: Json,
}

pub struct Searcher {
    pub(crate) vectors: Arc<dyn VectorStore>,
    pub(crate) embeddings: Arc<dyn EmbeddingService>,
}

fn validate_limit(limit: usize) -> Result<(), Error> {
    if (MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "limit must be in [{MIN_LIMIT}, {MAX_LIMIT}], got {limit}"
        )))
    }
}

impl Searcher {
    pub fn new(vectors: Arc<dyn VectorStore>, embeddings: Arc<dyn EmbeddingService>) -> Self {
        Self { vectors, embeddings }
    }

    fn search_collection(
        &self,
        collection: &str,
        query_text: &str,
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ExperienceResult>, Error> {
        validate_limit(limit)?;
        self.vectors.create_collection(collection, self.embeddings.dim())?;
        let query = self.embeddings.embed(query_text)?;
        let hits = self.vectors.search(collection, &query, limit, filter)?;
        Ok(hits
            .into_iter()
            .map(|h| ExperienceResult {
                domain: h.payload.get("domain").and_then(|v| v.as_str()).map(str::to_string),
                confidence_tier: h
                    .payload
                    .get("confidence_tier")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                id: h.id,
                score: h.score,
                payload: h.payload,
            })
            .collect())
    }

    /// `search_experiences(query_text, axis, domain?, outcome?, limit)`: the
    /// `domain` filter applies only on the `full` axis, which is the only
    /// axis collection that carries it in its payload.
    pub fn search_experiences(
        &self,
        query_text: &str,
        axis: &str,
        domain: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ExperienceResult>, Error> {
        enums::validate_axis(axis)?;
        let collection = axis_collection_name(axis).expect("validated axis has a collection name");
        let filter = if axis == "full" {
            domain.map(|d| Filter::new().eq("domain", serde_json::json!(d)))
        } else {
            None
        };
        self.search_collection(collection, query_text, limit, filter.as_ref())
    }

    pub fn search_memories(&self, query_text: &str, limit: usize) -> Result<Vec<ExperienceResult>, Error> {
        self.search_collection("memories", query_text, limit, None)
    }

    pub fn search_values(&self, query_text: &str, limit: usize) -> Result<Vec<ExperienceResult>, Error> {
        self.search_collection("values", query_text, limit, None)
    }

    pub fn search_code(&self, query_text: &str, limit: usize) -> Result<Vec<ExperienceResult>, Error> {
        self.search_collection("code", query_text, limit, None)
    }

    pub fn search_commits(&self, query_text: &str, limit: usize) -> Result<Vec<ExperienceResult>, Error> {
        self.search_collection("commits", query_text, limit, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::mock::MockEmbeddingService;
    use crate::vector::memory::InMemoryVectorStore;

    fn searcher() -> Searcher {
        Searcher::new(Arc::new(InMemoryVectorStore::new()), Arc::new(MockEmbeddingService::new(16)))
    }

    #[test]
    fn cold_start_search_on_unseeded_axis_returns_empty_not_an_error() {
        let s = searcher();
        let results = s.search_experiences("anything", "full", None, 10).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn limit_out_of_range_is_rejected() {
        let s = searcher();
        assert!(s.search_experiences("q", "full", None, 0).is_err());
        assert!(s.search_experiences("q", "full", None, 51).is_err());
    }

    #[test]
    fn domain_filter_only_applies_to_full_axis() {
        let s = searcher();
        s.vectors.create_collection("ghap_strategy", 16).unwrap();
        let v = s.embeddings.embed("anything").unwrap();
        s.vectors
            .upsert("ghap_strategy", "x", v, serde_json::json!({"domain": "feature"}))
            .unwrap();
        // The strategy axis does not carry a domain filter, so this still returns the point.
        let results = s.search_experiences("anything", "strategy", Some("debugging"), 5).unwrap();
        assert_eq!(results.len(), 1);
    }
}
