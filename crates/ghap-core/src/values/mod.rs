//! Value Store (§4.G): curated lesson text anchored to a cluster centroid,
//! admitted only when it is similar enough to the centroid it claims.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingService;
use crate::error::Error;
use crate::metadata::{MetadataStore, Value};
use crate::vector::VectorStore;

pub const ADMISSION_SIMILARITY_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub cluster_id: String,
    /// Omitted entirely (never serialized as `null`) when the centroid is
    /// unavailable, per §4.G.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

pub struct ValueStore {
    metadata: MetadataStore,
    vectors: Arc<dyn VectorStore>,
    embeddings: Arc<dyn EmbeddingService>,
}

impl ValueStore {
    pub fn new(metadata: MetadataStore, vectors: Arc<dyn VectorStore>, embeddings: Arc<dyn EmbeddingService>) -> Self {
        Self {
            metadata,
            vectors,
            embeddings,
        }
    }

    /// Looks up a cluster centroid by id. Clusters are transient (§3: "not
    /// specified here" beyond "rebuilt on demand"), so the centroid is
    /// stored in the `cluster_centroids` collection the clusterer/caller
    /// upserts into whenever it recomputes clusters; absence here simply
    /// means no cluster has been computed under that id yet.
    fn centroid_for(&self, cluster_id: &str) -> Result<Option<Vec<f32>>, Error> {
        self.vectors.create_collection("cluster_centroids", self.embeddings.dim())?;
        Ok(self.vectors.get("cluster_centroids", cluster_id)?.map(|p| p.vector))
    }

    pub fn validate(&self, text: &str, cluster_id: &str) -> Result<ValidationOutcome, Error> {
        let candidate = self.embeddings.embed(text)?;
        let centroid = self.centroid_for(cluster_id)?;
        match centroid {
            None => Ok(ValidationOutcome {
                valid: false,
                cluster_id: cluster_id.to_string(),
                similarity: None,
            }),
            Some(centroid) => {
                let similarity = crate::vector::cosine_similarity(&candidate, &centroid);
                Ok(ValidationOutcome {
                    valid: similarity >= ADMISSION_SIMILARITY_THRESHOLD,
                    cluster_id: cluster_id.to_string(),
                    similarity: Some(similarity),
                })
            }
        }
    }

    pub fn store(&self, text: &str, cluster_id: &str, axis: &str) -> Result<Value, Error> {
        crate::enums::validate_axis(axis)?;
        let outcome = self.validate(text, cluster_id)?;
        if !outcome.valid {
            return Err(Error::Validation(format!(
                "candidate text is not similar enough to cluster '{cluster_id}' to be admitted as a value"
            )));
        }
        let value = self.metadata.insert_value(text, axis, cluster_id)?;
        self.vectors.create_collection("values", self.embeddings.dim())?;
        let embedding = self.embeddings.embed(text)?;
        self.vectors.upsert(
            "values",
            &value.id,
            embedding,
            serde_json::json!({"text": text, "axis": axis, "cluster_id": cluster_id, "created_at": value.created_at}),
        )?;
        Ok(value)
    }

    pub fn list(&self) -> Result<Vec<Value>, Error> {
        self.metadata.list_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::mock::MockEmbeddingService;
    use crate::vector::memory::InMemoryVectorStore;

    fn store_with_centroid(text_for_centroid: &str) -> (ValueStore, Vec<f32>) {
        let vectors: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let embeddings: Arc<dyn EmbeddingService> = Arc::new(MockEmbeddingService::new(32));
        let centroid = embeddings.embed(text_for_centroid).unwrap();
        vectors.create_collection("cluster_centroids", 32).unwrap();
        vectors
            .upsert("cluster_centroids", "full_0", centroid.clone(), serde_json::json!({}))
            .unwrap();
        (ValueStore::new(MetadataStore::in_memory().unwrap(), vectors, embeddings), centroid)
    }

    #[test]
    fn validate_against_identical_text_is_valid_with_similarity_one() {
        let (store, _) = store_with_centroid("Always add logging when async tests hang");
        let outcome = store.validate("Always add logging when async tests hang", "full_0").unwrap();
        assert!(outcome.valid);
        assert!((outcome.similarity.unwrap() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn validate_against_missing_centroid_omits_similarity_field() {
        let (store, _) = store_with_centroid("whatever");
        let outcome = store.validate("some text", "full_999").unwrap();
        assert!(!outcome.valid);
        assert!(outcome.similarity.is_none());
        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json.get("similarity").is_none());
    }

    #[test]
    fn store_rejects_dissimilar_candidate_without_persisting() {
        let (store, _) = store_with_centroid("Always add logging when async tests hang");
        let err = store.store("completely unrelated text about pizza", "full_0", "full").unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn store_admits_and_persists_similar_candidate() {
        let (store, _) = store_with_centroid("Always add logging when async tests hang");
        let value = store
            .store("Always add logging when async tests hang", "full_0", "full")
            .unwrap();
        assert_eq!(value.text, "Always add logging when async tests hang");
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
