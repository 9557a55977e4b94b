//! Rebuilds the vector index from the metadata store (§5, §9): the vector
//! store is a derived artifact, metadata is authoritative, so any gap left
//! by a crash between a metadata write and its axis-vector upsert (or by a
//! vector-store wipe) is always recoverable by replaying every resolved
//! GHAP entry's axis embeddings.

use std::sync::Arc;

use serde_json::json;

use crate::embedding::EmbeddingService;
use crate::enums::{self, axis_collection_name};
use crate::error::Error;
use crate::metadata::{GhapEntry, MetadataStore};
use crate::vector::VectorStore;

pub struct Reindexer {
    metadata: MetadataStore,
    vectors: Arc<dyn VectorStore>,
    embeddings: Arc<dyn EmbeddingService>,
}

fn canonical_full_text(entry: &GhapEntry) -> String {
    format!(
        "domain={} strategy={} goal={} hypothesis={} action={} prediction={} outcome={}",
        entry.domain,
        entry.strategy,
        entry.goal,
        entry.hypothesis,
        entry.action,
        entry.prediction,
        entry.outcome_result.clone().unwrap_or_default(),
    )
}

impl Reindexer {
    pub fn new(metadata: MetadataStore, vectors: Arc<dyn VectorStore>, embeddings: Arc<dyn EmbeddingService>) -> Self {
        Self {
            metadata,
            vectors,
            embeddings,
        }
    }

    /// Re-embeds and re-upserts axis vectors for every resolved GHAP entry.
    /// Returns the number of entries replayed. Idempotent: upsert
    /// semantics mean replaying an already-indexed entry is a no-op change.
    pub fn reindex_from_metadata(&self) -> Result<usize, Error> {
        for axis in enums::AXES {
            let name = axis_collection_name(axis).expect("axis name is one of enums::AXES");
            self.vectors.create_collection(name, self.embeddings.dim())?;
        }

        let mut replayed = 0;
        let mut offset = 0;
        let page_size = 256;
        loop {
            let entries = self.metadata.list_ghap_entries(page_size, offset)?;
            if entries.is_empty() {
                break;
            }
            for entry in &entries {
                if entry.resolved_at.is_none() {
                    continue;
                }
                self.reindex_entry(entry)?;
                replayed += 1;
            }
            if entries.len() < page_size {
                break;
            }
            offset += page_size;
        }
        Ok(replayed)
    }

    fn reindex_entry(&self, entry: &GhapEntry) -> Result<(), Error> {
        let payload = json!({
            "id": entry.id,
            "domain": entry.domain,
            "confidence_tier": entry.confidence_tier,
        });

        let full_vector = self.embeddings.embed(&canonical_full_text(entry))?;
        self.vectors.upsert("ghap_full", &entry.id, full_vector, payload.clone())?;

        let strategy_vector = self.embeddings.embed(&entry.strategy)?;
        self.vectors
            .upsert("ghap_strategy", &entry.id, strategy_vector, payload.clone())?;

        if let Some(surprise) = &entry.surprise {
            let vector = self.embeddings.embed(surprise)?;
            self.vectors.upsert("ghap_surprise", &entry.id, vector, payload.clone())?;
        }

        if let Some(root_cause) = &entry.root_cause {
            let vector = self.embeddings.embed(&root_cause.description)?;
            self.vectors.upsert("ghap_root_cause", &entry.id, vector, payload)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::mock::MockEmbeddingService;
    use crate::vector::memory::InMemoryVectorStore;

    #[test]
    fn reindex_repopulates_vectors_after_a_simulated_wipe() {
        let metadata = MetadataStore::in_memory().unwrap();
        let vectors: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let embeddings: Arc<dyn EmbeddingService> = Arc::new(MockEmbeddingService::new(16));

        metadata
            .insert_active_ghap("debugging", "systematic-elimination", "g", "h", "a", "p")
            .unwrap();
        metadata
            .resolve_active_ghap("confirmed", "fixed", None, None, None, "gold")
            .unwrap();

        let reindexer = Reindexer::new(metadata.clone(), vectors.clone(), embeddings);
        let replayed = reindexer.reindex_from_metadata().unwrap();
        assert_eq!(replayed, 1);

        let entries = metadata.list_ghap_entries(10, 0).unwrap();
        let id = &entries[0].id;
        assert!(vectors.get("ghap_full", id).unwrap().is_some());
        assert!(vectors.get("ghap_strategy", id).unwrap().is_some());
    }

    #[test]
    fn reindex_skips_entries_that_are_not_yet_resolved() {
        let metadata = MetadataStore::in_memory().unwrap();
        let vectors: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let embeddings: Arc<dyn EmbeddingService> = Arc::new(MockEmbeddingService::new(16));
        metadata
            .insert_active_ghap("debugging", "systematic-elimination", "g", "h", "a", "p")
            .unwrap();

        let reindexer = Reindexer::new(metadata, vectors, embeddings);
        assert_eq!(reindexer.reindex_from_metadata().unwrap(), 0);
    }
}
