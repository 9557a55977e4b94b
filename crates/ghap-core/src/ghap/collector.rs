//! The Observation Collector itself: `start`, `update`, `resolve`,
//! get-active, and list-entries over GHAP records (§4.D).
//!
//! Resolution is deliberately two-phased per §5's ordering guarantee:
//! metadata is written first and is authoritative; axis-vector upserts
//! follow and are treated as a derived index that `reindex_from_metadata`
//! (see [`crate::reindex`]) can always rebuild. A crash between the two
//! steps leaves the entry resolved in metadata and simply not yet
//! re-indexed — never the other way around.

use std::sync::Arc;

use serde_json::json;

use crate::embedding::EmbeddingService;
use crate::enums::{self, axis_collection_name};
use crate::error::Error;
use crate::metadata::{GhapEntry, Lesson, MetadataStore, RootCause};
use crate::vector::VectorStore;

pub struct ObservationCollector {
    metadata: MetadataStore,
    pub(crate) vectors: Arc<dyn VectorStore>,
    embeddings: Arc<dyn EmbeddingService>,
}

fn non_empty(field: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        Err(Error::Validation(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

impl ObservationCollector {
    pub fn new(metadata: MetadataStore, vectors: Arc<dyn VectorStore>, embeddings: Arc<dyn EmbeddingService>) -> Self {
        Self {
            metadata,
            vectors,
            embeddings,
        }
    }

    /// Ensures the four axis collections exist, per the cold-start policy
    /// in §4.B: callers create collections lazily before first use so a
    /// fresh install never fails with a missing-collection error.
    fn ensure_axis_collections(&self) -> Result<(), Error> {
        for axis in enums::AXES {
            let name = axis_collection_name(axis).expect("axis name is one of enums::AXES");
            self.vectors.create_collection(name, self.embeddings.dim())?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &self,
        domain: &str,
        strategy: &str,
        goal: &str,
        hypothesis: &str,
        action: &str,
        prediction: &str,
    ) -> Result<String, Error> {
        enums::validate_domain(domain)?;
        enums::validate_strategy(strategy)?;
        non_empty("goal", goal)?;
        non_empty("hypothesis", hypothesis)?;
        non_empty("action", action)?;
        non_empty("prediction", prediction)?;
        self.metadata
            .insert_active_ghap(domain, strategy, goal, hypothesis, action, prediction)
    }

    pub fn update(&self, hypothesis: Option<&str>, prediction: Option<&str>) -> Result<i64, Error> {
        if let Some(h) = hypothesis {
            non_empty("hypothesis", h)?;
        }
        if let Some(p) = prediction {
            non_empty("prediction", p)?;
        }
        self.metadata.update_active_ghap(hypothesis, prediction)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn resolve(
        &self,
        status: &str,
        outcome_result: &str,
        surprise: Option<&str>,
        root_cause: Option<RootCause>,
        lesson: Option<Lesson>,
        confidence_tier: &str,
    ) -> Result<String, Error> {
        enums::validate_outcome_status(status)?;
        enums::validate_confidence_tier(confidence_tier)?;
        non_empty("outcome_result", outcome_result)?;
        if status == "falsified" && root_cause.is_none() {
            return Err(Error::Validation(
                "root_cause is required when status is 'falsified'".to_string(),
            ));
        }
        if let Some(rc) = &root_cause {
            enums::validate_root_cause_category(&rc.category)?;
        }

        // (1) metadata write, authoritative.
        let id = self.metadata.resolve_active_ghap(
            status,
            outcome_result,
            surprise,
            root_cause.as_ref(),
            lesson.as_ref(),
            confidence_tier,
        )?;

        // (2)-(3) embed + upsert axis vectors; a crash here still leaves a
        // resolved, re-indexable entry in metadata.
        let entry = self
            .metadata
            .get_ghap(&id)?
            .ok_or_else(|| Error::Internal("resolved entry vanished".to_string()))?;
        self.ensure_axis_collections()?;
        self.upsert_axis_vectors(&entry)?;

        Ok(id)
    }

    fn upsert_axis_vectors(&self, entry: &GhapEntry) -> Result<(), Error> {
        let payload = json!({
            "id": entry.id,
            "domain": entry.domain,
            "confidence_tier": entry.confidence_tier,
        });

        let full_text = canonical_full_text(entry);
        let full_vector = self.embeddings.embed(&full_text)?;
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

    pub fn get_active(&self) -> Result<Option<GhapEntry>, Error> {
        self.metadata.get_active_ghap()
    }

    pub fn list_entries(&self, limit: usize, offset: usize) -> Result<Vec<GhapEntry>, Error> {
        self.metadata.list_ghap_entries(limit, offset)
    }
}

/// A canonical serialization of the whole record, embedded into the `full`
/// axis collection.
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
