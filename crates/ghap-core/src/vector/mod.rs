//! Vector Store (§4.B): named collections of `(id, fixed-dim vector, JSON
//! payload)` with cosine kNN search, filtered scan, and exact count.
//!
//! Two implementations share this trait and, critically, the same filter
//! semantics: [`sqlite::SqliteVectorStore`] for production, and
//! [`memory::InMemoryVectorStore`] for tests. §9 calls out a prior defect
//! where the in-memory test double only supported strict-equality filters
//! while the real store supported ranges — that gap is the reason both
//! implementations run through [`Filter::matches`] below.

pub mod memory;
pub mod sqlite;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::Error;

/// A stored point: its id, the L2-unit-norm embedding, and an arbitrary JSON
/// payload (e.g. `{"domain": "...", "confidence_tier": "..."}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Json,
}

/// One hit from `search`: the point id, its cosine similarity to the query,
/// and its payload. Deliberately flat (no nested vector) per spec §4.F/§9's
/// "plain data, never nested language-specific object graphs" rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub payload: Json,
}

/// A condition over a single payload field. `Eq` composes with itself and
/// with `In`/range conditions across *different* fields as AND (§4.B).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    Eq(Json),
    In(Vec<Json>),
    Range {
        gte: Option<f64>,
        gt: Option<f64>,
        lte: Option<f64>,
        lt: Option<f64>,
    },
}

/// A conjunction of per-field conditions: `{field: literal}`,
/// `{field: {$in: [...]}}`, or `{field: {$gte|$gt|$lte|$lt: number}}`.
/// Multiple fields compose as AND; multiple operators on one field combine
/// into a single range condition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    fields: Vec<(String, FieldFilter)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Json>) -> Self {
        self.fields.push((field.into(), FieldFilter::Eq(value.into())));
        self
    }

    pub fn in_values(mut self, field: impl Into<String>, values: Vec<Json>) -> Self {
        self.fields.push((field.into(), FieldFilter::In(values)));
        self
    }

    pub fn range(
        mut self,
        field: impl Into<String>,
        gte: Option<f64>,
        gt: Option<f64>,
        lte: Option<f64>,
        lt: Option<f64>,
    ) -> Self {
        self.fields
            .push((field.into(), FieldFilter::Range { gte, gt, lte, lt }));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Evaluates the whole conjunction against a payload object.
    pub fn matches(&self, payload: &Json) -> bool {
        self.fields
            .iter()
            .all(|(field, cond)| Self::field_matches(payload, field, cond))
    }

    fn field_matches(payload: &Json, field: &str, cond: &FieldFilter) -> bool {
        let Some(actual) = payload.get(field) else {
            return false;
        };
        match cond {
            FieldFilter::Eq(expected) => actual == expected,
            FieldFilter::In(values) => values.iter().any(|v| v == actual),
            FieldFilter::Range { gte, gt, lte, lt } => {
                let Some(n) = actual.as_f64() else {
                    return false;
                };
                gte.map_or(true, |b| n >= b)
                    && gt.map_or(true, |b| n > b)
                    && lte.map_or(true, |b| n <= b)
                    && lt.map_or(true, |b| n < b)
            }
        }
    }
}

/// A page of `scroll` results plus the offset to continue from, or `None`
/// when the scan is exhausted.
pub struct ScrollPage {
    pub points: Vec<Point>,
    pub next_offset: Option<usize>,
}

pub trait VectorStore: Send + Sync {
    /// Idempotent-on-existence: calling this again for an already-created
    /// collection must not erase its contents.
    fn create_collection(&self, name: &str, dim: usize) -> Result<(), Error>;

    fn delete_collection(&self, name: &str) -> Result<(), Error>;

    fn upsert(&self, collection: &str, id: &str, vector: Vec<f32>, payload: Json) -> Result<(), Error>;

    fn get(&self, collection: &str, id: &str) -> Result<Option<Point>, Error>;

    fn delete(&self, collection: &str, id: &str) -> Result<(), Error>;

    fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchResult>, Error>;

    fn scroll(
        &self,
        collection: &str,
        limit: usize,
        offset: usize,
        with_vectors: bool,
        filter: Option<&Filter>,
    ) -> Result<ScrollPage, Error>;

    fn count(&self, collection: &str, filter: Option<&Filter>) -> Result<usize, Error>;
}

/// Repeatedly scrolls a collection and deletes every returned id, per spec
/// §8 property 10 and §9's "scroll pagination" note: bulk deletes must loop
/// until the store returns fewer than the page size, never rely on one page.
pub fn delete_all_matching(
    store: &dyn VectorStore,
    collection: &str,
    filter: Option<&Filter>,
) -> Result<usize, Error> {
    const PAGE_SIZE: usize = 256;
    let mut deleted = 0usize;
    loop {
        let page = store.scroll(collection, PAGE_SIZE, 0, false, filter)?;
        if page.points.is_empty() {
            break;
        }
        for point in &page.points {
            store.delete(collection, &point.id)?;
            deleted += 1;
        }
        if page.points.len() < PAGE_SIZE {
            break;
        }
    }
    Ok(deleted)
}

/// Cosine similarity between two vectors. Callers that know their inputs
/// are already L2-unit-norm (true of everything this store ever persists,
/// per §3) may treat this as a plain dot product, but the full formula is
/// computed here so the function stays correct if that invariant is ever
/// violated by a caller.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
