//! In-memory `VectorStore`, used by tests in place of SQLite. Spec §9 names
//! a specific prior defect this must not repeat: an in-memory test double
//! that only supported equality filters, silently breaking any code path
//! exercised through it that relied on `$gte`/`$gt`/`$lte`/`$lt`/`$in`. This
//! implementation shares `Filter::matches` with [`super::sqlite`], so the
//! two stores cannot drift apart on filter semantics.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value as Json;

use crate::error::Error;

use super::{cosine_similarity, Filter, Point, ScrollPage, SearchResult, VectorStore};

struct Collection {
    #[allow(dead_code)]
    dim: usize,
    points: Vec<Point>,
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: Mutex<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn not_found(name: &str) -> Error {
        Error::CollectionNotFound(format!("collection '{name}' not found"))
    }
}

impl VectorStore for InMemoryVectorStore {
    fn create_collection(&self, name: &str, dim: usize) -> Result<(), Error> {
        let mut collections = self.collections.lock().map_err(|_| Error::Internal("poisoned lock".into()))?;
        collections.entry(name.to_string()).or_insert_with(|| Collection {
            dim,
            points: Vec::new(),
        });
        Ok(())
    }

    fn delete_collection(&self, name: &str) -> Result<(), Error> {
        let mut collections = self.collections.lock().map_err(|_| Error::Internal("poisoned lock".into()))?;
        collections
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(name))
    }

    fn upsert(&self, collection: &str, id: &str, vector: Vec<f32>, payload: Json) -> Result<(), Error> {
        let mut collections = self.collections.lock().map_err(|_| Error::Internal("poisoned lock".into()))?;
        let coll = collections.get_mut(collection).ok_or_else(|| Self::not_found(collection))?;
        if let Some(existing) = coll.points.iter_mut().find(|p| p.id == id) {
            existing.vector = vector;
            existing.payload = payload;
        } else {
            coll.points.push(Point {
                id: id.to_string(),
                vector,
                payload,
            });
        }
        Ok(())
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Point>, Error> {
        let collections = self.collections.lock().map_err(|_| Error::Internal("poisoned lock".into()))?;
        let coll = collections.get(collection).ok_or_else(|| Self::not_found(collection))?;
        Ok(coll.points.iter().find(|p| p.id == id).cloned())
    }

    fn delete(&self, collection: &str, id: &str) -> Result<(), Error> {
        let mut collections = self.collections.lock().map_err(|_| Error::Internal("poisoned lock".into()))?;
        let coll = collections.get_mut(collection).ok_or_else(|| Self::not_found(collection))?;
        coll.points.retain(|p| p.id != id);
        Ok(())
    }

    fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchResult>, Error> {
        let collections = self.collections.lock().map_err(|_| Error::Internal("poisoned lock".into()))?;
        let coll = collections.get(collection).ok_or_else(|| Self::not_found(collection))?;
        let mut scored: Vec<SearchResult> = coll
            .points
            .iter()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload)))
            .map(|p| SearchResult {
                id: p.id.clone(),
                score: cosine_similarity(query, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    fn scroll(
        &self,
        collection: &str,
        limit: usize,
        offset: usize,
        with_vectors: bool,
        filter: Option<&Filter>,
    ) -> Result<ScrollPage, Error> {
        let collections = self.collections.lock().map_err(|_| Error::Internal("poisoned lock".into()))?;
        let coll = collections.get(collection).ok_or_else(|| Self::not_found(collection))?;
        let matching: Vec<&Point> = coll
            .points
            .iter()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload)))
            .collect();
        let total = matching.len();
        let page: Vec<Point> = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|p| {
                let mut p = p.clone();
                if !with_vectors {
                    p.vector.clear();
                }
                p
            })
            .collect();
        let next_offset = if offset + page.len() < total {
            Some(offset + page.len())
        } else {
            None
        };
        Ok(ScrollPage {
            points: page,
            next_offset,
        })
    }

    fn count(&self, collection: &str, filter: Option<&Filter>) -> Result<usize, Error> {
        let collections = self.collections.lock().map_err(|_| Error::Internal("poisoned lock".into()))?;
        let coll = collections.get(collection).ok_or_else(|| Self::not_found(collection))?;
        Ok(coll
            .points
            .iter()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload)))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn range_and_in_filters_work_identically_to_the_sqlite_store() {
        let s = InMemoryVectorStore::new();
        s.create_collection("c", 2).unwrap();
        s.upsert("c", "a", vec![1.0, 0.0], json!({"tier": "gold", "weight": 0.9}))
            .unwrap();
        s.upsert("c", "b", vec![0.0, 1.0], json!({"tier": "bronze", "weight": 0.2}))
            .unwrap();

        let in_filter = Filter::new().in_values("tier", vec![json!("gold"), json!("silver")]);
        assert_eq!(s.count("c", Some(&in_filter)).unwrap(), 1);

        let range_filter = Filter::new().range("weight", Some(0.5), None, None, None);
        assert_eq!(s.count("c", Some(&range_filter)).unwrap(), 1);
    }

    #[test]
    fn missing_collection_error_message_contains_not_found() {
        let s = InMemoryVectorStore::new();
        let err = s.get("nope", "x").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
