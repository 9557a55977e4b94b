//! SQLite-backed `VectorStore`: a named-collection store with the full
//! filter grammar. Search stays brute-force (load the collection, score
//! every row, sort) — nothing in this substrate's scale (thousands, not
//! millions, of GHAP vectors) calls for an ANN index.

use std::sync::Mutex;

use rusqlite::{params, Connection};
use serde_json::Value as Json;

use crate::error::Error;

use super::{cosine_similarity, Filter, Point, ScrollPage, SearchResult, VectorStore};

pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    pub fn new(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                dim  INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS vectors (
                collection TEXT NOT NULL,
                id         TEXT NOT NULL,
                embedding  TEXT NOT NULL,
                payload    TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, Error> {
        Self::new(":memory:")
    }

    fn ensure_collection_exists(conn: &Connection, name: &str) -> Result<(), Error> {
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM collections WHERE name = ?1",
                params![name],
                |_| Ok(true),
            )
            .unwrap_or(false);
        if exists {
            Ok(())
        } else {
            Err(Error::CollectionNotFound(format!(
                "collection '{name}' not found"
            )))
        }
    }

    fn load_collection(conn: &Connection, name: &str) -> Result<Vec<Point>, Error> {
        Self::ensure_collection_exists(conn, name)?;
        let mut stmt = conn.prepare(
            "SELECT id, embedding, payload FROM vectors WHERE collection = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![name], |row| {
            let id: String = row.get(0)?;
            let embedding_json: String = row.get(1)?;
            let payload_json: String = row.get(2)?;
            Ok((id, embedding_json, payload_json))
        })?;
        let mut points = Vec::new();
        for row in rows {
            let (id, embedding_json, payload_json) = row?;
            let vector: Vec<f32> = serde_json::from_str(&embedding_json)?;
            let payload: Json = serde_json::from_str(&payload_json)?;
            points.push(Point { id, vector, payload });
        }
        Ok(points)
    }
}

impl VectorStore for SqliteVectorStore {
    fn create_collection(&self, name: &str, dim: usize) -> Result<(), Error> {
        let conn = self.conn.lock().map_err(|_| Error::Internal("poisoned lock".into()))?;
        conn.execute(
            "INSERT OR IGNORE INTO collections (name, dim) VALUES (?1, ?2)",
            params![name, dim as i64],
        )?;
        Ok(())
    }

    fn delete_collection(&self, name: &str) -> Result<(), Error> {
        let conn = self.conn.lock().map_err(|_| Error::Internal("poisoned lock".into()))?;
        Self::ensure_collection_exists(&conn, name)?;
        conn.execute("DELETE FROM vectors WHERE collection = ?1", params![name])?;
        conn.execute("DELETE FROM collections WHERE name = ?1", params![name])?;
        Ok(())
    }

    fn upsert(&self, collection: &str, id: &str, vector: Vec<f32>, payload: Json) -> Result<(), Error> {
        let conn = self.conn.lock().map_err(|_| Error::Internal("poisoned lock".into()))?;
        Self::ensure_collection_exists(&conn, collection)?;
        let embedding_json = serde_json::to_string(&vector)?;
        let payload_json = serde_json::to_string(&payload)?;
        let now = crate::time::now().timestamp();
        conn.execute(
            "INSERT INTO vectors (collection, id, embedding, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(collection, id) DO UPDATE SET embedding = excluded.embedding, payload = excluded.payload",
            params![collection, id, embedding_json, payload_json, now],
        )?;
        Ok(())
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Point>, Error> {
        let conn = self.conn.lock().map_err(|_| Error::Internal("poisoned lock".into()))?;
        Self::ensure_collection_exists(&conn, collection)?;
        let result = conn.query_row(
            "SELECT embedding, payload FROM vectors WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |row| {
                let embedding_json: String = row.get(0)?;
                let payload_json: String = row.get(1)?;
                Ok((embedding_json, payload_json))
            },
        );
        match result {
            Ok((embedding_json, payload_json)) => {
                let vector: Vec<f32> = serde_json::from_str(&embedding_json)?;
                let payload: Json = serde_json::from_str(&payload_json)?;
                Ok(Some(Point {
                    id: id.to_string(),
                    vector,
                    payload,
                }))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, collection: &str, id: &str) -> Result<(), Error> {
        let conn = self.conn.lock().map_err(|_| Error::Internal("poisoned lock".into()))?;
        Self::ensure_collection_exists(&conn, collection)?;
        conn.execute(
            "DELETE FROM vectors WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        Ok(())
    }

    fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchResult>, Error> {
        let conn = self.conn.lock().map_err(|_| Error::Internal("poisoned lock".into()))?;
        let points = Self::load_collection(&conn, collection)?;
        let mut scored: Vec<SearchResult> = points
            .into_iter()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload)))
            .map(|p| SearchResult {
                score: cosine_similarity(query, &p.vector),
                id: p.id,
                payload: p.payload,
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
        let conn = self.conn.lock().map_err(|_| Error::Internal("poisoned lock".into()))?;
        let points = Self::load_collection(&conn, collection)?;
        let mut matching: Vec<Point> = points
            .into_iter()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload)))
            .collect();
        if !with_vectors {
            for p in &mut matching {
                p.vector.clear();
            }
        }
        let total = matching.len();
        let page: Vec<Point> = matching.into_iter().skip(offset).take(limit).collect();
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
        let conn = self.conn.lock().map_err(|_| Error::Internal("poisoned lock".into()))?;
        let points = Self::load_collection(&conn, collection)?;
        Ok(points
            .iter()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload)))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SqliteVectorStore {
        SqliteVectorStore::in_memory().unwrap()
    }

    #[test]
    fn create_collection_is_idempotent_and_preserves_contents() {
        let s = store();
        s.create_collection("ghap_full", 3).unwrap();
        s.upsert("ghap_full", "a", vec![1.0, 0.0, 0.0], json!({"domain": "debugging"}))
            .unwrap();
        s.create_collection("ghap_full", 3).unwrap();
        assert_eq!(s.count("ghap_full", None).unwrap(), 1);
    }

    #[test]
    fn missing_collection_errors_contain_not_found_substring() {
        let s = store();
        let err = s.count("nope", None).unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert_eq!(err.kind(), "collection_not_found");
    }

    #[test]
    fn search_ranks_by_cosine_similarity_descending() {
        let s = store();
        s.create_collection("c", 2).unwrap();
        s.upsert("c", "close", vec![1.0, 0.0], json!({})).unwrap();
        s.upsert("c", "far", vec![0.0, 1.0], json!({})).unwrap();
        let results = s.search("c", &[1.0, 0.0], 2, None).unwrap();
        assert_eq!(results[0].id, "close");
        assert_eq!(results[1].id, "far");
    }

    #[test]
    fn scroll_pages_through_exhaustively() {
        let s = store();
        s.create_collection("c", 1).unwrap();
        for i in 0..5 {
            s.upsert("c", &format!("id{i}"), vec![i as f32], json!({})).unwrap();
        }
        let mut seen = std::collections::HashSet::new();
        let mut offset = 0;
        loop {
            let page = s.scroll("c", 2, offset, false, None).unwrap();
            for p in &page.points {
                seen.insert(p.id.clone());
            }
            match page.next_offset {
                Some(next) => offset = next,
                None => break,
            }
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn delete_all_matching_removes_every_page() {
        let s = store();
        s.create_collection("c", 1).unwrap();
        for i in 0..600 {
            s.upsert("c", &format!("id{i}"), vec![i as f32], json!({})).unwrap();
        }
        let deleted = super::super::delete_all_matching(&s, "c", None).unwrap();
        assert_eq!(deleted, 600);
        assert_eq!(s.count("c", None).unwrap(), 0);
    }

    #[test]
    fn range_filter_combines_with_equality_filter() {
        let s = store();
        s.create_collection("c", 1).unwrap();
        s.upsert("c", "a", vec![1.0], json!({"domain": "debugging", "weight": 0.9}))
            .unwrap();
        s.upsert("c", "b", vec![1.0], json!({"domain": "debugging", "weight": 0.1}))
            .unwrap();
        let filter = Filter::new()
            .eq("domain", json!("debugging"))
            .range("weight", Some(0.5), None, None, None);
        let count = s.count("c", Some(&filter)).unwrap();
        assert_eq!(count, 1);
    }
}
