//! The Metadata Store (§4.A): a transactional relational record store over
//! `ghap_entries`, `tasks`, `reviews`, `workers`, `counters`, `memories`,
//! `values`, `session_handoffs`.
//!
//! `conn` is wrapped as `Arc<Mutex<Connection>>` so the store can be cloned
//! cheaply and shared across the daemon's worker pool.
//! Every public method acquires the lock for the minimum span needed and
//! releases it on every exit path, including error returns — `Mutex`
//! poisoning from a panicked holder is converted to `Error::Internal`
//! rather than propagated as an unwind.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::Error;
use crate::time::{now, to_iso8601};

use super::models::{
    GhapEntry, JournalEntry, Lesson, Memory, Review, RootCause, SessionHandoff, Task, Value, Worker,
};

#[derive(Clone)]
pub struct MetadataStore {
    conn: Arc<Mutex<Connection>>,
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::ConstraintViolation,
                ..
            },
            _
        )
    )
}

impl MetadataStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), Error> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE IF NOT EXISTS ghap_entries (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                resolved_at TEXT,
                domain TEXT NOT NULL,
                strategy TEXT NOT NULL,
                goal TEXT NOT NULL,
                hypothesis TEXT NOT NULL,
                action TEXT NOT NULL,
                prediction TEXT NOT NULL,
                iteration_count INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL,
                outcome_result TEXT,
                surprise TEXT,
                root_cause_category TEXT,
                root_cause_description TEXT,
                lesson_what_worked TEXT,
                lesson_takeaway TEXT,
                confidence_tier TEXT
             );
             CREATE UNIQUE INDEX IF NOT EXISTS idx_ghap_one_active
                ON ghap_entries(status) WHERE status = 'active';

             CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                task_type TEXT NOT NULL,
                phase TEXT NOT NULL,
                spec_id TEXT,
                specialist TEXT,
                notes TEXT,
                blocked_by TEXT NOT NULL DEFAULT '[]',
                worktree_path TEXT,
                project_path TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
             );

             CREATE TABLE IF NOT EXISTS reviews (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL REFERENCES tasks(id),
                review_type TEXT NOT NULL,
                result TEXT NOT NULL,
                worker_id TEXT,
                notes TEXT,
                created_at TEXT NOT NULL
             );

             CREATE TABLE IF NOT EXISTS workers (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL REFERENCES tasks(id),
                role TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                reason TEXT
             );

             CREATE TABLE IF NOT EXISTS counters (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL
             );

             CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                category TEXT NOT NULL,
                importance REAL NOT NULL,
                created_at TEXT NOT NULL
             );

             CREATE TABLE IF NOT EXISTS values_table (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                axis TEXT NOT NULL,
                cluster_id TEXT NOT NULL,
                created_at TEXT NOT NULL
             );

             CREATE TABLE IF NOT EXISTS session_handoffs (
                id TEXT PRIMARY KEY,
                handoff_content TEXT NOT NULL,
                needs_continuation INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                resumed_at TEXT
             );

             CREATE TABLE IF NOT EXISTS journal_entries (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                reflected INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
             );",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, Error> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("metadata store mutex poisoned".to_string()))
    }

    fn row_to_ghap(row: &rusqlite::Row<'_>) -> rusqlite::Result<GhapEntry> {
        let root_cause_category: Option<String> = row.get("root_cause_category")?;
        let root_cause_description: Option<String> = row.get("root_cause_description")?;
        let lesson_what_worked: Option<String> = row.get("lesson_what_worked")?;
        let lesson_takeaway: Option<String> = row.get("lesson_takeaway")?;
        Ok(GhapEntry {
            id: row.get("id")?,
            created_at: row.get("created_at")?,
            resolved_at: row.get("resolved_at")?,
            domain: row.get("domain")?,
            strategy: row.get("strategy")?,
            goal: row.get("goal")?,
            hypothesis: row.get("hypothesis")?,
            action: row.get("action")?,
            prediction: row.get("prediction")?,
            iteration_count: row.get("iteration_count")?,
            status: row.get("status")?,
            outcome_result: row.get("outcome_result")?,
            surprise: row.get("surprise")?,
            root_cause: root_cause_category.map(|category| RootCause {
                category,
                description: root_cause_description.unwrap_or_default(),
            }),
            lesson: lesson_what_worked.map(|what_worked| Lesson {
                what_worked,
                takeaway: lesson_takeaway.unwrap_or_default(),
            }),
            confidence_tier: row.get("confidence_tier")?,
        })
    }

    // ---- GHAP entries -----------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn insert_active_ghap(
        &self,
        domain: &str,
        strategy: &str,
        goal: &str,
        hypothesis: &str,
        action: &str,
        prediction: &str,
    ) -> Result<String, Error> {
        let conn = self.lock()?;
        let id = format!("ghap_{}", Uuid::new_v4().simple());
        let created_at = to_iso8601(&now());
        let result = conn.execute(
            "INSERT INTO ghap_entries
                (id, created_at, domain, strategy, goal, hypothesis, action, prediction, iteration_count, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, 'active')",
            params![id, created_at, domain, strategy, goal, hypothesis, action, prediction],
        );
        match result {
            Ok(_) => Ok(id),
            Err(e) if is_unique_violation(&e) => {
                let active_id: String =
                    conn.query_row("SELECT id FROM ghap_entries WHERE status = 'active'", [], |r| r.get(0))?;
                Err(Error::ActiveGhapExists(active_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_active_ghap(&self) -> Result<Option<GhapEntry>, Error> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM ghap_entries WHERE status = 'active'",
            [],
            Self::row_to_ghap,
        )
        .optional()
        .map_err(Error::from)
    }

    pub fn get_ghap(&self, id: &str) -> Result<Option<GhapEntry>, Error> {
        let conn = self.lock()?;
        conn.query_row("SELECT * FROM ghap_entries WHERE id = ?1", params![id], Self::row_to_ghap)
            .optional()
            .map_err(Error::from)
    }

    /// Mutates the active entry's `hypothesis`/`prediction`, bumping
    /// `iteration_count`. Returns the new iteration count.
    pub fn update_active_ghap(
        &self,
        hypothesis: Option<&str>,
        prediction: Option<&str>,
    ) -> Result<i64, Error> {
        let conn = self.lock()?;
        let id: String = conn
            .query_row("SELECT id FROM ghap_entries WHERE status = 'active'", [], |r| r.get(0))
            .optional()?
            .ok_or_else(|| Error::NotFound("no active GHAP entry".to_string()))?;
        if let Some(h) = hypothesis {
            conn.execute(
                "UPDATE ghap_entries SET hypothesis = ?1 WHERE id = ?2",
                params![h, id],
            )?;
        }
        if let Some(p) = prediction {
            conn.execute(
                "UPDATE ghap_entries SET prediction = ?1 WHERE id = ?2",
                params![p, id],
            )?;
        }
        conn.execute(
            "UPDATE ghap_entries SET iteration_count = iteration_count + 1 WHERE id = ?1",
            params![id],
        )?;
        conn.query_row(
            "SELECT iteration_count FROM ghap_entries WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .map_err(Error::from)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn resolve_active_ghap(
        &self,
        status: &str,
        outcome_result: &str,
        surprise: Option<&str>,
        root_cause: Option<&RootCause>,
        lesson: Option<&Lesson>,
        confidence_tier: &str,
    ) -> Result<String, Error> {
        let conn = self.lock()?;
        let id: String = conn
            .query_row("SELECT id FROM ghap_entries WHERE status = 'active'", [], |r| r.get(0))
            .optional()?
            .ok_or_else(|| Error::NotFound("no active GHAP entry".to_string()))?;
        let resolved_at = to_iso8601(&now());
        conn.execute(
            "UPDATE ghap_entries SET
                status = ?1, resolved_at = ?2, outcome_result = ?3, surprise = ?4,
                root_cause_category = ?5, root_cause_description = ?6,
                lesson_what_worked = ?7, lesson_takeaway = ?8, confidence_tier = ?9
             WHERE id = ?10",
            params![
                status,
                resolved_at,
                outcome_result,
                surprise,
                root_cause.map(|r| r.category.as_str()),
                root_cause.map(|r| r.description.as_str()),
                lesson.map(|l| l.what_worked.as_str()),
                lesson.map(|l| l.takeaway.as_str()),
                confidence_tier,
                id,
            ],
        )?;
        Ok(id)
    }

    pub fn list_ghap_entries(&self, limit: usize, offset: usize) -> Result<Vec<GhapEntry>, Error> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM ghap_entries WHERE resolved_at IS NOT NULL
             ORDER BY resolved_at DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], Self::row_to_ghap)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    // ---- Tasks ---------------------------------------------------------

    fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
        let blocked_by_json: String = row.get("blocked_by")?;
        let blocked_by: Vec<String> = serde_json::from_str(&blocked_by_json).unwrap_or_default();
        Ok(Task {
            id: row.get("id")?,
            title: row.get("title")?,
            task_type: row.get("task_type")?,
            phase: row.get("phase")?,
            spec_id: row.get("spec_id")?,
            specialist: row.get("specialist")?,
            notes: row.get("notes")?,
            blocked_by,
            worktree_path: row.get("worktree_path")?,
            project_path: row.get("project_path")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_task(
        &self,
        id: &str,
        title: &str,
        task_type: &str,
        phase: &str,
        spec_id: Option<&str>,
        specialist: Option<&str>,
        notes: Option<&str>,
        blocked_by: &[String],
        project_path: Option<&str>,
    ) -> Result<Task, Error> {
        let conn = self.lock()?;
        let now_iso = to_iso8601(&now());
        let blocked_by_json = serde_json::to_string(blocked_by)?;
        conn.execute(
            "INSERT INTO tasks
                (id, title, task_type, phase, spec_id, specialist, notes, blocked_by, project_path, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![id, title, task_type, phase, spec_id, specialist, notes, blocked_by_json, project_path, now_iso],
        )?;
        drop(conn);
        self.get_task(id)?.ok_or_else(|| Error::Internal("task vanished after insert".into()))
    }

    pub fn get_task(&self, id: &str) -> Result<Option<Task>, Error> {
        let conn = self.lock()?;
        conn.query_row("SELECT * FROM tasks WHERE id = ?1", params![id], Self::row_to_task)
            .optional()
            .map_err(Error::from)
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>, Error> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT * FROM tasks ORDER BY created_at ASC")?;
        let rows = stmt.query_map([], Self::row_to_task)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn update_task_phase(&self, id: &str, phase: &str) -> Result<Task, Error> {
        let conn = self.lock()?;
        let now_iso = to_iso8601(&now());
        let updated = conn.execute(
            "UPDATE tasks SET phase = ?1, updated_at = ?2 WHERE id = ?3",
            params![phase, now_iso, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("task '{id}' not found")));
        }
        drop(conn);
        self.get_task(id)?.ok_or_else(|| Error::Internal("task vanished after update".into()))
    }

    pub fn set_worktree_path(&self, id: &str, path: &str) -> Result<(), Error> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE tasks SET worktree_path = ?1, updated_at = ?2 WHERE id = ?3",
            params![path, to_iso8601(&now()), id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("task '{id}' not found")));
        }
        Ok(())
    }

    // ---- Reviews ---------------------------------------------------------

    fn row_to_review(row: &rusqlite::Row<'_>) -> rusqlite::Result<Review> {
        Ok(Review {
            id: row.get("id")?,
            task_id: row.get("task_id")?,
            review_type: row.get("review_type")?,
            result: row.get("result")?,
            worker_id: row.get("worker_id")?,
            notes: row.get("notes")?,
            created_at: row.get("created_at")?,
        })
    }

    /// Records a review. A `changes_requested` result clears all prior
    /// entries of that `(task_id, review_type)` pair before recording the
    /// new one, within a single transaction, per §3/§5.
    pub fn record_review(
        &self,
        task_id: &str,
        review_type: &str,
        result: &str,
        worker_id: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Review, Error> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if result == "changes_requested" {
            tx.execute(
                "DELETE FROM reviews WHERE task_id = ?1 AND review_type = ?2",
                params![task_id, review_type],
            )?;
        }
        let id = format!("review_{}", Uuid::new_v4().simple());
        let created_at = to_iso8601(&now());
        tx.execute(
            "INSERT INTO reviews (id, task_id, review_type, result, worker_id, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, task_id, review_type, result, worker_id, notes, created_at],
        )?;
        let review = tx.query_row("SELECT * FROM reviews WHERE id = ?1", params![id], Self::row_to_review)?;
        tx.commit()?;
        Ok(review)
    }

    pub fn list_reviews(&self, task_id: &str, review_type: Option<&str>) -> Result<Vec<Review>, Error> {
        let conn = self.lock()?;
        let reviews = match review_type {
            Some(rt) => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM reviews WHERE task_id = ?1 AND review_type = ?2 ORDER BY created_at ASC",
                )?;
                let rows = stmt.query_map(params![task_id, rt], Self::row_to_review)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt =
                    conn.prepare("SELECT * FROM reviews WHERE task_id = ?1 ORDER BY created_at ASC")?;
                let rows = stmt.query_map(params![task_id], Self::row_to_review)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(reviews)
    }

    /// Quorum rule: two distinct `approved` entries (by `worker_id`) for the
    /// `(task_id, review_type)` pair.
    pub fn check_reviews(&self, task_id: &str, review_type: &str) -> Result<(bool, usize), Error> {
        let reviews = self.list_reviews(task_id, Some(review_type))?;
        let mut distinct_approvers = std::collections::HashSet::new();
        for r in reviews.iter().filter(|r| r.result == "approved") {
            distinct_approvers.insert(r.worker_id.clone().unwrap_or_else(|| r.id.clone()));
        }
        let count = distinct_approvers.len();
        Ok((count >= 2, count))
    }

    // ---- Workers ---------------------------------------------------------

    fn row_to_worker(row: &rusqlite::Row<'_>) -> rusqlite::Result<Worker> {
        Ok(Worker {
            id: row.get("id")?,
            task_id: row.get("task_id")?,
            role: row.get("role")?,
            status: row.get("status")?,
            started_at: row.get("started_at")?,
            reason: row.get("reason")?,
        })
    }

    pub fn create_worker(&self, task_id: &str, role: &str) -> Result<Worker, Error> {
        let conn = self.lock()?;
        let id = format!("worker_{}", Uuid::new_v4().simple());
        let started_at = to_iso8601(&now());
        conn.execute(
            "INSERT INTO workers (id, task_id, role, status, started_at) VALUES (?1, ?2, ?3, 'active', ?4)",
            params![id, task_id, role, started_at],
        )?;
        conn.query_row("SELECT * FROM workers WHERE id = ?1", params![id], Self::row_to_worker)
            .map_err(Error::from)
    }

    pub fn list_workers(&self, task_id: Option<&str>) -> Result<Vec<Worker>, Error> {
        let conn = self.lock()?;
        let workers = match task_id {
            Some(t) => {
                let mut stmt = conn.prepare("SELECT * FROM workers WHERE task_id = ?1 ORDER BY started_at ASC")?;
                let rows = stmt.query_map(params![t], Self::row_to_worker)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare("SELECT * FROM workers ORDER BY started_at ASC")?;
                let rows = stmt.query_map([], Self::row_to_worker)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(workers)
    }

    /// Promotes `active` workers whose `started_at` is older than
    /// `horizon_seconds` to `session_ended`. Returns the number promoted.
    pub fn sweep_stale_workers(&self, horizon_seconds: i64) -> Result<usize, Error> {
        let conn = self.lock()?;
        let cutoff = to_iso8601(&(now() - chrono::Duration::seconds(horizon_seconds)));
        let updated = conn.execute(
            "UPDATE workers SET status = 'session_ended'
             WHERE status = 'active' AND started_at < ?1",
            params![cutoff],
        )?;
        Ok(updated)
    }

    // ---- Counters ---------------------------------------------------------

    pub fn get_counter(&self, name: &str) -> Result<i64, Error> {
        let conn = self.lock()?;
        conn.query_row("SELECT value FROM counters WHERE name = ?1", params![name], |r| r.get(0))
            .optional()
            .map(|v| v.unwrap_or(0))
            .map_err(Error::from)
    }

    /// Atomic read-modify-write. Incrementing a missing name creates it at 1.
    pub fn increment_counter(&self, name: &str) -> Result<i64, Error> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO counters (name, value) VALUES (?1, 1)
             ON CONFLICT(name) DO UPDATE SET value = value + 1",
            params![name],
        )?;
        conn.query_row("SELECT value FROM counters WHERE name = ?1", params![name], |r| r.get(0))
            .map_err(Error::from)
    }

    pub fn set_counter(&self, name: &str, value: i64) -> Result<(), Error> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO counters (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            params![name, value],
        )?;
        Ok(())
    }

    pub fn reset_counter(&self, name: &str) -> Result<(), Error> {
        self.set_counter(name, 0)
    }

    pub fn list_counters(&self) -> Result<Vec<(String, i64)>, Error> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name, value FROM counters ORDER BY name ASC")?;
        let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    // ---- Memories ---------------------------------------------------------

    fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
        Ok(Memory {
            id: row.get("id")?,
            content: row.get("content")?,
            category: row.get("category")?,
            importance: row.get("importance")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn create_memory(&self, content: &str, category: &str, importance: f64) -> Result<Memory, Error> {
        let conn = self.lock()?;
        let id = format!("memory_{}", Uuid::new_v4().simple());
        let created_at = to_iso8601(&now());
        conn.execute(
            "INSERT INTO memories (id, content, category, importance, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, content, category, importance, created_at],
        )?;
        conn.query_row("SELECT * FROM memories WHERE id = ?1", params![id], Self::row_to_memory)
            .map_err(Error::from)
    }

    pub fn get_memory(&self, id: &str) -> Result<Option<Memory>, Error> {
        let conn = self.lock()?;
        conn.query_row("SELECT * FROM memories WHERE id = ?1", params![id], Self::row_to_memory)
            .optional()
            .map_err(Error::from)
    }

    pub fn list_memories(&self) -> Result<Vec<Memory>, Error> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT * FROM memories ORDER BY created_at DESC")?;
        let rows = stmt.query_map([], Self::row_to_memory)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn delete_memory(&self, id: &str) -> Result<(), Error> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("memory '{id}' not found")));
        }
        Ok(())
    }

    // ---- Values ---------------------------------------------------------

    fn row_to_value(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
        Ok(Value {
            id: row.get("id")?,
            text: row.get("text")?,
            axis: row.get("axis")?,
            cluster_id: row.get("cluster_id")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn insert_value(&self, text: &str, axis: &str, cluster_id: &str) -> Result<Value, Error> {
        let conn = self.lock()?;
        let id = format!("value_{}", Uuid::new_v4().simple());
        let created_at = to_iso8601(&now());
        conn.execute(
            "INSERT INTO values_table (id, text, axis, cluster_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, text, axis, cluster_id, created_at],
        )?;
        conn.query_row("SELECT * FROM values_table WHERE id = ?1", params![id], Self::row_to_value)
            .map_err(Error::from)
    }

    pub fn list_values(&self) -> Result<Vec<Value>, Error> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT * FROM values_table ORDER BY created_at DESC")?;
        let rows = stmt.query_map([], Self::row_to_value)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    // ---- Session handoffs -------------------------------------------------

    fn row_to_handoff(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionHandoff> {
        Ok(SessionHandoff {
            id: row.get("id")?,
            handoff_content: row.get("handoff_content")?,
            needs_continuation: row.get::<_, i64>("needs_continuation")? != 0,
            created_at: row.get("created_at")?,
            resumed_at: row.get("resumed_at")?,
        })
    }

    pub fn create_handoff(&self, content: &str, needs_continuation: bool) -> Result<SessionHandoff, Error> {
        let conn = self.lock()?;
        let id = format!("handoff_{}", Uuid::new_v4().simple());
        let created_at = to_iso8601(&now());
        conn.execute(
            "INSERT INTO session_handoffs (id, handoff_content, needs_continuation, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, content, needs_continuation as i64, created_at],
        )?;
        conn.query_row(
            "SELECT * FROM session_handoffs WHERE id = ?1",
            params![id],
            Self::row_to_handoff,
        )
        .map_err(Error::from)
    }

    /// Selects the most recent record with `needs_continuation` and no
    /// `resumed_at`.
    pub fn get_pending_handoff(&self) -> Result<Option<SessionHandoff>, Error> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM session_handoffs
             WHERE needs_continuation = 1 AND resumed_at IS NULL
             ORDER BY created_at DESC LIMIT 1",
            [],
            Self::row_to_handoff,
        )
        .optional()
        .map_err(Error::from)
    }

    pub fn mark_resumed(&self, id: &str) -> Result<(), Error> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE session_handoffs SET resumed_at = ?1 WHERE id = ?2",
            params![to_iso8601(&now()), id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("session handoff '{id}' not found")));
        }
        Ok(())
    }

    // ---- Journal entries --------------------------------------------------

    fn row_to_journal_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<JournalEntry> {
        Ok(JournalEntry {
            id: row.get("id")?,
            content: row.get("content")?,
            reflected: row.get::<_, i64>("reflected")? != 0,
            created_at: row.get("created_at")?,
        })
    }

    pub fn create_journal_entry(&self, content: &str) -> Result<JournalEntry, Error> {
        let conn = self.lock()?;
        let id = format!("journal_{}", Uuid::new_v4().simple());
        let created_at = to_iso8601(&now());
        conn.execute(
            "INSERT INTO journal_entries (id, content, reflected, created_at) VALUES (?1, ?2, 0, ?3)",
            params![id, content, created_at],
        )?;
        conn.query_row(
            "SELECT * FROM journal_entries WHERE id = ?1",
            params![id],
            Self::row_to_journal_entry,
        )
        .map_err(Error::from)
    }

    pub fn get_journal_entry(&self, id: &str) -> Result<Option<JournalEntry>, Error> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM journal_entries WHERE id = ?1",
            params![id],
            Self::row_to_journal_entry,
        )
        .optional()
        .map_err(Error::from)
    }

    pub fn list_journal_entries(&self, include_reflected: bool) -> Result<Vec<JournalEntry>, Error> {
        let conn = self.lock()?;
        let sql = if include_reflected {
            "SELECT * FROM journal_entries ORDER BY created_at DESC"
        } else {
            "SELECT * FROM journal_entries WHERE reflected = 0 ORDER BY created_at DESC"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], Self::row_to_journal_entry)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Marks each named entry as reflected; unknown ids are silently
    /// skipped so a partially-stale batch doesn't fail the whole call.
    pub fn mark_entries_reflected(&self, ids: &[String]) -> Result<usize, Error> {
        let conn = self.lock()?;
        let mut marked = 0;
        for id in ids {
            marked += conn.execute("UPDATE journal_entries SET reflected = 1 WHERE id = ?1", params![id])?;
        }
        Ok(marked)
    }

    /// Path to the underlying database file, if backed by one (used by the
    /// backup module; returns `None` for `:memory:` stores).
    pub fn db_path(&self) -> Result<Option<std::path::PathBuf>, Error> {
        let conn = self.lock()?;
        let path = conn.path().map(std::path::PathBuf::from);
        Ok(path.filter(|p| p.as_os_str() != ":memory:"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_active_ghap_invariant_rejects_second_start() {
        let store = MetadataStore::in_memory().unwrap();
        store
            .insert_active_ghap("debugging", "systematic-elimination", "g", "h", "a", "p")
            .unwrap();
        let err = store
            .insert_active_ghap("debugging", "systematic-elimination", "g2", "h2", "a2", "p2")
            .unwrap_err();
        assert_eq!(err.kind(), "active_ghap_exists");
    }

    #[test]
    fn resolve_ghap_then_second_active_lookup_is_terminal() {
        let store = MetadataStore::in_memory().unwrap();
        let id = store
            .insert_active_ghap("debugging", "systematic-elimination", "g", "h", "a", "p")
            .unwrap();
        store
            .resolve_active_ghap("confirmed", "fixed", None, None, None, "gold")
            .unwrap();
        assert!(store.get_active_ghap().unwrap().is_none());
        let resolved = store.get_ghap(&id).unwrap().unwrap();
        assert_eq!(resolved.status, "confirmed");
        assert!(resolved.resolved_at.is_some());
    }

    #[test]
    fn update_active_ghap_increments_iteration_count() {
        let store = MetadataStore::in_memory().unwrap();
        store
            .insert_active_ghap("debugging", "systematic-elimination", "g", "h", "a", "p")
            .unwrap();
        let n1 = store.update_active_ghap(Some("new hypothesis"), None).unwrap();
        let n2 = store.update_active_ghap(None, Some("new prediction")).unwrap();
        assert_eq!(n1, 2);
        assert_eq!(n2, 3);
    }

    #[test]
    fn counter_increment_from_absent_creates_at_one_and_accumulates() {
        let store = MetadataStore::in_memory().unwrap();
        assert_eq!(store.get_counter("merges_since_e2e").unwrap(), 0);
        assert_eq!(store.increment_counter("merges_since_e2e").unwrap(), 1);
        assert_eq!(store.increment_counter("merges_since_e2e").unwrap(), 2);
    }

    #[test]
    fn review_quorum_satisfied_by_two_distinct_approvers_and_cleared_by_changes_requested() {
        let store = MetadataStore::in_memory().unwrap();
        store
            .create_task("T-1", "Test task", "feature", "SPEC", None, None, None, &[], None)
            .unwrap();
        store
            .record_review("T-1", "code", "approved", Some("w1"), None)
            .unwrap();
        store
            .record_review("T-1", "code", "approved", Some("w2"), None)
            .unwrap();
        assert_eq!(store.check_reviews("T-1", "code").unwrap(), (true, 2));

        store
            .record_review("T-1", "code", "changes_requested", Some("w3"), None)
            .unwrap();
        assert_eq!(store.check_reviews("T-1", "code").unwrap(), (false, 0));
    }

    #[test]
    fn task_phase_update_rejects_unknown_task() {
        let store = MetadataStore::in_memory().unwrap();
        let err = store.update_task_phase("nope", "DESIGN").unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn pending_handoff_selects_most_recent_unresumed() {
        let store = MetadataStore::in_memory().unwrap();
        let h1 = store.create_handoff("first", true).unwrap();
        let _h2_resolved_later = store.create_handoff("second", true).unwrap();
        store.mark_resumed(&h1.id).unwrap();
        let pending = store.get_pending_handoff().unwrap().unwrap();
        assert_eq!(pending.handoff_content, "second");
    }

    #[test]
    fn marking_entries_reflected_excludes_them_from_the_unreflected_listing() {
        let store = MetadataStore::in_memory().unwrap();
        let e1 = store.create_journal_entry("noted a flaky test").unwrap();
        let e2 = store.create_journal_entry("noted a perf regression").unwrap();
        assert_eq!(store.list_journal_entries(false).unwrap().len(), 2);
        store.mark_entries_reflected(&[e1.id.clone()]).unwrap();
        let unreflected = store.list_journal_entries(false).unwrap();
        assert_eq!(unreflected.len(), 1);
        assert_eq!(unreflected[0].id, e2.id);
        assert_eq!(store.list_journal_entries(true).unwrap().len(), 2);
    }
}
