//! Plain-data row types for every entity in §3. These are what the
//! dispatcher serializes directly — no nested language-specific object
//! graphs, per spec §9's "result serialization" note.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RootCause {
    pub category: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lesson {
    pub what_worked: String,
    pub takeaway: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GhapEntry {
    pub id: String,
    pub created_at: String,
    pub resolved_at: Option<String>,
    pub domain: String,
    pub strategy: String,
    pub goal: String,
    pub hypothesis: String,
    pub action: String,
    pub prediction: String,
    pub iteration_count: i64,
    pub status: String,
    pub outcome_result: Option<String>,
    pub surprise: Option<String>,
    pub root_cause: Option<RootCause>,
    pub lesson: Option<Lesson>,
    pub confidence_tier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub task_type: String,
    pub phase: String,
    pub spec_id: Option<String>,
    pub specialist: Option<String>,
    pub notes: Option<String>,
    pub blocked_by: Vec<String>,
    pub worktree_path: Option<String>,
    pub project_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub id: String,
    pub task_id: String,
    pub review_type: String,
    pub result: String,
    pub worker_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    pub id: String,
    pub task_id: String,
    pub role: String,
    pub status: String,
    pub started_at: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Memory {
    pub id: String,
    pub content: String,
    pub category: String,
    pub importance: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Value {
    pub id: String,
    pub text: String,
    pub axis: String,
    pub cluster_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionHandoff {
    pub id: String,
    pub handoff_content: String,
    pub needs_continuation: bool,
    pub created_at: String,
    pub resumed_at: Option<String>,
}

/// A free-form working note appended during a session, later reviewable for
/// lessons that warrant promotion into a GHAP or Memory. Not named as an
/// entity in the data model proper but required by the Journal tools of
/// §4.M's tool catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalEntry {
    pub id: String,
    pub content: String,
    pub reflected: bool,
    pub created_at: String,
}
