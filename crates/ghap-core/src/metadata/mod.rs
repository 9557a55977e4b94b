//! Metadata Store (§4.A): transactional records for tasks, GHAP entries,
//! reviews, workers, counters, memories, values, and session handoffs.

pub mod models;
pub mod store;

pub use models::{
    GhapEntry, JournalEntry, Lesson, Memory, Review, RootCause, SessionHandoff, Task, Value, Worker,
};
pub use store::MetadataStore;
