//! Observation Collector (§4.D): validates and persists GHAP records,
//! enforcing the single-active invariant and driving axis-vector upserts on
//! resolution.

pub mod collector;

pub use collector::ObservationCollector;
