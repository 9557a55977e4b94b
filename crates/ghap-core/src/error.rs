//! Centralized error type for the GHAP substrate core.
//!
//! Every failure that can cross the dispatcher boundary (§4.M) must map onto
//! one of these variants so that `dispatch::envelope_for` can always produce
//! the `{"error": {"type": ..., "message": ...}}` shape without guessing.
//! Library code never panics; internal contention or poisoned locks surface
//! as `Internal`, never as an unwind.

use thiserror::Error;

/// The kind tag serialized into the dispatcher's error envelope (§7).
///
/// This is a closed set — adding a variant here and to `Error` is the only
/// way a new error kind reaches callers, which keeps the dispatcher boundary
/// exhaustive.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Input fails type, enum, range, or format validation.
    #[error("{0}")]
    Validation(String),

    /// A named resource (task, GHAP id, backup, ...) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// `start_ghap` attempted while another entry is already active.
    #[error(
        "an active GHAP entry already exists: {0} (resolve it with resolve_ghap or mutate it with update_ghap)"
    )]
    ActiveGhapExists(String),

    /// An operation (e.g. clustering) was requested with no usable input data.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Normalized from a vector-store message containing the substring
    /// "not found" that refers to a missing collection.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// A deadline was exceeded before the operation completed.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The request envelope itself was malformed (bad JSON, missing fields).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The dispatcher has no handler registered under this tool name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// A fallback for anything else; the caller should still log full context.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The `type` string placed in the dispatcher error envelope (§7).
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::NotFound(_) => "not_found",
            Error::ActiveGhapExists(_) => "active_ghap_exists",
            Error::InsufficientData(_) => "insufficient_data",
            Error::CollectionNotFound(_) => "collection_not_found",
            Error::Timeout(_) => "timeout",
            Error::BadRequest(_) => "bad_request",
            Error::UnknownTool(_) => "unknown_tool",
            Error::Internal(_) => "internal_error",
        }
    }
}

/// Result type alias used throughout ghap-core.
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::BadRequest(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => {
                Error::NotFound("row not found".to_string())
            }
            other => Error::Internal(format!("database error: {other}")),
        }
    }
}

/// A store message is normalized into `Error::CollectionNotFound` iff it
/// contains the substring "not found" — the contract spec §4.B relies on.
pub fn normalize_store_error(message: impl Into<String>) -> Error {
    let message = message.into();
    if message.contains("not found") {
        Error::CollectionNotFound(message)
    } else {
        Error::Internal(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_match_spec_error_kinds() {
        assert_eq!(Error::Validation("x".into()).kind(), "validation_error");
        assert_eq!(Error::NotFound("x".into()).kind(), "not_found");
        assert_eq!(
            Error::ActiveGhapExists("ghap_1".into()).kind(),
            "active_ghap_exists"
        );
        assert_eq!(Error::InsufficientData("x".into()).kind(), "insufficient_data");
        assert_eq!(
            Error::CollectionNotFound("x".into()).kind(),
            "collection_not_found"
        );
        assert_eq!(Error::Timeout("x".into()).kind(), "timeout");
        assert_eq!(Error::BadRequest("x".into()).kind(), "bad_request");
        assert_eq!(Error::UnknownTool("x".into()).kind(), "unknown_tool");
        assert_eq!(Error::Internal("x".into()).kind(), "internal_error");
    }

    #[test]
    fn active_ghap_message_names_the_active_id_and_resolve_ghap() {
        let err = Error::ActiveGhapExists("ghap_abc123".to_string());
        let msg = err.to_string();
        assert!(msg.contains("ghap_abc123"));
        assert!(msg.contains("resolve_ghap"));
    }

    #[test]
    fn normalize_store_error_detects_not_found_substring() {
        assert_eq!(
            normalize_store_error("collection 'ghap_full' not found").kind(),
            "collection_not_found"
        );
        assert_eq!(normalize_store_error("disk full").kind(), "internal_error");
    }
}
