//! The file-backed half of the Counter & Session Bus (§4.L): a
//! per-session tool-invocation counter that short-lived hook processes can
//! share without holding a database connection. Atomic write pattern:
//! write to a `.tmp` sibling, then `rename` over the target so readers
//! never observe a partial write.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct CounterFile {
    count: i64,
    session_id: String,
}

pub struct SessionCounter {
    path: PathBuf,
}

impl SessionCounter {
    pub fn new(home: impl AsRef<Path>) -> Self {
        Self {
            path: home.as_ref().join("tool_count"),
        }
    }

    /// Missing file or corrupted JSON is non-fatal and treated as `(0, "")`
    /// (§4.L, §6).
    fn read(&self) -> (i64, String) {
        match fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<CounterFile>(&contents) {
                Ok(c) => (c.count, c.session_id),
                Err(_) => (0, String::new()),
            },
            Err(_) => (0, String::new()),
        }
    }

    fn write(&self, count: i64, session_id: &str) -> Result<(), Error> {
        let payload = CounterFile {
            count,
            session_id: session_id.to_string(),
        };
        let json = serde_json::to_string(&payload)?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Increments the counter for `session_id`, resetting it to 1 first if
    /// the stored session id differs from the observed one. Returns the new
    /// count.
    pub fn increment(&self, session_id: &str) -> Result<i64, Error> {
        let (count, stored_session) = self.read();
        let next = if stored_session == session_id { count + 1 } else { 1 };
        self.write(next, session_id)?;
        Ok(next)
    }

    pub fn reset(&self, session_id: &str) -> Result<(), Error> {
        self.write(0, session_id)
    }

    pub fn get(&self) -> (i64, String) {
        self.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_reads_as_zero_and_empty_session() {
        let home = tempdir().unwrap();
        let counter = SessionCounter::new(home.path());
        assert_eq!(counter.get(), (0, String::new()));
    }

    #[test]
    fn corrupted_file_reads_as_zero_and_empty_session() {
        let home = tempdir().unwrap();
        fs::write(home.path().join("tool_count"), "not json").unwrap();
        let counter = SessionCounter::new(home.path());
        assert_eq!(counter.get(), (0, String::new()));
    }

    #[test]
    fn increments_accumulate_within_the_same_session() {
        let home = tempdir().unwrap();
        let counter = SessionCounter::new(home.path());
        assert_eq!(counter.increment("session-a").unwrap(), 1);
        assert_eq!(counter.increment("session-a").unwrap(), 2);
        assert_eq!(counter.increment("session-a").unwrap(), 3);
    }

    #[test]
    fn counter_resets_when_the_session_id_changes() {
        let home = tempdir().unwrap();
        let counter = SessionCounter::new(home.path());
        counter.increment("session-a").unwrap();
        counter.increment("session-a").unwrap();
        assert_eq!(counter.increment("session-b").unwrap(), 1);
    }

    #[test]
    fn write_is_atomic_via_temp_file_and_rename() {
        let home = tempdir().unwrap();
        let counter = SessionCounter::new(home.path());
        counter.increment("s").unwrap();
        assert!(!home.path().join("tool_count.tmp").exists());
        assert!(home.path().join("tool_count").exists());
    }
}
