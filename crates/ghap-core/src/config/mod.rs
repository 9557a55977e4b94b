//! Ambient configuration: resolving `{home}` and the handful of policy
//! knobs the daemon and hooks share (server host/port, check-in
//! frequency). This is deliberately slim — full config-file
//! parsing/layering is out of scope; everything here is environment-
//! variable overrides with hardcoded defaults.

use std::env;
use std::path::PathBuf;

/// Default check-in frequency for the `PreToolUse` hook (§4.N, §6).
pub const DEFAULT_CHECKIN_FREQUENCY: u32 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub home: PathBuf,
    pub host: String,
    pub port: u16,
    pub checkin_frequency: u32,
}

impl Config {
    /// Resolves `{home}` as `~/.ghap`, overridable via `GHAP_HOME` (§6).
    pub fn from_env() -> Self {
        let home = env::var_os("GHAP_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".ghap")
            });
        let host = env::var("GHAP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("GHAP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8787);
        let checkin_frequency = env::var("GHAP_CHECKIN_FREQUENCY")
            .ok()
            .and_then(|f| f.parse().ok())
            .unwrap_or(DEFAULT_CHECKIN_FREQUENCY);
        Self {
            home,
            host,
            port,
            checkin_frequency,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.home.join("metadata.db")
    }

    /// Separate file from [`Config::db_path`]: the vector store and metadata
    /// store each own a private `rusqlite::Connection` (§3), so they get
    /// distinct files rather than sharing one handle across two pools.
    pub fn vector_db_path(&self) -> PathBuf {
        self.home.join("vectors.db")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.home.join("server.pid")
    }

    pub fn log_path(&self) -> PathBuf {
        self.home.join("server.log")
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.home.join("journal")
    }

    pub fn journal_archive_dir(&self) -> PathBuf {
        self.home.join("journal").join("archive")
    }

    /// Creates the persisted-state directory layout named in §6 under
    /// `{home}`, if it does not already exist.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.home)?;
        for dir in [
            self.journal_dir(),
            self.journal_archive_dir(),
            self.home.join("workflows"),
            self.home.join("roles"),
            self.home.join("sessions"),
            self.home.join("skills"),
            self.home.join("backups"),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ghap_home_env_var_overrides_the_default() {
        // SAFETY: test-only, single-threaded access to process env within this test.
        unsafe {
            env::set_var("GHAP_HOME", "/tmp/ghap-test-home");
        }
        let config = Config::from_env();
        assert_eq!(config.home, PathBuf::from("/tmp/ghap-test-home"));
        unsafe {
            env::remove_var("GHAP_HOME");
        }
    }

    #[test]
    fn ensure_layout_creates_every_named_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            home: dir.path().to_path_buf(),
            host: "127.0.0.1".to_string(),
            port: 8787,
            checkin_frequency: DEFAULT_CHECKIN_FREQUENCY,
        };
        config.ensure_layout().unwrap();
        assert!(config.journal_dir().exists());
        assert!(config.journal_archive_dir().exists());
        assert!(dir.path().join("workflows").exists());
    }
}
