//! PID/log discipline (§4.L, §6): text PID file at `{home}/server.pid`,
//! stderr of the running daemon appended to `{home}/server.log`, graceful
//! shutdown on SIGTERM with a SIGKILL fallback.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

pub struct ProcessHandle {
    pid_path: PathBuf,
}

impl ProcessHandle {
    pub fn new(pid_path: impl Into<PathBuf>) -> Self {
        Self { pid_path: pid_path.into() }
    }

    /// `is_running` per §6: PID file parseable and `kill(pid, 0)` succeeds.
    pub fn is_running(&self) -> bool {
        match self.read_pid() {
            Some(pid) => process_exists(pid),
            None => false,
        }
    }

    pub fn read_pid(&self) -> Option<u32> {
        fs::read_to_string(&self.pid_path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    /// Writes the current process's PID, atomically via temp-file + rename
    /// (§5: "writes are atomic via temp-file + rename").
    pub fn write_own_pid(&self) -> std::io::Result<()> {
        let pid = process::id();
        let tmp = self.pid_path.with_extension("pid.tmp");
        fs::write(&tmp, pid.to_string())?;
        fs::rename(&tmp, &self.pid_path)
    }

    pub fn remove_pid_file(&self) {
        let _ = fs::remove_file(&self.pid_path);
    }

    /// Graceful shutdown per §6: SIGTERM, wait up to 5s, then SIGKILL.
    pub fn stop(&self) -> anyhow::Result<()> {
        let pid = self
            .read_pid()
            .ok_or_else(|| anyhow::anyhow!("no PID file at {}", self.pid_path.display()))?;

        send_signal(pid, "-TERM");

        for _ in 0..50 {
            if !process_exists(pid) {
                self.remove_pid_file();
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        send_signal(pid, "-KILL");
        self.remove_pid_file();
        Ok(())
    }
}

#[cfg(unix)]
fn process_exists(pid: u32) -> bool {
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(windows)]
fn process_exists(pid: u32) -> bool {
    std::process::Command::new("tasklist")
        .arg("/FI")
        .arg(format!("PID eq {}", pid))
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: &str) {
    let _ = std::process::Command::new("kill").arg(signal).arg(pid.to_string()).output();
}

#[cfg(windows)]
fn send_signal(_pid: u32, _signal: &str) {
    let _ = std::process::Command::new("taskkill").arg("/F").arg("/PID").arg(_pid.to_string()).output();
}

/// Opens (or creates) the log file in append mode for redirecting a spawned
/// child's stderr (§6: "Log file: server.log, stderr of the daemon
/// redirected in append mode").
pub fn open_log_file_append(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_own_pid_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ProcessHandle::new(dir.path().join("server.pid"));
        handle.write_own_pid().unwrap();
        assert_eq!(handle.read_pid(), Some(process::id()));
    }

    #[test]
    fn is_running_is_false_with_no_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ProcessHandle::new(dir.path().join("server.pid"));
        assert!(!handle.is_running());
    }

    #[test]
    fn is_running_is_true_for_the_current_process() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ProcessHandle::new(dir.path().join("server.pid"));
        handle.write_own_pid().unwrap();
        assert!(handle.is_running());
    }
}
