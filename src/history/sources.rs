//! Historical snapshot sources.
//!
//! Each source yields raw state bytes with a timestamp; the tracker turns
//! them into snapshots. A failing source never blocks the others.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use walkdir::WalkDir;

/// Backup directories searched under a working directory.
pub const BACKUP_DIRS: &[&str] = &[
    ".terraform.backup",
    "terraform.tfstate.backup",
    "state-backups",
    ".terraform/backup",
    "backups",
];

/// CI/CD artifact directories searched under a working directory.
pub const ARTIFACT_DIRS: &[&str] = &[
    ".github/artifacts",
    ".gitlab/artifacts",
    "jenkins/artifacts",
    "circleci/artifacts",
    "azure-pipelines/artifacts",
];

/// Raw state content recovered from some history source.
#[derive(Debug, Clone)]
pub struct RawSnapshot {
    pub data: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    /// Label that becomes the snapshot's state file name: the full path for
    /// filesystem sources, the repository-relative path for git.
    pub source: String,
}

pub trait SnapshotSource: Send + Sync {
    fn name(&self) -> &str;
    fn collect(&self) -> Result<Vec<RawSnapshot>>;
}

fn modified_at(path: &Path) -> Result<DateTime<Utc>> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("reading mtime of {}", path.display()))?;
    Ok(DateTime::<Utc>::from(modified))
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_snapshot(path: &Path) -> Result<RawSnapshot> {
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(RawSnapshot {
        data,
        timestamp: modified_at(path)?,
        source: path.display().to_string(),
    })
}

/// State files directly inside known backup directories, timestamped by mtime.
#[derive(Debug, Clone)]
pub struct BackupDirectorySource {
    dirs: Vec<PathBuf>,
}

impl BackupDirectorySource {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// The standard backup locations under `base`.
    pub fn under(base: &Path) -> Self {
        Self::new(BACKUP_DIRS.iter().map(|d| base.join(d)).collect())
    }
}

impl SnapshotSource for BackupDirectorySource {
    fn name(&self) -> &str {
        "backup"
    }

    fn collect(&self) -> Result<Vec<RawSnapshot>> {
        let mut snapshots = Vec::new();
        for dir in self.dirs.iter().filter(|d| d.is_dir()) {
            let entries =
                fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))?;
            for entry in entries {
                let path = entry?.path();
                if !path.is_file() || !file_label(&path).contains(".tfstate") {
                    continue;
                }
                match read_snapshot(&path) {
                    Ok(snapshot) => snapshots.push(snapshot),
                    Err(e) => log::warn!("HISTORY_FILE_SKIPPED path={} error={:#}", path.display(), e),
                }
            }
        }
        Ok(snapshots)
    }
}

/// Any file with `tfstate` in its path below CI artifact directories.
#[derive(Debug, Clone)]
pub struct ArtifactDirectorySource {
    dirs: Vec<PathBuf>,
}

impl ArtifactDirectorySource {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn under(base: &Path) -> Self {
        Self::new(ARTIFACT_DIRS.iter().map(|d| base.join(d)).collect())
    }
}

impl SnapshotSource for ArtifactDirectorySource {
    fn name(&self) -> &str {
        "ci_artifacts"
    }

    fn collect(&self) -> Result<Vec<RawSnapshot>> {
        let mut snapshots = Vec::new();
        for dir in self.dirs.iter().filter(|d| d.is_dir()) {
            for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
                let path = entry.path();
                if !entry.file_type().is_file() || !path.to_string_lossy().contains("tfstate") {
                    continue;
                }
                match read_snapshot(path) {
                    Ok(snapshot) => snapshots.push(snapshot),
                    Err(e) => log::warn!("HISTORY_FILE_SKIPPED path={} error={:#}", path.display(), e),
                }
            }
        }
        Ok(snapshots)
    }
}

/// Every committed revision of one state file in a git repository.
#[derive(Debug, Clone)]
pub struct GitHistorySource {
    repo: PathBuf,
    state_path: String,
}

impl GitHistorySource {
    /// `state_path` is relative to the repository root.
    pub fn new(repo: impl Into<PathBuf>, state_path: &str) -> Self {
        Self {
            repo: repo.into(),
            state_path: state_path.to_string(),
        }
    }

    fn git(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .output()
            .context("running git")?;
        if !output.status.success() {
            bail!(
                "git {} failed in {}: status {}",
                args.first().copied().unwrap_or_default(),
                self.repo.display(),
                output.status
            );
        }
        Ok(output.stdout)
    }

    /// `(commit, commit time)` pairs touching the state file, newest first.
    fn commits(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
        let stdout = self.git(&["log", "--format=%H %ct", "--", &self.state_path])?;
        let mut commits = Vec::new();
        for line in String::from_utf8_lossy(&stdout).lines() {
            let Some((hash, secs)) = line.trim().split_once(' ') else {
                continue;
            };
            let Ok(secs) = secs.parse::<i64>() else {
                continue;
            };
            if let Some(at) = Utc.timestamp_opt(secs, 0).single() {
                commits.push((hash.to_string(), at));
            }
        }
        Ok(commits)
    }
}

impl SnapshotSource for GitHistorySource {
    fn name(&self) -> &str {
        "git"
    }

    fn collect(&self) -> Result<Vec<RawSnapshot>> {
        let mut snapshots = Vec::new();
        for (hash, timestamp) in self.commits()? {
            let revision = format!("{}:{}", hash, self.state_path);
            match self.git(&["show", &revision]) {
                // empty revision
                Ok(data) if data.is_empty() => continue,
                Ok(data) => snapshots.push(RawSnapshot {
                    data,
                    timestamp,
                    source: self.state_path.clone(),
                }),
                Err(e) => log::debug!("HISTORY_REVISION_SKIPPED commit={} error={:#}", hash, e),
            }
        }
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::snapshots::create_snapshot;
    use tempfile::TempDir;

    #[test]
    fn test_backup_source_reads_state_files_only() {
        let dir = TempDir::new().unwrap();
        let backups = dir.path().join("state-backups");
        fs::create_dir_all(&backups).unwrap();
        fs::write(backups.join("terraform.tfstate.1"), b"{\"version\":4}").unwrap();
        fs::write(backups.join("notes.txt"), b"hello").unwrap();

        let snapshots = BackupDirectorySource::under(dir.path()).collect().unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(
            snapshots[0].source,
            backups.join("terraform.tfstate.1").display().to_string()
        );
    }

    #[test]
    fn test_same_file_name_in_two_backup_dirs_stays_distinct() {
        let dir = TempDir::new().unwrap();
        for name in ["backups", "state-backups"] {
            let backups = dir.path().join(name);
            fs::create_dir_all(&backups).unwrap();
            fs::write(backups.join("terraform.tfstate.1"), b"{\"version\":4}").unwrap();
        }

        let snapshots = BackupDirectorySource::under(dir.path()).collect().unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_ne!(snapshots[0].source, snapshots[1].source);

        let at = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        let ids: Vec<String> = snapshots
            .iter()
            .map(|raw| create_snapshot(&raw.data, at, &raw.source).id)
            .collect();
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_artifact_source_walks_nested_dirs() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join(".github/artifacts/run-42/tfstate");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("prod.json"), b"{}").unwrap();
        fs::write(dir.path().join(".github/artifacts/log.txt"), b"").unwrap();

        let snapshots = ArtifactDirectorySource::under(dir.path()).collect().unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].source.ends_with("prod.json"));
        assert!(snapshots[0].source.contains("run-42"));
    }

    #[test]
    fn test_missing_directories_yield_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(BackupDirectorySource::under(dir.path())
            .collect()
            .unwrap()
            .is_empty());
        assert!(ArtifactDirectorySource::under(dir.path())
            .collect()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_git_source_without_history_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let source = GitHistorySource::new(dir.path(), "terraform.tfstate");
        // not a repository (or git missing) is an error; an unrelated enclosing repo has no revisions
        let collected = source.collect().map(|s| s.len()).unwrap_or(0);
        assert_eq!(collected, 0);
    }
}
