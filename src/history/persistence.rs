//! One-file-per-change ledger storage.
//!
//! Records are written as `change_<unix millis>_<id>.json`. The random
//! suffix keeps two changes in the same millisecond from overwriting each
//! other.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{HistoryError, HistoryResult};

use super::models::ResourceChange;

const FILE_PREFIX: &str = "change_";
const FILE_SUFFIX: &str = ".json";

#[derive(Debug, Clone)]
pub struct ChangeStore {
    dir: PathBuf,
}

impl ChangeStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> HistoryError + '_ {
        move |source| HistoryError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Write one change record and return its path.
    pub fn persist(&self, change: &ResourceChange) -> HistoryResult<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(Self::io_error(&self.dir))?;

        let name = format!(
            "{}{}_{}{}",
            FILE_PREFIX,
            change.timestamp.timestamp_millis(),
            &Uuid::new_v4().to_string()[..8],
            FILE_SUFFIX
        );
        let path = self.dir.join(name);
        let data = serde_json::to_vec_pretty(change)?;
        fs::write(&path, data).map_err(Self::io_error(&path))?;
        Ok(path)
    }

    /// Every readable change record, oldest first.
    pub fn load_all(&self) -> HistoryResult<Vec<ResourceChange>> {
        Ok(self
            .load_records()?
            .into_iter()
            .map(|(_, change)| change)
            .collect())
    }

    /// Like [`ChangeStore::load_all`], paired with each record's path.
    ///
    /// Unreadable or malformed files are logged and skipped. A missing
    /// directory is an empty ledger.
    pub fn load_records(&self) -> HistoryResult<Vec<(PathBuf, ResourceChange)>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut changes = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(Self::io_error(&self.dir))? {
            let path = entry.map_err(Self::io_error(&self.dir))?.path();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !name.starts_with(FILE_PREFIX) || !name.ends_with(FILE_SUFFIX) {
                continue;
            }

            let parsed = fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    serde_json::from_slice::<ResourceChange>(&bytes).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(change) => changes.push((path, change)),
                Err(e) => log::warn!("CHANGE_RECORD_SKIPPED path={} error={}", path.display(), e),
            }
        }

        // stable: equal timestamps keep directory order
        changes.sort_by(|(_, a), (_, b)| a.timestamp.cmp(&b.timestamp));
        Ok(changes)
    }
}
