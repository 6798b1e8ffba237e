//! Record of upload filenames that have already been ingested.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrackerFile {
    #[serde(default)]
    processed_files: Vec<String>,
}

/// JSON file of the form `{"processed_files": [...]}`.
#[derive(Debug, Clone)]
pub struct ProcessedFiles {
    path: PathBuf,
}

impl ProcessedFiles {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Names recorded so far. A missing or corrupt file counts as empty.
    pub fn processed(&self) -> BTreeSet<String> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return BTreeSet::new(),
        };
        match serde_json::from_str::<TrackerFile>(&raw) {
            Ok(file) => file.processed_files.into_iter().collect(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupt processed-files record");
                BTreeSet::new()
            }
        }
    }

    pub fn is_processed(&self, name: &str) -> bool {
        self.processed().contains(name)
    }

    pub fn mark_processed(&self, name: &str) -> Result<()> {
        let mut names = self.processed();
        names.insert(name.to_string());
        let file = TrackerFile {
            processed_files: names.into_iter().collect(),
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }

    /// Forget every recorded name.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", self.path.display())),
        }
    }
}
