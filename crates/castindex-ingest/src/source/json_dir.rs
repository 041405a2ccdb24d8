//! Directory-of-JSON document store.
//!
//! Layout: `{root}/{group}/{key}.json`, one record per file.

use super::record::extract_document;
use super::DocumentStore;
use crate::error::{IngestError, IngestResult};
use castindex_core::RawDocument;
use glob::Pattern;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub struct JsonDirStore {
    root: PathBuf,
    pattern: Pattern,
}

impl JsonDirStore {
    /// Store rooted at `root`, listing files whose names match `pattern`.
    pub fn new(root: impl Into<PathBuf>, pattern: &str) -> IngestResult<Self> {
        Ok(Self {
            root: root.into(),
            pattern: Pattern::new(pattern)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn group_dir(&self, group: &str) -> IngestResult<PathBuf> {
        let dir = self.root.join(group);
        if group.is_empty() || group.contains(['/', '\\']) || !dir.is_dir() {
            return Err(IngestError::GroupNotFound(group.to_string()));
        }
        Ok(dir)
    }

    /// Matching files directly inside `dir`, sorted by path.
    fn files(&self, dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .is_some_and(|name| self.pattern.matches(name))
            })
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files
    }

    fn path_for(&self, group: &str, key: &str) -> IngestResult<PathBuf> {
        let dir = self.group_dir(group)?;
        let direct = dir.join(format!("{}.json", key));
        if direct.is_file() {
            return Ok(direct);
        }
        self.files(&dir)
            .into_iter()
            .find(|path| path.file_stem().and_then(|s| s.to_str()) == Some(key))
            .ok_or(IngestError::DocumentNotFound(direct))
    }
}

impl DocumentStore for JsonDirStore {
    fn groups(&self) -> IngestResult<Vec<String>> {
        if !self.root.is_dir() {
            return Err(IngestError::GroupNotFound(self.root.display().to_string()));
        }
        let mut groups: Vec<String> = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| !name.starts_with('.'))
            .collect();
        groups.sort();
        Ok(groups)
    }

    fn list(&self, group: &str) -> IngestResult<Vec<String>> {
        let dir = self.group_dir(group)?;
        Ok(self
            .files(&dir)
            .iter()
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()))
            .map(str::to_string)
            .collect())
    }

    fn read(&self, group: &str, key: &str) -> IngestResult<RawDocument> {
        let path = self.path_for(group, key)?;
        let contents = std::fs::read_to_string(&path)?;
        let record: serde_json::Value = serde_json::from_str(&contents)?;
        extract_document(&record, group, key)
    }
}
