//! Bulk import of shows and episodes from JSON.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use crate::operations::{episodes::upsert_episode_with, shows::upsert_show_with};
use castindex_core::{Episode, Show};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Import payload: `{"shows": [...], "episodes": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataImport {
    #[serde(default)]
    pub shows: Vec<Show>,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

impl MetadataImport {
    pub fn from_json_file(path: &Path) -> DbResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DbError::Other(format!("{}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl Database {
    /// Upsert every show, then every episode, in one transaction.
    pub fn import_metadata(&self, import: &MetadataImport) -> DbResult<(usize, usize)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for show in &import.shows {
            upsert_show_with(&tx, show)?;
        }
        for episode in &import.episodes {
            upsert_episode_with(&tx, episode)?;
        }

        tx.commit()?;
        info!(
            "Imported {} shows and {} episodes",
            import.shows.len(),
            import.episodes.len()
        );
        Ok((import.shows.len(), import.episodes.len()))
    }
}
