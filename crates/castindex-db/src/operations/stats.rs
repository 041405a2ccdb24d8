//! Metadata store statistics.

use crate::database::Database;
use crate::error::DbResult;
use serde::Serialize;

/// Row counts of the metadata store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetadataStats {
    pub shows: i64,
    pub episodes: i64,
    /// Episodes whose show lacks an author, category or language.
    pub incomplete_episodes: i64,
}

impl Database {
    pub fn metadata_stats(&self) -> DbResult<MetadataStats> {
        let conn = self.conn()?;

        let shows: i64 = conn.query_row("SELECT COUNT(*) FROM shows", [], |row| row.get(0))?;
        let episodes: i64 =
            conn.query_row("SELECT COUNT(*) FROM episodes", [], |row| row.get(0))?;
        let incomplete_episodes: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM episodes e
            JOIN shows s ON s.show_id = e.show_id
            WHERE COALESCE(TRIM(s.author), '') = ''
               OR COALESCE(TRIM(s.category), '') = ''
               OR COALESCE(TRIM(s.languages), '') = ''
               OR COALESCE(TRIM(e.created_at), '') = ''
            "#,
            [],
            |row| row.get(0),
        )?;

        Ok(MetadataStats {
            shows,
            episodes,
            incomplete_episodes,
        })
    }
}
