//! Joined episode+show lookups used by metadata mapping.
//!
//! Each query returns candidate rows; choosing between candidates (fuzzy title
//! ranking and validation) is left to the caller.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use castindex_core::{primary_language, EpisodeMetadata};
use rusqlite::{params, Row, ToSql};

const JOINED_SELECT: &str = r#"
    SELECT e.episode_id, e.show_id, e.title,
           COALESCE(s.name, ''), COALESCE(s.author, ''), COALESCE(s.category, ''),
           COALESCE(e.created_at, ''), s.languages, s.rss_link
    FROM episodes e
    JOIN shows s ON s.show_id = e.show_id
"#;

struct JoinedRow {
    metadata: EpisodeMetadata,
    rss_link: Option<String>,
}

fn row_to_joined(row: &Row<'_>) -> rusqlite::Result<JoinedRow> {
    let languages: Option<String> = row.get(7)?;
    Ok(JoinedRow {
        metadata: EpisodeMetadata {
            episode_id: row.get(0)?,
            show_id: row.get(1)?,
            episode_title: row.get(2)?,
            show_name: row.get(3)?,
            author: row.get(4)?,
            category: row.get(5)?,
            created_at: row.get(6)?,
            language: primary_language(languages.as_deref())
                .unwrap_or_default()
                .to_string(),
        },
        rss_link: row.get(8)?,
    })
}

/// Escape `%`, `_` and `\` and wrap the value for a containment LIKE.
fn contains_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Whether `link` contains `show_ref` as a whole alphanumeric token.
pub fn link_has_ref(link: &str, show_ref: &str) -> bool {
    if show_ref.is_empty() {
        return false;
    }
    link.split(|c: char| !c.is_alphanumeric())
        .any(|token| token == show_ref)
}

impl Database {
    fn joined_query(
        &self,
        filter: &str,
        params: &[&dyn ToSql],
        limit: usize,
    ) -> DbResult<Vec<JoinedRow>> {
        let conn = self.conn()?;
        let sql = format!(
            "{} WHERE {} ORDER BY e.episode_id LIMIT {}",
            JOINED_SELECT, filter, limit
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params, row_to_joined)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Episodes of shows whose feed link carries `show_ref`.
    pub fn candidates_by_show_ref(
        &self,
        show_ref: &str,
        limit: usize,
    ) -> DbResult<Vec<EpisodeMetadata>> {
        let pattern = contains_pattern(show_ref);
        let rows = self.joined_query(
            "s.rss_link LIKE ?1 ESCAPE '\\'",
            params![pattern],
            limit,
        )?;
        Ok(rows
            .into_iter()
            .filter(|row| {
                row.rss_link
                    .as_deref()
                    .is_some_and(|link| link_has_ref(link, show_ref))
            })
            .map(|row| row.metadata)
            .collect())
    }

    /// Episodes of the show with `show_id`.
    pub fn candidates_by_show_id(
        &self,
        show_id: i64,
        limit: usize,
    ) -> DbResult<Vec<EpisodeMetadata>> {
        let rows = self.joined_query("e.show_id = ?1", params![show_id], limit)?;
        Ok(rows.into_iter().map(|row| row.metadata).collect())
    }

    /// Episodes of shows whose name contains `show_name`.
    pub fn candidates_by_show_name(
        &self,
        show_name: &str,
        limit: usize,
    ) -> DbResult<Vec<EpisodeMetadata>> {
        let pattern = contains_pattern(show_name);
        let rows = self.joined_query("s.name LIKE ?1 ESCAPE '\\'", params![pattern], limit)?;
        Ok(rows.into_iter().map(|row| row.metadata).collect())
    }

    /// Episodes whose title contains, or is contained in, `title`.
    pub fn candidates_by_title(
        &self,
        title: &str,
        limit: usize,
    ) -> DbResult<Vec<EpisodeMetadata>> {
        let pattern = contains_pattern(title);
        let rows = self.joined_query(
            "(e.title LIKE ?1 ESCAPE '\\' OR (e.title != '' AND ?2 LIKE '%' || e.title || '%'))",
            params![pattern, title],
            limit,
        )?;
        Ok(rows.into_iter().map(|row| row.metadata).collect())
    }
}
