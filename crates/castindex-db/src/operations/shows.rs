//! Show CRUD operations.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use castindex_core::Show;
use rusqlite::{params, Connection, Row};

const SHOW_COLUMNS: &str = "show_id, name, author, category, rss_link, languages";

fn row_to_show(row: &Row<'_>) -> rusqlite::Result<Show> {
    Ok(Show {
        show_id: row.get(0)?,
        name: row.get(1)?,
        author: row.get(2)?,
        category: row.get(3)?,
        rss_link: row.get(4)?,
        languages: row.get(5)?,
    })
}

pub(crate) fn upsert_show_with(conn: &Connection, show: &Show) -> DbResult<()> {
    conn.execute(
        r#"
        INSERT INTO shows (show_id, name, author, category, rss_link, languages)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(show_id) DO UPDATE SET
            name = excluded.name,
            author = excluded.author,
            category = excluded.category,
            rss_link = excluded.rss_link,
            languages = excluded.languages
        "#,
        params![
            show.show_id,
            show.name,
            show.author,
            show.category,
            show.rss_link,
            show.languages,
        ],
    )?;
    Ok(())
}

impl Database {
    /// Insert or replace a show.
    pub fn upsert_show(&self, show: &Show) -> DbResult<()> {
        let conn = self.conn()?;
        upsert_show_with(&conn, show)
    }

    /// Get a show by ID.
    pub fn get_show(&self, show_id: i64) -> DbResult<Show> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM shows WHERE show_id = ?1", SHOW_COLUMNS),
            params![show_id],
            row_to_show,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                DbError::NotFound(format!("Show not found: {}", show_id))
            }
            _ => DbError::from(e),
        })
    }

    /// List all shows ordered by id.
    pub fn list_shows(&self) -> DbResult<Vec<Show>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM shows ORDER BY show_id",
            SHOW_COLUMNS
        ))?;
        let shows = stmt.query_map([], row_to_show)?;
        shows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Delete a show and, through the foreign key, its episodes.
    pub fn delete_show(&self, show_id: i64) -> DbResult<()> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM shows WHERE show_id = ?1", params![show_id])?;
        if rows == 0 {
            return Err(DbError::NotFound(format!("Show not found: {}", show_id)));
        }
        Ok(())
    }
}
