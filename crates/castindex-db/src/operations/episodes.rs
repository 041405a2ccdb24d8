//! Episode CRUD operations.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use castindex_core::Episode;
use rusqlite::{params, Connection, Row};

const EPISODE_COLUMNS: &str =
    "episode_id, show_id, title, published_date, duration, description, created_at";

fn row_to_episode(row: &Row<'_>) -> rusqlite::Result<Episode> {
    Ok(Episode {
        episode_id: row.get(0)?,
        show_id: row.get(1)?,
        title: row.get(2)?,
        published_date: row.get(3)?,
        duration: row.get(4)?,
        description: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub(crate) fn upsert_episode_with(conn: &Connection, episode: &Episode) -> DbResult<()> {
    conn.execute(
        r#"
        INSERT INTO episodes (episode_id, show_id, title, published_date, duration, description, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(episode_id) DO UPDATE SET
            show_id = excluded.show_id,
            title = excluded.title,
            published_date = excluded.published_date,
            duration = excluded.duration,
            description = excluded.description,
            created_at = excluded.created_at
        "#,
        params![
            episode.episode_id,
            episode.show_id,
            episode.title,
            episode.published_date,
            episode.duration,
            episode.description,
            episode.created_at,
        ],
    )?;
    Ok(())
}

impl Database {
    /// Insert or replace an episode. The owning show must exist.
    pub fn upsert_episode(&self, episode: &Episode) -> DbResult<()> {
        let conn = self.conn()?;
        upsert_episode_with(&conn, episode)
    }

    /// Get an episode by ID.
    pub fn get_episode(&self, episode_id: i64) -> DbResult<Episode> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM episodes WHERE episode_id = ?1",
                EPISODE_COLUMNS
            ),
            params![episode_id],
            row_to_episode,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                DbError::NotFound(format!("Episode not found: {}", episode_id))
            }
            _ => DbError::from(e),
        })
    }

    /// All episodes of a show, oldest first.
    pub fn episodes_by_show(&self, show_id: i64) -> DbResult<Vec<Episode>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM episodes WHERE show_id = ?1 ORDER BY published_date, episode_id",
            EPISODE_COLUMNS
        ))?;
        let episodes = stmt.query_map(params![show_id], row_to_episode)?;
        episodes.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castindex_core::Show;

    #[test]
    fn test_upsert_and_get_episode() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_show(&Show::new(67, "Money Talk")).unwrap();

        let mut episode = Episode::new(3, 67, "標題");
        episode.duration = Some(1800);
        db.upsert_episode(&episode).unwrap();

        assert_eq!(db.get_episode(3).unwrap(), episode);
        assert_eq!(db.episodes_by_show(67).unwrap().len(), 1);
    }

    #[test]
    fn test_episode_requires_show() {
        let db = Database::open_in_memory().unwrap();
        let result = db.upsert_episode(&Episode::new(3, 999, "orphan"));
        assert!(result.is_err());
    }
}
