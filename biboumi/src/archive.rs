//! MUC message archive (spec.md §4.9, §6 "Persisted state" `archive` table).
//!
//! Backed by the same SQLite pool as [`crate::store`]; kept in its own
//! module because it is the one piece of persisted state spec.md gives a
//! full algorithm for (paging, the `P5` invariant in §8).

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;

/// One archived line.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ArchiveRow {
    #[sqlx(rename = "rowid")]
    pub row_id: i64,
    pub uuid: String,
    pub owner: String,
    pub chan: String,
    pub server: String,
    pub date: i64,
    pub nick: String,
    pub body: String,
}

/// `direction` parameter of [`Archive::query`] (spec.md §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    First,
    Last,
}

/// The result of a paged [`Archive::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivePage {
    /// False when more rows exist beyond the ones returned (the `limit+1`
    /// probe row was actually present).
    pub complete: bool,
    pub rows: Vec<ArchiveRow>,
}

/// The MUC message archive.
#[derive(Clone)]
pub struct Archive {
    pool: SqlitePool,
}

impl Archive {
    pub fn new(pool: SqlitePool) -> Archive {
        Archive { pool }
    }

    /// Inserts one archived line, returning its fresh uuid.
    pub async fn store(
        &self,
        owner: &str,
        chan: &str,
        server: &str,
        date: i64,
        nick: &str,
        body: &str,
    ) -> Result<String> {
        let uuid = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO archive (uuid, owner, chan, server, date, nick, body) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&uuid)
        .bind(owner)
        .bind(chan)
        .bind(server)
        .bind(date)
        .bind(nick)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(uuid)
    }

    /// Resolves `uuid` to its internal row-id, used to translate a MAM
    /// paging token (`reference_uuid`) into an `id > / <` comparison.
    async fn row_id_of(&self, uuid: &str) -> Result<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT rowid FROM archive WHERE uuid = ?")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id,)| id))
    }

    /// Paged query over the archive (spec.md §4.9, property P5).
    #[allow(clippy::too_many_arguments)]
    pub async fn query(
        &self,
        owner: &str,
        chan: &str,
        server: &str,
        limit: i64,
        start: Option<i64>,
        end: Option<i64>,
        reference_uuid: Option<&str>,
        direction: Direction,
    ) -> Result<ArchivePage> {
        let mut sql = String::from(
            "SELECT rowid, uuid, owner, chan, server, date, nick, body FROM archive \
             WHERE owner = ? AND chan = ? AND server = ?",
        );
        if start.is_some() {
            sql.push_str(" AND date >= ?");
        }
        if end.is_some() {
            sql.push_str(" AND date <= ?");
        }

        let reference_row_id = match reference_uuid {
            Some(uuid) => self.row_id_of(uuid).await?,
            None => None,
        };
        if reference_row_id.is_some() {
            match direction {
                Direction::First => sql.push_str(" AND rowid > ?"),
                Direction::Last => sql.push_str(" AND rowid < ?"),
            }
        }

        sql.push_str(match direction {
            Direction::First => " ORDER BY rowid ASC",
            Direction::Last => " ORDER BY rowid DESC",
        });
        sql.push_str(" LIMIT ?");

        let mut query = sqlx::query_as::<_, ArchiveRow>(&sql)
            .bind(owner)
            .bind(chan)
            .bind(server);
        if let Some(start) = start {
            query = query.bind(start);
        }
        if let Some(end) = end {
            query = query.bind(end);
        }
        if let Some(id) = reference_row_id {
            query = query.bind(id);
        }
        query = query.bind(limit + 1);

        let mut rows = query.fetch_all(&self.pool).await?;

        let complete = rows.len() <= limit as usize;
        if !complete {
            rows.truncate(limit as usize);
        }
        if direction == Direction::Last {
            rows.reverse();
        }

        Ok(ArchivePage { complete, rows })
    }
}
