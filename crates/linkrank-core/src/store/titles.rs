//! Persisted title index and an out-of-core distinct-title collector.

use std::path::Path;

use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::errors::{LinkRankError, LinkRankResult};
use crate::indexer::titles::TitleIndex;
use crate::models::TitlePair;
use crate::store::schema::{get_meta, open_store, set_meta, META_FINGERPRINT, META_NODE_COUNT};

/// Replace the `titles` table with `index`, recording its fingerprint.
pub fn save_title_index(path: &Path, index: &TitleIndex) -> LinkRankResult<()> {
    let conn = open_store(path)?;
    write_titles(&conn, index)
}

fn write_titles(conn: &Connection, index: &TitleIndex) -> LinkRankResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM titles;", [])?;
    {
        let mut stmt = tx.prepare("INSERT INTO titles(id, title) VALUES (?1, ?2);")?;
        for (id, title) in index.titles().enumerate() {
            stmt.execute(params![id as i64, title])?;
        }
    }
    set_meta(&tx, META_FINGERPRINT, index.fingerprint())?;
    set_meta(&tx, META_NODE_COUNT, &index.len().to_string())?;
    tx.commit()?;
    debug!(titles = index.len(), "title index saved");
    Ok(())
}

/// Load the index saved by [`save_title_index`], checking id density and the stored fingerprint.
pub fn load_title_index(path: &Path) -> LinkRankResult<TitleIndex> {
    if !path.exists() {
        return Err(LinkRankError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("title store {} does not exist", path.display()),
        )));
    }
    let conn = open_store(path)?;
    read_titles(&conn)
}

fn read_titles(conn: &Connection) -> LinkRankResult<TitleIndex> {
    let mut stmt = conn.prepare("SELECT id, title FROM titles ORDER BY id;")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;

    let mut titles = Vec::new();
    for row in rows {
        let (id, title) = row?;
        if id != titles.len() as i64 {
            return Err(LinkRankError::Corrupt(format!(
                "title ids are not dense: expected {}, found {id}",
                titles.len()
            )));
        }
        titles.push(title);
    }
    let index = TitleIndex::from_sorted_unique(titles)?;

    if let Some(stored) = get_meta(conn, META_NODE_COUNT)? {
        if stored != index.len().to_string() {
            return Err(LinkRankError::Corrupt(format!(
                "title store lists {} titles but records node_count {stored}",
                index.len()
            )));
        }
    }
    if let Some(stored) = get_meta(conn, META_FINGERPRINT)? {
        if stored != index.fingerprint() {
            return Err(LinkRankError::IndexMismatch {
                expected: stored,
                found: index.fingerprint().to_string(),
            });
        }
    }
    Ok(index)
}

/// Collects distinct page titles in a SQLite staging table so memory stays
/// bounded by one batch. `finish` reads them back in byte order, assigns ids
/// and persists the index in the same store.
pub struct SqliteTitleCollector {
    conn: Connection,
    observed: u64,
}

impl SqliteTitleCollector {
    /// Opens (or creates) the store at `path` and clears any earlier staging rows.
    pub fn open(path: &Path) -> LinkRankResult<Self> {
        let conn = open_store(path)?;
        conn.execute("DELETE FROM title_staging;", [])?;
        Ok(Self { conn, observed: 0 })
    }

    /// Stage the page titles of one batch.
    pub fn observe_batch(&mut self, pairs: &[TitlePair]) -> LinkRankResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt =
                tx.prepare_cached("INSERT OR IGNORE INTO title_staging(title) VALUES (?1);")?;
            for pair in pairs {
                stmt.execute(params![pair.title])?;
            }
        }
        tx.commit()?;
        self.observed += pairs.len() as u64;
        Ok(())
    }

    pub fn observed(&self) -> u64 {
        self.observed
    }

    pub fn distinct(&self) -> LinkRankResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM title_staging;", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn finish(self) -> LinkRankResult<TitleIndex> {
        let titles = {
            let mut stmt = self
                .conn
                .prepare("SELECT title FROM title_staging ORDER BY title;")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<String>, _>>()?
        };
        let index = TitleIndex::from_sorted_unique(titles)?;
        write_titles(&self.conn, &index)?;
        self.conn.execute("DELETE FROM title_staging;", [])?;
        info!(
            observed = self.observed,
            distinct = index.len(),
            "title index built"
        );
        Ok(index)
    }
}
