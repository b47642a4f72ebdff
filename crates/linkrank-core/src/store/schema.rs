//! SQLite schema DDL and version stamp for the title store.

use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::{LinkRankError, LinkRankResult};

/// Written to `store_meta` on open. Stores stamped with a newer version are refused.
pub const SCHEMA_VERSION: i32 = 1;

const META_SCHEMA_VERSION: &str = "schema_version";

/// Safe to replay on an already-initialised database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS store_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    // TEXT compares with BINARY collation, i.e. bytewise, which matches id order.
    "CREATE TABLE IF NOT EXISTS titles (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL UNIQUE
    );",
    "CREATE TABLE IF NOT EXISTS title_staging (
        title TEXT PRIMARY KEY
    ) WITHOUT ROWID;",
];

pub const META_FINGERPRINT: &str = "index_fingerprint";
pub const META_NODE_COUNT: &str = "node_count";

/// Open `path` and apply the DDL.
pub fn open_store(path: &std::path::Path) -> LinkRankResult<Connection> {
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> LinkRankResult<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute_batch(statement)?;
    }
    let current = schema_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(LinkRankError::Corrupt(format!(
            "store schema version {current} is newer than supported version {SCHEMA_VERSION}"
        )));
    }
    if current < SCHEMA_VERSION {
        set_meta(conn, META_SCHEMA_VERSION, &SCHEMA_VERSION.to_string())?;
    }
    Ok(())
}

/// 0 when the key is absent.
pub fn schema_version(conn: &Connection) -> LinkRankResult<i32> {
    Ok(get_meta(conn, META_SCHEMA_VERSION)?
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(0))
}

pub fn get_meta(conn: &Connection, key: &str) -> LinkRankResult<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = ?1;",
            params![key],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(value.flatten())
}

pub fn set_meta(conn: &Connection, key: &str, value: &str) -> LinkRankResult<()> {
    conn.execute(
        "INSERT INTO store_meta(key, value) VALUES(?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        params![key, value],
    )?;
    Ok(())
}
