use anyhow::{Result, bail};
use rusqlite::{Connection, OptionalExtension};

pub const SCHEMA_VERSION: i64 = 1;

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        BEGIN;
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS symbols (
            seq INTEGER PRIMARY KEY,
            workspace TEXT NOT NULL,
            id INTEGER NOT NULL,
            name TEXT NOT NULL,
            name_folded TEXT NOT NULL,
            kind TEXT NOT NULL,
            file_path TEXT NOT NULL,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            UNIQUE(workspace, id)
        );

        CREATE INDEX IF NOT EXISTS idx_symbols_workspace ON symbols(workspace, seq);

        CREATE TABLE IF NOT EXISTS identifiers (
            seq INTEGER PRIMARY KEY,
            workspace TEXT NOT NULL,
            id INTEGER NOT NULL,
            name TEXT NOT NULL,
            name_folded TEXT NOT NULL,
            kind TEXT NOT NULL,
            file_path TEXT NOT NULL,
            line INTEGER,
            containing_symbol_id INTEGER,
            target_symbol_id INTEGER,
            UNIQUE(workspace, id)
        );

        CREATE INDEX IF NOT EXISTS idx_identifiers_name ON identifiers(workspace, name);
        CREATE INDEX IF NOT EXISTS idx_identifiers_name_folded ON identifiers(workspace, name_folded);
        CREATE INDEX IF NOT EXISTS idx_identifiers_container ON identifiers(workspace, containing_symbol_id);
        COMMIT;
        ",
    )?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| {
                row.get::<_, String>(0)
                    .map(|v| v.parse::<i64>().unwrap_or(0))
            },
        )
        .optional()?;

    let existing = existing.unwrap_or(0);
    if existing > SCHEMA_VERSION {
        bail!(
            "database schema version {existing} is newer than supported version {SCHEMA_VERSION}"
        );
    }

    if existing < SCHEMA_VERSION {
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('schema_version', ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [SCHEMA_VERSION.to_string()],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
        for row in rows {
            if row? == column {
                return Ok(true);
            }
        }
        Ok(false)
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert!(has_column(&conn, "identifiers", "line").unwrap());
        let version: String = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION.to_string());
    }

    #[test]
    fn fresh_schema_creates_identifier_columns() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        for column in ["line", "name_folded", "containing_symbol_id", "target_symbol_id"] {
            assert!(has_column(&conn, "identifiers", column).unwrap(), "{column}");
        }
        assert_eq!(SCHEMA_VERSION, 1);
    }

    #[test]
    fn newer_schema_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute(
            "UPDATE meta SET value = '99' WHERE key = 'schema_version'",
            [],
        )
        .unwrap();
        assert!(migrate(&conn).is_err());
    }
}
