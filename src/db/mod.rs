use crate::config::Config;
use crate::model::{
    Identifier, IdentifierKind, IndexDocument, Symbol, SymbolKind, WorkspaceStats,
};
use crate::store::SymbolStore;
use anyhow::{Context, Result, anyhow, bail};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

mod migrations;

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(())
    }

    fn on_release(&self, _conn: Connection) {}
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub symbols: usize,
    pub identifiers: usize,
}

pub struct Db {
    db_path: PathBuf,
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Pool<SqliteConnectionManager>,
}

impl Db {
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create db directory {}", parent.display()))?;
        }

        let config = Config::get();
        debug!(
            pool_size = config.pool_size,
            min_idle = config.pool_min_idle,
            "initializing connection pool"
        );

        // Open write connection first and run migrations
        let write_conn = Connection::open(db_path)
            .with_context(|| format!("open sqlite db at {}", db_path.display()))?;
        write_conn.busy_timeout(Duration::from_secs(30))?;
        write_conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        migrations::migrate(&write_conn)?;

        let write_conn = Arc::new(Mutex::new(write_conn));

        let manager = SqliteConnectionManager::file(db_path);
        let read_pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(config.pool_min_idle))
            .connection_timeout(Duration::from_secs(30))
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)
            .with_context(|| "create connection pool")?;

        info!(path = %db_path.display(), "database ready");

        Ok(Self {
            db_path: db_path.to_path_buf(),
            write_conn,
            read_pool,
        })
    }

    /// Get the database file path
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn read_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.read_pool
            .get()
            .with_context(|| "get read connection from pool")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.write_conn
            .lock()
            .map_err(|_| anyhow!("write connection lock poisoned"))
    }

    /// Load an index document into `workspace`. With `replace`, existing rows
    /// of the workspace are dropped first; otherwise rows with a known id are
    /// updated in place and keep their original store position.
    pub fn import_workspace(
        &self,
        workspace: &str,
        document: &IndexDocument,
        replace: bool,
    ) -> Result<ImportSummary> {
        for symbol in &document.symbols {
            if symbol.end_line < symbol.start_line {
                bail!(
                    "symbol {} ({}) ends on line {} before it starts on line {}",
                    symbol.id,
                    symbol.name,
                    symbol.end_line,
                    symbol.start_line
                );
            }
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if replace {
            tx.execute("DELETE FROM symbols WHERE workspace = ?", params![workspace])?;
            tx.execute(
                "DELETE FROM identifiers WHERE workspace = ?",
                params![workspace],
            )?;
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO symbols
                 (workspace, id, name, name_folded, kind, file_path, start_line, end_line)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(workspace, id) DO UPDATE SET
                    name = excluded.name,
                    name_folded = excluded.name_folded,
                    kind = excluded.kind,
                    file_path = excluded.file_path,
                    start_line = excluded.start_line,
                    end_line = excluded.end_line",
            )?;
            for symbol in &document.symbols {
                stmt.execute(params![
                    workspace,
                    symbol.id,
                    &symbol.name,
                    symbol.name.to_lowercase(),
                    symbol.kind.as_str(),
                    &symbol.file_path,
                    symbol.start_line,
                    symbol.end_line,
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO identifiers
                 (workspace, id, name, name_folded, kind, file_path, line,
                  containing_symbol_id, target_symbol_id)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(workspace, id) DO UPDATE SET
                    name = excluded.name,
                    name_folded = excluded.name_folded,
                    kind = excluded.kind,
                    file_path = excluded.file_path,
                    line = excluded.line,
                    containing_symbol_id = excluded.containing_symbol_id,
                    target_symbol_id = excluded.target_symbol_id",
            )?;
            for identifier in &document.identifiers {
                stmt.execute(params![
                    workspace,
                    identifier.id,
                    &identifier.name,
                    identifier.name.to_lowercase(),
                    identifier.kind.as_str(),
                    &identifier.file_path,
                    identifier.line,
                    identifier.containing_symbol_id,
                    identifier.target_symbol_id,
                ])?;
            }
        }
        tx.commit()?;

        let summary = ImportSummary {
            symbols: document.symbols.len(),
            identifiers: document.identifiers.len(),
        };
        info!(
            workspace,
            symbols = summary.symbols,
            identifiers = summary.identifiers,
            replace,
            "imported index document"
        );
        Ok(summary)
    }

    pub fn clear_workspace(&self, workspace: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM symbols WHERE workspace = ?", params![workspace])?;
        tx.execute(
            "DELETE FROM identifiers WHERE workspace = ?",
            params![workspace],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn list_workspaces(&self) -> Result<Vec<String>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT workspace FROM symbols
             UNION
             SELECT workspace FROM identifiers
             ORDER BY workspace",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut workspaces = Vec::new();
        for row in rows {
            workspaces.push(row?);
        }
        Ok(workspaces)
    }

    pub fn workspace_stats(&self, workspace: &str) -> Result<WorkspaceStats> {
        let conn = self.read_conn()?;
        let symbols: i64 = conn.query_row(
            "SELECT COUNT(*) FROM symbols WHERE workspace = ?",
            params![workspace],
            |row| row.get(0),
        )?;
        let (identifiers, call_identifiers, resolved_identifiers): (i64, i64, i64) = conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN kind = 'call' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN target_symbol_id IS NOT NULL THEN 1 ELSE 0 END), 0)
                 FROM identifiers
                 WHERE workspace = ?",
                params![workspace],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
        Ok(WorkspaceStats {
            workspace: workspace.to_string(),
            symbols,
            identifiers,
            call_identifiers,
            resolved_identifiers,
        })
    }

    pub fn get_symbol_by_id(&self, workspace: &str, id: i64) -> Result<Option<Symbol>> {
        self.read_conn()?
            .query_row(
                "SELECT id, name, kind, file_path, start_line, end_line
                 FROM symbols
                 WHERE workspace = ? AND id = ?",
                params![workspace, id],
                |row| symbol_from_row(row),
            )
            .optional()
            .map_err(Into::into)
    }

    fn query_identifiers(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Identifier>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| identifier_from_row(row))?;
        let mut identifiers = Vec::new();
        for row in rows {
            identifiers.push(row?);
        }
        Ok(identifiers)
    }
}

impl SymbolStore for Db {
    fn all_symbols(&self, workspace: &str) -> Result<Vec<Symbol>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, kind, file_path, start_line, end_line
             FROM symbols
             WHERE workspace = ?
             ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![workspace], |row| symbol_from_row(row))?;
        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row?);
        }
        Ok(symbols)
    }

    fn identifiers_by_name(
        &self,
        workspace: &str,
        name: &str,
        case_sensitive: bool,
    ) -> Result<Vec<Identifier>> {
        if case_sensitive {
            self.query_identifiers(
                &format!("{IDENTIFIER_SELECT} WHERE workspace = ? AND name = ? ORDER BY seq"),
                &[&workspace, &name],
            )
        } else {
            let folded = name.to_lowercase();
            self.query_identifiers(
                &format!(
                    "{IDENTIFIER_SELECT} WHERE workspace = ? AND name_folded = ? ORDER BY seq"
                ),
                &[&workspace, &folded],
            )
        }
    }

    fn identifiers_by_containing_symbol(
        &self,
        workspace: &str,
        symbol_id: i64,
    ) -> Result<Vec<Identifier>> {
        self.query_identifiers(
            &format!(
                "{IDENTIFIER_SELECT} WHERE workspace = ? AND containing_symbol_id = ? ORDER BY seq"
            ),
            &[&workspace, &symbol_id],
        )
    }
}

const IDENTIFIER_SELECT: &str = "SELECT id, name, kind, file_path, line, containing_symbol_id, target_symbol_id
     FROM identifiers";

fn symbol_from_row(row: &Row<'_>) -> rusqlite::Result<Symbol> {
    let kind: String = row.get(2)?;
    Ok(Symbol {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: SymbolKind::from(kind.as_str()),
        file_path: row.get(3)?,
        start_line: row.get(4)?,
        end_line: row.get(5)?,
    })
}

fn identifier_from_row(row: &Row<'_>) -> rusqlite::Result<Identifier> {
    let kind: String = row.get(2)?;
    Ok(Identifier {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: IdentifierKind::from(kind.as_str()),
        file_path: row.get(3)?,
        line: row.get(4)?,
        containing_symbol_id: row.get(5)?,
        target_symbol_id: row.get(6)?,
    })
}
