//! Read-only access to extracted symbols and identifiers.
//!
//! The engine only ever reads through [`SymbolStore`]. `Db` is the SQLite
//! backed implementation; [`MemoryStore`] keeps everything in vectors and is
//! handy for embedding and for tests.

use crate::model::{Identifier, Symbol};
use anyhow::Result;
use std::collections::HashMap;

pub trait SymbolStore: Send + Sync {
    /// Every symbol of the workspace, in store order.
    fn all_symbols(&self, workspace: &str) -> Result<Vec<Symbol>>;

    /// Identifiers whose name equals `name`, in store order.
    fn identifiers_by_name(
        &self,
        workspace: &str,
        name: &str,
        case_sensitive: bool,
    ) -> Result<Vec<Identifier>>;

    /// Identifiers lexically contained in the symbol `symbol_id`, in store order.
    fn identifiers_by_containing_symbol(
        &self,
        workspace: &str,
        symbol_id: i64,
    ) -> Result<Vec<Identifier>>;
}

#[derive(Debug, Default, Clone)]
struct WorkspaceData {
    symbols: Vec<Symbol>,
    identifiers: Vec<Identifier>,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    workspaces: HashMap<String, WorkspaceData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_symbol(&mut self, workspace: &str, symbol: Symbol) {
        self.workspaces
            .entry(workspace.to_string())
            .or_default()
            .symbols
            .push(symbol);
    }

    pub fn add_identifier(&mut self, workspace: &str, identifier: Identifier) {
        self.workspaces
            .entry(workspace.to_string())
            .or_default()
            .identifiers
            .push(identifier);
    }
}

impl SymbolStore for MemoryStore {
    fn all_symbols(&self, workspace: &str) -> Result<Vec<Symbol>> {
        Ok(self
            .workspaces
            .get(workspace)
            .map(|data| data.symbols.clone())
            .unwrap_or_default())
    }

    fn identifiers_by_name(
        &self,
        workspace: &str,
        name: &str,
        case_sensitive: bool,
    ) -> Result<Vec<Identifier>> {
        let Some(data) = self.workspaces.get(workspace) else {
            return Ok(Vec::new());
        };
        Ok(data
            .identifiers
            .iter()
            .filter(|ident| names_match(&ident.name, name, case_sensitive))
            .cloned()
            .collect())
    }

    fn identifiers_by_containing_symbol(
        &self,
        workspace: &str,
        symbol_id: i64,
    ) -> Result<Vec<Identifier>> {
        let Some(data) = self.workspaces.get(workspace) else {
            return Ok(Vec::new());
        };
        Ok(data
            .identifiers
            .iter()
            .filter(|ident| ident.containing_symbol_id == Some(symbol_id))
            .cloned()
            .collect())
    }
}

pub fn names_match(left: &str, right: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        left == right
    } else {
        left.to_lowercase() == right.to_lowercase()
    }
}
