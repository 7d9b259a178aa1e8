//! Per-request, immutable view of a workspace's symbols.
//!
//! Built once from `SymbolStore::all_symbols` and then only borrowed, so
//! traversal branches running on different threads can share it freely.

use crate::error::{TraceError, TraceResult};
use crate::model::Symbol;
use crate::store::{SymbolStore, names_match};
use std::collections::HashMap;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Default)]
pub struct SymbolSnapshot {
    symbols: Vec<Symbol>,
    by_id: HashMap<i64, usize>,
    // lowercased name -> indexes into `symbols`, ascending symbol id
    by_name: HashMap<String, Vec<usize>>,
}

impl SymbolSnapshot {
    /// Fetch every symbol of `workspace` once and index it.
    pub fn load(
        store: &dyn SymbolStore,
        workspace: &str,
        cancel: &CancellationToken,
    ) -> TraceResult<Self> {
        if cancel.is_cancelled() {
            return Err(TraceError::Cancelled);
        }
        let start = Instant::now();
        let symbols = store.all_symbols(workspace)?;
        let snapshot = Self::new(symbols);
        debug!(
            workspace,
            symbols = snapshot.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "loaded symbol snapshot"
        );
        Ok(snapshot)
    }

    pub fn new(symbols: Vec<Symbol>) -> Self {
        let mut by_id = HashMap::with_capacity(symbols.len());
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, symbol) in symbols.iter().enumerate() {
            by_id.entry(symbol.id).or_insert(idx);
            by_name
                .entry(symbol.name.to_lowercase())
                .or_default()
                .push(idx);
        }
        for indexes in by_name.values_mut() {
            indexes.sort_by_key(|idx| (symbols[*idx].id, *idx));
        }
        Self {
            symbols,
            by_id,
            by_name,
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Symbol> {
        self.by_id.get(&id).map(|idx| &self.symbols[*idx])
    }

    /// Symbols whose name equals `name` ignoring case, ordered by id.
    pub fn named(&self, name: &str) -> Vec<&Symbol> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|indexes| indexes.iter().map(|idx| &self.symbols[*idx]).collect())
            .unwrap_or_default()
    }

    /// Like [`named`](Self::named) but honouring the caller's case sensitivity.
    pub fn matching(&self, name: &str, case_sensitive: bool) -> Vec<&Symbol> {
        let mut matches = self.named(name);
        if case_sensitive {
            matches.retain(|symbol| names_match(&symbol.name, name, true));
        }
        matches
    }
}
