//! Flat "find all references" queries.

use crate::error::{TraceError, TraceResult};
use crate::model::{Identifier, ResolvedReference};
use crate::resolve::resolve_target;
use crate::snapshot::SymbolSnapshot;
use crate::store::SymbolStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span};

/// Every identifier named `symbol_name`, paired with its containing symbol
/// and its most likely target. Unresolved identifiers are kept.
pub fn find_references(
    store: &dyn SymbolStore,
    workspace: &str,
    symbol_name: &str,
    case_sensitive: bool,
    cancel: &CancellationToken,
) -> TraceResult<Vec<ResolvedReference>> {
    let _span = info_span!("find_references", symbol = symbol_name, case_sensitive).entered();
    if cancel.is_cancelled() {
        return Err(TraceError::Cancelled);
    }
    let identifiers = store.identifiers_by_name(workspace, symbol_name, case_sensitive)?;
    if identifiers.is_empty() {
        debug!("no identifiers named {symbol_name}");
        return Ok(Vec::new());
    }
    let snapshot = SymbolSnapshot::load(store, workspace, cancel)?;
    Ok(resolve_references(identifiers, &snapshot))
}

/// References to the symbol with id `symbol_id`, matched by its name without
/// regard to case. An unknown id yields an empty list.
pub fn find_references_by_symbol_id(
    store: &dyn SymbolStore,
    workspace: &str,
    symbol_id: i64,
    cancel: &CancellationToken,
) -> TraceResult<Vec<ResolvedReference>> {
    let _span = info_span!("find_references_by_symbol_id", symbol_id).entered();
    let snapshot = SymbolSnapshot::load(store, workspace, cancel)?;
    let Some(symbol) = snapshot.get(symbol_id) else {
        debug!("symbol id {symbol_id} not in workspace");
        return Ok(Vec::new());
    };
    if cancel.is_cancelled() {
        return Err(TraceError::Cancelled);
    }
    let identifiers = store.identifiers_by_name(workspace, &symbol.name, false)?;
    Ok(resolve_references(identifiers, &snapshot))
}

pub fn resolve_references(
    identifiers: Vec<Identifier>,
    snapshot: &SymbolSnapshot,
) -> Vec<ResolvedReference> {
    identifiers
        .into_iter()
        .map(|identifier| {
            let containing_symbol = identifier
                .containing_symbol_id
                .and_then(|id| snapshot.get(id))
                .cloned();
            let target_symbol = resolve_target(&identifier, snapshot).cloned();
            ResolvedReference {
                identifier,
                containing_symbol,
                target_symbol,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IdentifierKind, Symbol, SymbolKind};
    use crate::store::MemoryStore;

    const WS: &str = "/ws";

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.add_symbol(
            WS,
            Symbol {
                id: 1,
                name: "Save".to_string(),
                kind: SymbolKind::Method,
                file_path: "Repo.cs".to_string(),
                start_line: 10,
                end_line: 20,
            },
        );
        store.add_symbol(
            WS,
            Symbol {
                id: 2,
                name: "Handle".to_string(),
                kind: SymbolKind::Method,
                file_path: "Handler.cs".to_string(),
                start_line: 1,
                end_line: 30,
            },
        );
        store.add_identifier(
            WS,
            Identifier {
                id: 100,
                name: "Save".to_string(),
                kind: IdentifierKind::Call,
                file_path: "Handler.cs".to_string(),
                line: Some(5),
                containing_symbol_id: Some(2),
                target_symbol_id: None,
            },
        );
        store.add_identifier(
            WS,
            Identifier {
                id: 101,
                name: "save".to_string(),
                kind: IdentifierKind::Call,
                file_path: "Script.js".to_string(),
                line: Some(1),
                containing_symbol_id: Some(404),
                target_symbol_id: None,
            },
        );
        store.add_identifier(
            WS,
            Identifier {
                id: 102,
                name: "Flush".to_string(),
                kind: IdentifierKind::Call,
                file_path: "Handler.cs".to_string(),
                line: Some(6),
                containing_symbol_id: Some(2),
                target_symbol_id: None,
            },
        );
        store
    }

    #[test]
    fn resolves_container_and_target() {
        let store = store();
        let cancel = CancellationToken::new();
        let refs = find_references(&store, WS, "Save", true, &cancel).unwrap();
        assert_eq!(refs.len(), 1);
        let reference = &refs[0];
        assert!(reference.is_resolved());
        assert_eq!(reference.target_symbol.as_ref().map(|s| s.id), Some(1));
        assert_eq!(
            reference.containing_symbol.as_ref().map(|s| s.name.as_str()),
            Some("Handle")
        );
    }

    #[test]
    fn keeps_missing_containers_as_unknown() {
        let store = store();
        let cancel = CancellationToken::new();
        let refs = find_references(&store, WS, "save", false, &cancel).unwrap();
        assert_eq!(refs.len(), 2);
        assert!(refs[1].containing_symbol.is_none());
        assert!(refs[1].is_resolved());
    }

    #[test]
    fn unresolved_identifiers_are_returned() {
        let store = store();
        let cancel = CancellationToken::new();
        let refs = find_references(&store, WS, "Flush", false, &cancel).unwrap();
        assert_eq!(refs.len(), 1);
        assert!(!refs[0].is_resolved());
    }

    #[test]
    fn no_identifiers_is_empty() {
        let store = store();
        let cancel = CancellationToken::new();
        assert!(find_references(&store, WS, "Nope", false, &cancel).unwrap().is_empty());
    }

    #[test]
    fn by_symbol_id_matches_name_case_insensitively() {
        let store = store();
        let cancel = CancellationToken::new();
        let refs = find_references_by_symbol_id(&store, WS, 1, &cancel).unwrap();
        let ids: Vec<i64> = refs.iter().map(|r| r.identifier.id).collect();
        assert_eq!(ids, vec![100, 101]);
    }

    #[test]
    fn unknown_symbol_id_is_empty() {
        let store = store();
        let cancel = CancellationToken::new();
        assert!(find_references_by_symbol_id(&store, WS, 999, &cancel).unwrap().is_empty());
    }

    #[test]
    fn cancelled_request_fails_fast() {
        let store = store();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = find_references(&store, WS, "Save", false, &cancel).unwrap_err();
        assert!(matches!(err, TraceError::Cancelled));
    }
}
