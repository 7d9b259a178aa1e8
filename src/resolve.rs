//! Heuristic symbol resolution.
//!
//! There is no real symbol table behind these functions, only names, file
//! paths, kinds and line spans. They pick the most plausible declaration and
//! return `None` when nothing plausible exists.

use crate::model::{Identifier, IdentifierKind, Symbol};
use crate::snapshot::SymbolSnapshot;

/// Pick the symbol an identifier most likely refers to.
///
/// Order of preference:
/// 1. the pre-resolved `target_symbol_id`, when it exists in the snapshot
/// 2. a same-named symbol declared in the identifier's file
/// 3. for calls, a function or method; for member accesses, a field or property
/// 4. the same-named symbol with the lowest id
///
/// Name matching here is always case-insensitive, whatever case sensitivity
/// the request used for its initial lookup.
pub fn resolve_target<'a>(
    identifier: &Identifier,
    snapshot: &'a SymbolSnapshot,
) -> Option<&'a Symbol> {
    if let Some(target) = identifier
        .target_symbol_id
        .and_then(|target_id| snapshot.get(target_id))
    {
        return Some(target);
    }

    let candidates = snapshot.named(&identifier.name);
    if candidates.is_empty() {
        return None;
    }

    if let Some(same_file) = candidates
        .iter()
        .find(|symbol| symbol.file_path == identifier.file_path)
        .copied()
    {
        return Some(same_file);
    }

    let by_kind = match identifier.kind {
        IdentifierKind::Call => candidates
            .iter()
            .find(|symbol| symbol.kind.is_callable())
            .copied(),
        IdentifierKind::MemberAccess => candidates
            .iter()
            .find(|symbol| symbol.kind.is_member_storage())
            .copied(),
        IdentifierKind::Other(_) => None,
    };
    if let Some(symbol) = by_kind {
        return Some(symbol);
    }

    candidates.first().copied()
}

/// Declarations shorter than this many lines are treated as signatures only.
const MIN_BODY_SPAN: i64 = 3;

/// Choose the most likely concrete implementation among same-named symbols.
///
/// Prefers the longest declaration outside interface-style files
/// (`IFoo.cs`) when it spans at least a few lines; otherwise falls back to
/// the longest candidate overall. Ties keep input order. Returns `None` only
/// for an empty slice.
pub fn select_best_implementation<'a>(candidates: &[&'a Symbol]) -> Option<&'a Symbol> {
    if candidates.len() == 1 {
        return Some(candidates[0]);
    }

    let concrete = longest(
        candidates
            .iter()
            .copied()
            .filter(|symbol| !looks_like_interface_file(&symbol.file_path)),
    );
    if let Some(symbol) = concrete {
        if symbol.line_span() >= MIN_BODY_SPAN {
            return Some(symbol);
        }
    }

    longest(candidates.iter().copied()).or_else(|| candidates.first().copied())
}

fn longest<'a>(symbols: impl Iterator<Item = &'a Symbol>) -> Option<&'a Symbol> {
    let mut best: Option<&Symbol> = None;
    for symbol in symbols {
        match best {
            Some(current) if symbol.line_span() <= current.line_span() => {}
            _ => best = Some(symbol),
        }
    }
    best
}

/// `IFoo.cs`, `src/IRepository.ts`: a leading `I` followed by an uppercase
/// letter in the file name.
pub fn looks_like_interface_file(path: &str) -> bool {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let mut chars = file_name.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('I'), Some(second)) if second.is_uppercase()
    )
}
