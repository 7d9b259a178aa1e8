//! Plain-text rendering of call trees.

use crate::model::{BidirectionalCallPath, CallDirection, CallPathNode, Symbol};
use std::fmt::Write;

const INDENT: &str = "  ";

/// One line per node, children indented under their parent:
///
/// ```text
/// handle -> save  (src/handler.rs:12)
///   save -> flush  (src/repo.rs:40)
/// ```
///
/// Upward nodes read `caller -> called`, downward nodes read
/// `container -> target`. A `?` marks an end that could not be resolved.
pub fn render_tree(nodes: &[CallPathNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        render_node_at(&mut out, node, 0);
    }
    out
}

pub fn render_bidirectional(path: &BidirectionalCallPath) -> String {
    let mut out = String::new();
    let target = &path.target_symbol;
    let _ = writeln!(
        out,
        "{} [{}] {}:{}-{}",
        target.name, target.kind, target.file_path, target.start_line, target.end_line
    );
    out.push_str("callers:\n");
    if path.callers.is_empty() {
        out.push_str("  (none)\n");
    }
    for node in &path.callers {
        render_node_at(&mut out, node, 1);
    }
    out.push_str("callees:\n");
    if path.callees.is_empty() {
        out.push_str("  (none)\n");
    }
    for node in &path.callees {
        render_node_at(&mut out, node, 1);
    }
    out
}

fn render_node_at(out: &mut String, node: &CallPathNode, offset: usize) {
    let from = symbol_label(node.containing_symbol.as_ref());
    let to = match node.direction {
        CallDirection::Upward => node.identifier.name.clone(),
        CallDirection::Downward => node
            .target_symbol
            .as_ref()
            .map(|symbol| symbol.name.clone())
            .unwrap_or_else(|| format!("{}?", node.identifier.name)),
    };
    let location = match node.identifier.line {
        Some(line) => format!("{}:{}", node.identifier.file_path, line),
        None => node.identifier.file_path.clone(),
    };
    let _ = writeln!(
        out,
        "{}{} -> {}  ({})",
        INDENT.repeat(offset + node.depth),
        from,
        to,
        location
    );
    for child in &node.children {
        render_node_at(out, child, offset);
    }
}

fn symbol_label(symbol: Option<&Symbol>) -> String {
    symbol
        .map(|symbol| symbol.name.clone())
        .unwrap_or_else(|| "?".to_string())
}
