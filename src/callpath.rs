//! Depth-bounded call-path tracing.
//!
//! Upward tracing walks call sites of a name to the functions containing
//! them; downward tracing walks the call sites inside a function to the
//! functions they resolve to. Each level is keyed by a bare name and only
//! `max_depth` bounds the recursion, so cyclic graphs terminate but expand
//! repeatedly unless `suppress_cycles` is set.

use crate::config::Config;
use crate::error::{TraceError, TraceResult};
use crate::model::{
    BidirectionalCallPath, CallDirection, CallPathNode, IdentifierKind, TraceSummary,
};
use crate::resolve::{resolve_target, select_best_implementation};
use crate::snapshot::SymbolSnapshot;
use crate::store::SymbolStore;
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, Span, debug, dispatcher, info, info_span, warn};

pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Default for `Config::max_depth_limit`. Every level of a trace is a native
/// stack frame, so requested depths are clamped to this.
pub const MAX_DEPTH_LIMIT: usize = 32;

/// Hard upper bound for a configured `max_depth_limit`.
pub const MAX_DEPTH_CEILING: usize = 256;

/// Which way to walk the call graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraceDirection {
    Up,
    Down,
    #[default]
    Both,
}

impl TraceDirection {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "up" | "upward" | "callers" | "in" => Some(TraceDirection::Up),
            "down" | "downward" | "callees" | "out" => Some(TraceDirection::Down),
            "both" | "all" => Some(TraceDirection::Both),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TraceDirection::Up => "up",
            TraceDirection::Down => "down",
            TraceDirection::Both => "both",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceOptions {
    /// Deepest node depth emitted; nodes at this depth have no children.
    pub max_depth: usize,
    /// Applies to the lookup of the traced name, not to target resolution.
    pub case_sensitive: bool,
    /// Stop expanding a symbol already on the current branch.
    pub suppress_cycles: bool,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            case_sensitive: false,
            suppress_cycles: false,
        }
    }
}

impl TraceOptions {
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }

    /// `max_depth` clamped to the configured depth limit.
    pub fn effective_max_depth(&self) -> usize {
        self.max_depth.min(Config::get().max_depth_limit)
    }
}

/// Callers of `symbol_name`, recursively.
pub fn trace_upward(
    store: &dyn SymbolStore,
    workspace: &str,
    symbol_name: &str,
    options: &TraceOptions,
    cancel: &CancellationToken,
) -> TraceResult<Vec<CallPathNode>> {
    let _span = info_span!("trace_upward", symbol = symbol_name, max_depth = options.max_depth)
        .entered();
    let snapshot = SymbolSnapshot::load(store, workspace, cancel)?;
    let tracer = Tracer::new(store, workspace, &snapshot, options, cancel);
    let nodes = tracer.upward(symbol_name, 0, &mut Vec::new())?;
    report_size(symbol_name, &nodes);
    Ok(nodes)
}

/// Callees of `symbol_name`, recursively.
pub fn trace_downward(
    store: &dyn SymbolStore,
    workspace: &str,
    symbol_name: &str,
    options: &TraceOptions,
    cancel: &CancellationToken,
) -> TraceResult<Vec<CallPathNode>> {
    let _span = info_span!("trace_downward", symbol = symbol_name, max_depth = options.max_depth)
        .entered();
    let snapshot = SymbolSnapshot::load(store, workspace, cancel)?;
    let tracer = Tracer::new(store, workspace, &snapshot, options, cancel);
    let nodes = tracer.downward(symbol_name, 0, &mut Vec::new())?;
    report_size(symbol_name, &nodes);
    Ok(nodes)
}

/// Callers and callees of `symbol_name`, traced concurrently over one
/// snapshot. Fails with [`TraceError::SymbolNotFound`] when no symbol has
/// that name.
pub fn trace_both_directions(
    store: &dyn SymbolStore,
    workspace: &str,
    symbol_name: &str,
    options: &TraceOptions,
    cancel: &CancellationToken,
) -> TraceResult<BidirectionalCallPath> {
    let _span = info_span!("trace_both_directions", symbol = symbol_name, max_depth = options.max_depth)
        .entered();
    let snapshot = SymbolSnapshot::load(store, workspace, cancel)?;
    let candidates = snapshot.matching(symbol_name, options.case_sensitive);
    let target_symbol = select_best_implementation(&candidates)
        .cloned()
        .ok_or_else(|| TraceError::SymbolNotFound {
            name: symbol_name.to_string(),
        })?;

    let tracer = Tracer::new(store, workspace, &snapshot, options, cancel);
    let span = Span::current();
    let dispatch = dispatcher::get_default(Dispatch::clone);
    let (callers, callees) = std::thread::scope(|scope| {
        let upward = scope.spawn(|| {
            dispatcher::with_default(&dispatch, || {
                span.in_scope(|| tracer.upward(symbol_name, 0, &mut Vec::new()))
            })
        });
        let callees = tracer.downward(symbol_name, 0, &mut Vec::new());
        let callers = upward
            .join()
            .unwrap_or_else(|payload| std::panic::resume_unwind(payload));
        (callers, callees)
    });
    let callers = callers?;
    let callees = callees?;

    report_size(symbol_name, &callers);
    report_size(symbol_name, &callees);
    Ok(BidirectionalCallPath {
        target_symbol,
        callers,
        callees,
    })
}

struct Tracer<'a> {
    store: &'a dyn SymbolStore,
    workspace: &'a str,
    snapshot: &'a SymbolSnapshot,
    options: &'a TraceOptions,
    max_depth: usize,
    cancel: &'a CancellationToken,
}

impl<'a> Tracer<'a> {
    fn new(
        store: &'a dyn SymbolStore,
        workspace: &'a str,
        snapshot: &'a SymbolSnapshot,
        options: &'a TraceOptions,
        cancel: &'a CancellationToken,
    ) -> Self {
        let max_depth = options.effective_max_depth();
        if max_depth < options.max_depth {
            warn!(
                requested = options.max_depth,
                max_depth, "trace depth clamped to the configured limit"
            );
        }
        Self {
            store,
            workspace,
            snapshot,
            options,
            max_depth,
            cancel,
        }
    }

    fn checkpoint(&self) -> TraceResult<()> {
        if self.cancel.is_cancelled() {
            return Err(TraceError::Cancelled);
        }
        Ok(())
    }

    /// `branch` holds the ids of callers already expanded on this branch.
    fn upward(
        &self,
        symbol_name: &str,
        depth: usize,
        branch: &mut Vec<i64>,
    ) -> TraceResult<Vec<CallPathNode>> {
        if depth > self.max_depth {
            return Ok(Vec::new());
        }
        self.checkpoint()?;

        let mut call_sites = self.store.identifiers_by_name(
            self.workspace,
            symbol_name,
            self.options.case_sensitive,
        )?;
        call_sites.retain(|ident| ident.kind == IdentifierKind::Call);
        if call_sites.is_empty() {
            if depth == 0 {
                info!("no call sites found for {symbol_name}");
            }
            return Ok(Vec::new());
        }
        debug!(depth, count = call_sites.len(), "upward level for {symbol_name}");

        let mut nodes = Vec::with_capacity(call_sites.len());
        for identifier in call_sites {
            let caller = identifier
                .containing_symbol_id
                .and_then(|id| self.snapshot.get(id));
            let target = resolve_target(&identifier, self.snapshot);
            let mut node = CallPathNode::new(
                identifier,
                caller.cloned(),
                target.cloned(),
                depth,
                CallDirection::Upward,
            );
            if let Some(caller) = caller {
                if self.options.suppress_cycles && branch.contains(&caller.id) {
                    debug!("cycle through {} at depth {depth}", caller.name);
                } else {
                    branch.push(caller.id);
                    node.children = self.upward(&caller.name, depth + 1, branch)?;
                    branch.pop();
                }
            }
            nodes.push(node);
        }
        Ok(nodes)
    }

    /// `branch` holds the ids of functions already expanded on this branch.
    fn downward(
        &self,
        symbol_name: &str,
        depth: usize,
        branch: &mut Vec<i64>,
    ) -> TraceResult<Vec<CallPathNode>> {
        if depth > self.max_depth {
            return Ok(Vec::new());
        }

        let candidates = self
            .snapshot
            .matching(symbol_name, self.options.case_sensitive);
        let Some(root) = select_best_implementation(&candidates) else {
            if depth == 0 {
                warn!("symbol {symbol_name} not found");
            }
            return Ok(Vec::new());
        };
        if self.options.suppress_cycles && branch.contains(&root.id) {
            debug!("cycle through {} at depth {depth}", root.name);
            return Ok(Vec::new());
        }
        self.checkpoint()?;

        let mut call_sites = self
            .store
            .identifiers_by_containing_symbol(self.workspace, root.id)?;
        call_sites.retain(|ident| ident.kind == IdentifierKind::Call);
        if call_sites.is_empty() {
            return Ok(Vec::new());
        }
        debug!(depth, count = call_sites.len(), "downward level for {}", root.name);

        branch.push(root.id);
        let mut nodes = Vec::with_capacity(call_sites.len());
        for identifier in call_sites {
            let target = resolve_target(&identifier, self.snapshot);
            let mut node = CallPathNode::new(
                identifier,
                Some(root.clone()),
                target.cloned(),
                depth,
                CallDirection::Downward,
            );
            if let Some(target) = target {
                node.children = self.downward(&target.name, depth + 1, branch)?;
            }
            nodes.push(node);
        }
        branch.pop();
        Ok(nodes)
    }
}

fn report_size(symbol_name: &str, nodes: &[CallPathNode]) {
    let summary = TraceSummary::from_nodes(nodes);
    let limit = Config::get().max_nodes_warn;
    if summary.total_nodes > limit {
        warn!(
            total_nodes = summary.total_nodes,
            limit, "call path for {symbol_name} is unusually large"
        );
    }
}
