use crate::callpath::{self, TraceDirection, TraceOptions};
use crate::config::Config;
use crate::db::Db;
use crate::model::{IndexDocument, ResolvedReference, TraceSummary};
use crate::{references, render, util};
use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[derive(Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct RpcResponse {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize)]
struct RpcError {
    message: String,
}

#[derive(Deserialize)]
struct ImportParams {
    path: String,
    append: Option<bool>,
}

#[derive(Deserialize)]
struct FindReferencesParams {
    #[serde(alias = "symbol", alias = "query")]
    name: String,
    case_sensitive: Option<bool>,
    resolved_only: Option<bool>,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct FindReferencesByIdParams {
    #[serde(alias = "symbol_id")]
    id: i64,
    resolved_only: Option<bool>,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct GetSymbolParams {
    #[serde(alias = "symbol_id")]
    id: i64,
}

#[derive(Deserialize)]
struct TraceParams {
    #[serde(alias = "symbol", alias = "query")]
    name: String,
    direction: Option<String>,
    #[serde(alias = "depth")]
    max_depth: Option<usize>,
    case_sensitive: Option<bool>,
    suppress_cycles: Option<bool>,
    format: Option<String>,
}

const MAX_RESPONSE_LIMIT: usize = 500;

pub const METHOD_LIST: &[&str] = &[
    "help",
    "list_methods",
    "stats",
    "import",
    "clear",
    "list_workspaces",
    "get_symbol",
    "find_references",
    "find_references_by_id",
    "trace_call_path",
];

const METHOD_ALIASES: &[(&str, &str)] = &[
    ("references", "find_references"),
    ("references_by_id", "find_references_by_id"),
    ("trace", "trace_call_path"),
];

struct MethodDoc {
    name: &'static str,
    summary: &'static str,
    params: &'static str,
}

const METHOD_DOCS: &[MethodDoc] = &[
    MethodDoc {
        name: "help",
        summary: "Describe available methods.",
        params: "{}",
    },
    MethodDoc {
        name: "list_methods",
        summary: "List method names and aliases.",
        params: "{}",
    },
    MethodDoc {
        name: "stats",
        summary: "Count symbols and identifiers stored for the workspace.",
        params: "{}",
    },
    MethodDoc {
        name: "import",
        summary: "Load an index document ({symbols, identifiers}) into the workspace.",
        params: "{path, append}",
    },
    MethodDoc {
        name: "clear",
        summary: "Delete every symbol and identifier stored for the workspace.",
        params: "{}",
    },
    MethodDoc {
        name: "list_workspaces",
        summary: "Workspaces present in the database file.",
        params: "{}",
    },
    MethodDoc {
        name: "get_symbol",
        summary: "One symbol by id, or null.",
        params: "{id}",
    },
    MethodDoc {
        name: "find_references",
        summary: "Every usage of a name with its containing and most likely target symbol.",
        params: "{name, case_sensitive, resolved_only, limit}",
    },
    MethodDoc {
        name: "find_references_by_id",
        summary: "References to a symbol id, matched by name ignoring case.",
        params: "{id, resolved_only, limit}",
    },
    MethodDoc {
        name: "trace_call_path",
        summary: "Callers (up), callees (down) or both, as depth-bounded trees.",
        params: "{name, direction (up|down|both), max_depth, case_sensitive, suppress_cycles, format (json|tree)}",
    },
];

fn canonical_method(method: &str) -> &str {
    METHOD_ALIASES
        .iter()
        .find(|(alias, _)| *alias == method)
        .map(|(_, target)| *target)
        .unwrap_or(method)
}

fn method_help() -> Value {
    let methods: Vec<Value> = METHOD_DOCS
        .iter()
        .map(|doc| {
            json!({
                "name": doc.name,
                "summary": doc.summary,
                "params": doc.params,
            })
        })
        .collect();
    json!({
        "methods": methods,
        "notes": [
            "Name lookups ignore case unless case_sensitive is true; target resolution always ignores case.",
            "Empty results mean nothing was found; trace_call_path with direction both fails when the symbol does not exist.",
        ],
    })
}

fn method_list() -> Value {
    let aliases: serde_json::Map<String, Value> = METHOD_ALIASES
        .iter()
        .map(|(alias, target)| (alias.to_string(), Value::String(target.to_string())))
        .collect();
    json!({ "methods": METHOD_LIST, "aliases": aliases })
}

/// A database handle bound to one workspace.
pub struct Session {
    db: Db,
    workspace: String,
    workspace_root: PathBuf,
}

impl Session {
    pub fn open(workspace_root: &Path, db_path: &Path) -> Result<Self> {
        let db = Db::new(db_path)?;
        Ok(Self {
            db,
            workspace: util::workspace_key(workspace_root),
            workspace_root: workspace_root.to_path_buf(),
        })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}

pub fn serve(workspace_root: PathBuf, db_path: PathBuf) -> Result<()> {
    let session = Session::open(&workspace_root, &db_path)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(value) => value,
            Err(err) => {
                error!("stdin error: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => handle_request(&session, request),
            Err(err) => error_response(Value::Null, &format!("invalid request: {err}")),
        };

        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }

    Ok(())
}

pub fn call(
    workspace_root: PathBuf,
    db_path: PathBuf,
    method: String,
    params_raw: &str,
    id_raw: &str,
) -> Result<String> {
    let params: Value = serde_json::from_str(params_raw).with_context(|| "parse params JSON")?;
    let id = parse_value(id_raw);
    let session = Session::open(&workspace_root, &db_path)?;
    let request = RpcRequest { id, method, params };
    let response = handle_request(&session, request);
    Ok(serde_json::to_string(&response)?)
}

fn handle_request(session: &Session, req: RpcRequest) -> RpcResponse {
    let id = req.id.clone();
    match handle_method(session, &req.method, req.params) {
        Ok(value) => RpcResponse {
            id,
            result: Some(value),
            error: None,
        },
        Err(err) => error_response(id, &err.to_string()),
    }
}

pub fn handle_method(session: &Session, method: &str, params: Value) -> Result<Value> {
    let start = Instant::now();
    let params = if params.is_null() { json!({}) } else { params };
    let method = canonical_method(method);
    let cancel = CancellationToken::new();
    let workspace = session.workspace();

    let value = match method {
        "help" => method_help(),
        "list_methods" => method_list(),
        "stats" => json!(session.db().workspace_stats(workspace)?),
        "import" => {
            let params: ImportParams = serde_json::from_value(params)?;
            let path = util::resolve_relative(session.workspace_root(), Path::new(&params.path));
            let raw = util::read_to_string(&path)?;
            let document: IndexDocument = serde_json::from_str(&raw)
                .with_context(|| format!("parse index document {}", path.display()))?;
            let replace = !params.append.unwrap_or(false);
            json!(session.db().import_workspace(workspace, &document, replace)?)
        }
        "clear" => {
            session.db().clear_workspace(workspace)?;
            json!({ "cleared": workspace })
        }
        "list_workspaces" => json!({
            "db_path": session.db().db_path().to_string_lossy(),
            "workspaces": session.db().list_workspaces()?,
        }),
        "get_symbol" => {
            let params: GetSymbolParams = serde_json::from_value(params)?;
            json!(session.db().get_symbol_by_id(workspace, params.id)?)
        }
        "find_references" => {
            let params: FindReferencesParams = serde_json::from_value(params)?;
            let refs = references::find_references(
                session.db(),
                workspace,
                &params.name,
                params.case_sensitive.unwrap_or(false),
                &cancel,
            )?;
            references_response(
                json!(params.name),
                refs,
                params.resolved_only.unwrap_or(false),
                params.limit,
            )
        }
        "find_references_by_id" => {
            let params: FindReferencesByIdParams = serde_json::from_value(params)?;
            let refs =
                references::find_references_by_symbol_id(session.db(), workspace, params.id, &cancel)?;
            references_response(
                json!(params.id),
                refs,
                params.resolved_only.unwrap_or(false),
                params.limit,
            )
        }
        "trace_call_path" => {
            let params: TraceParams = serde_json::from_value(params)?;
            trace_call_path(session, params, &cancel)?
        }
        other => bail!("unknown method: {other}"),
    };

    debug!(
        method,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "handled request"
    );
    Ok(value)
}

fn references_response(
    query: Value,
    mut refs: Vec<ResolvedReference>,
    resolved_only: bool,
    limit: Option<usize>,
) -> Value {
    let total = refs.len();
    let resolved = refs.iter().filter(|reference| reference.is_resolved()).count();
    if resolved_only {
        refs.retain(ResolvedReference::is_resolved);
    }
    let limit = limit.unwrap_or(MAX_RESPONSE_LIMIT).min(MAX_RESPONSE_LIMIT);
    let truncated = refs.len() > limit;
    refs.truncate(limit);
    json!({
        "query": query,
        "total": total,
        "resolved": resolved,
        "truncated": truncated,
        "references": refs,
    })
}

fn trace_call_path(
    session: &Session,
    params: TraceParams,
    cancel: &CancellationToken,
) -> Result<Value> {
    let direction = match params.direction.as_deref() {
        None => TraceDirection::Both,
        Some(raw) => TraceDirection::parse(raw)
            .ok_or_else(|| anyhow!("invalid direction: {raw} (expected up, down or both)"))?,
    };
    let as_tree = match params.format.as_deref() {
        None | Some("json") => false,
        Some("tree") | Some("text") => true,
        Some(other) => bail!("invalid format: {other} (expected json or tree)"),
    };
    let config = Config::get();
    let requested_depth = params.max_depth.unwrap_or(config.default_max_depth);
    let options = TraceOptions {
        max_depth: requested_depth.min(config.max_depth_limit),
        case_sensitive: params.case_sensitive.unwrap_or(false),
        suppress_cycles: params.suppress_cycles.unwrap_or(false),
    };
    let db = session.db();
    let workspace = session.workspace();
    let name = params.name.as_str();

    let mut result = json!({
        "symbol": name,
        "direction": direction.as_str(),
        "max_depth": options.max_depth,
    });
    if requested_depth > options.max_depth {
        result["requested_max_depth"] = json!(requested_depth);
    }
    match direction {
        TraceDirection::Up => {
            let callers = callpath::trace_upward(db, workspace, name, &options, cancel)?;
            result["summary"] = json!(TraceSummary::from_nodes(&callers));
            if as_tree {
                result["text"] = json!(render::render_tree(&callers));
            } else {
                result["callers"] = json!(callers);
            }
        }
        TraceDirection::Down => {
            let callees = callpath::trace_downward(db, workspace, name, &options, cancel)?;
            result["summary"] = json!(TraceSummary::from_nodes(&callees));
            if as_tree {
                result["text"] = json!(render::render_tree(&callees));
            } else {
                result["callees"] = json!(callees);
            }
        }
        TraceDirection::Both => {
            let path = callpath::trace_both_directions(db, workspace, name, &options, cancel)?;
            let mut summary = TraceSummary::from_nodes(&path.callers);
            summary.add(&path.callees);
            result["summary"] = json!(summary);
            if as_tree {
                result["text"] = json!(render::render_bidirectional(&path));
            } else {
                result["target_symbol"] = json!(path.target_symbol);
                result["callers"] = json!(path.callers);
                result["callees"] = json!(path.callees);
            }
        }
    }
    Ok(result)
}

fn error_response(id: Value, message: &str) -> RpcResponse {
    RpcResponse {
        id,
        result: None,
        error: Some(RpcError {
            message: message.to_string(),
        }),
    }
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
