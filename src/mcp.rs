//! MCP server over stdio exposing the RPC methods as one tool.

use crate::rpc::{self, Session};
use crate::util;
use anyhow::Result;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{error, warn};

const TOOL_NAME: &str = "reftrace_query";
const PROTOCOL_VERSION: &str = "2024-11-05";
const MAX_RESPONSE_BYTES: usize = 512_000;

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

type Reply = std::result::Result<Value, (i64, String)>;

/// Open sessions keyed by (workspace, db path), plus the pair used when a
/// tool call names neither.
struct Sessions {
    default_workspace: PathBuf,
    default_db: PathBuf,
    open: HashMap<(PathBuf, PathBuf), Session>,
}

impl Sessions {
    fn new(default_workspace: PathBuf, default_db: PathBuf) -> Self {
        Self {
            default_workspace,
            default_db,
            open: HashMap::new(),
        }
    }

    /// `workspace` overrides move the default db along with them; `db`
    /// overrides win over both.
    fn target(&self, arguments: &Value) -> (PathBuf, PathBuf) {
        let workspace = arguments
            .get("workspace")
            .and_then(Value::as_str)
            .map(PathBuf::from);
        let db = arguments.get("db").and_then(Value::as_str).map(PathBuf::from);
        match (workspace, db) {
            (Some(workspace), Some(db)) => (workspace, db),
            (Some(workspace), None) => {
                let db = util::default_db_path(&workspace);
                (workspace, db)
            }
            (None, Some(db)) => (self.default_workspace.clone(), db),
            (None, None) => (self.default_workspace.clone(), self.default_db.clone()),
        }
    }

    fn session(&mut self, workspace: PathBuf, db: PathBuf) -> Result<&Session> {
        let session: &Session = match self.open.entry((workspace, db)) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let (workspace, db) = entry.key();
                let session = Session::open(workspace, db)?;
                entry.insert(session)
            }
        };
        Ok(session)
    }
}

pub fn serve(workspace: PathBuf, db_path: PathBuf) -> Result<()> {
    let mut sessions = Sessions::new(workspace, db_path);
    let mut stdout = io::stdout();

    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                error!("stdin error: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let outgoing = match serde_json::from_str::<Value>(&line) {
            Ok(message) => dispatch(&message, &mut sessions),
            Err(err) => Some(envelope(
                Value::Null,
                Err((PARSE_ERROR, format!("parse error: {err}"))),
            )),
        };
        if let Some(outgoing) = outgoing {
            writeln!(stdout, "{}", serde_json::to_string(&outgoing)?)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Answer one JSON-RPC message. Notifications (no `id`) get no answer.
fn dispatch(message: &Value, sessions: &mut Sessions) -> Option<Value> {
    let id = message.get("id").cloned()?;
    let reply = match message.get("method").and_then(Value::as_str) {
        None => Err((INVALID_REQUEST, "invalid request".to_string())),
        Some("initialize") => Ok(initialize_result(message)),
        Some("ping") => Ok(json!({})),
        Some("tools/list") => Ok(json!({ "tools": [tool_description()] })),
        Some("tools/call") => call_tool(message.get("params"), sessions),
        Some(other) => Err((METHOD_NOT_FOUND, format!("method not found: {other}"))),
    };
    Some(envelope(id, reply))
}

fn envelope(id: Value, reply: Reply) -> Value {
    match reply {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, message)) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message }
        }),
    }
}

fn initialize_result(message: &Value) -> Value {
    let protocol = message
        .pointer("/params/protocolVersion")
        .cloned()
        .unwrap_or_else(|| json!(PROTOCOL_VERSION));
    json!({
        "protocolVersion": protocol,
        "capabilities": { "tools": {} },
        "serverInfo": { "name": "reftrace", "version": env!("CARGO_PKG_VERSION") },
        "instructions": "Use reftrace_query to look up references and call paths in an imported symbol index. \
Start with find_references to see every usage of a name, then trace_call_path with direction up (callers), \
down (callees) or both. Keep max_depth small (3-5) on large graphs; pass suppress_cycles for recursive code."
    })
}

fn tool_description() -> Value {
    json!({
        "name": TOOL_NAME,
        "description": "Query the reftrace symbol index using a method + params payload.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "method": { "type": "string", "enum": rpc::METHOD_LIST },
                "params": {
                    "type": "object",
                    "description": "stats {}; import {path, append}; clear {}; list_workspaces {}; get_symbol {id}; find_references {name, case_sensitive, resolved_only, limit}; find_references_by_id {id, resolved_only, limit}; trace_call_path {name, direction (up|down|both), max_depth, case_sensitive, suppress_cycles, format (json|tree)}."
                },
                "workspace": { "type": "string", "description": "Workspace root for this call." },
                "db": { "type": "string", "description": "Database path for this call." },
                "compact": { "type": "boolean", "description": "Single-line JSON text output." }
            },
            "required": ["method"]
        }
    })
}

fn call_tool(params: Option<&Value>, sessions: &mut Sessions) -> Reply {
    let params = params.ok_or((INVALID_PARAMS, "missing params".to_string()))?;
    if params.get("name").and_then(Value::as_str) != Some(TOOL_NAME) {
        return Err((METHOD_NOT_FOUND, "unknown tool".to_string()));
    }
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
    let method = arguments
        .get("method")
        .and_then(Value::as_str)
        .ok_or((INVALID_PARAMS, "missing method".to_string()))?;
    let method_params = arguments.get("params").cloned().unwrap_or(Value::Null);
    let compact = arguments
        .get("compact")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let (workspace, db) = sessions.target(&arguments);
    let outcome = sessions
        .session(workspace, db)
        .and_then(|session| rpc::handle_method(session, method, method_params));
    Ok(match outcome {
        Ok(result) => tool_result(result, compact),
        Err(err) => {
            warn!(method, "tool call failed: {err}");
            json!({
                "content": [{ "type": "text", "text": err.to_string() }],
                "isError": true
            })
        }
    })
}

/// Tree renderings go out as-is; everything else as JSON text.
fn tool_result(result: Value, compact: bool) -> Value {
    let text = match result.get("text").and_then(Value::as_str) {
        Some(tree) => tree.to_string(),
        None if compact => result.to_string(),
        None => serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string()),
    };
    let text = if text.len() > MAX_RESPONSE_BYTES {
        format!(
            "Response too large ({} bytes). Lower max_depth or limit, or use suppress_cycles.",
            text.len()
        )
    } else {
        text
    };
    json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": result,
        "isError": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sessions() -> Sessions {
        Sessions::new(
            PathBuf::from("/ws"),
            PathBuf::from("/ws/.reftrace/reftrace.sqlite"),
        )
    }

    #[test]
    fn target_defaults_and_overrides() {
        let sessions = sessions();
        assert_eq!(
            sessions.target(&json!({})),
            (
                PathBuf::from("/ws"),
                PathBuf::from("/ws/.reftrace/reftrace.sqlite")
            )
        );
        assert_eq!(
            sessions.target(&json!({ "workspace": "/other" })).1,
            PathBuf::from("/other/.reftrace/reftrace.sqlite")
        );
        assert_eq!(
            sessions.target(&json!({ "workspace": "/other", "db": "/tmp/x.sqlite" })),
            (PathBuf::from("/other"), PathBuf::from("/tmp/x.sqlite"))
        );
    }

    #[test]
    fn tool_result_text_forms() {
        let result = json!({ "a": 1 });
        let pretty = tool_result(result.clone(), false);
        assert_eq!(
            pretty["content"][0]["text"].as_str().unwrap(),
            serde_json::to_string_pretty(&result).unwrap()
        );
        assert_eq!(pretty["structuredContent"], result);

        let compact = tool_result(result.clone(), true);
        assert_eq!(compact["content"][0]["text"].as_str().unwrap(), r#"{"a":1}"#);

        let tree = tool_result(json!({ "text": "main -> run  (main.rs:3)\n" }), true);
        assert_eq!(
            tree["content"][0]["text"].as_str().unwrap(),
            "main -> run  (main.rs:3)\n"
        );
    }

    #[test]
    fn protocol_messages() {
        let dir = tempfile::tempdir().unwrap();
        let mut sessions = Sessions::new(dir.path().to_path_buf(), dir.path().join("db.sqlite"));

        let listed = dispatch(
            &json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }),
            &mut sessions,
        )
        .unwrap();
        assert_eq!(listed["result"]["tools"][0]["name"], json!(TOOL_NAME));

        let missing = dispatch(
            &json!({ "jsonrpc": "2.0", "id": 2, "method": "resources/list" }),
            &mut sessions,
        )
        .unwrap();
        assert_eq!(missing["error"]["code"], json!(METHOD_NOT_FOUND));

        let notification = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
        assert!(dispatch(&notification, &mut sessions).is_none());

        let init = dispatch(
            &json!({ "jsonrpc": "2.0", "id": 3, "method": "initialize", "params": { "protocolVersion": "2025-03-26" } }),
            &mut sessions,
        )
        .unwrap();
        assert_eq!(init["result"]["protocolVersion"], json!("2025-03-26"));
    }

    #[test]
    fn tool_call_runs_methods_and_reuses_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let mut sessions = Sessions::new(dir.path().to_path_buf(), dir.path().join("db.sqlite"));
        let call = |method: &str| {
            json!({
                "jsonrpc": "2.0",
                "id": 4,
                "method": "tools/call",
                "params": { "name": TOOL_NAME, "arguments": { "method": method } }
            })
        };

        let stats = dispatch(&call("stats"), &mut sessions).unwrap();
        assert_eq!(stats["result"]["isError"], json!(false));
        assert_eq!(stats["result"]["structuredContent"]["symbols"], json!(0));

        let failed = dispatch(&call("nope"), &mut sessions).unwrap();
        assert_eq!(failed["result"]["isError"], json!(true));
        assert_eq!(sessions.open.len(), 1);
    }
}
