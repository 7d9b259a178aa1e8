use anyhow::Result;
use clap::Parser;
use reftrace::{cli, mcp, rpc, util};
use serde_json::{Value, json};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

const LOG_ENV: &str = "REFTRACE_LOG";

/// Logs go to stderr so stdout stays clean for JSON and JSONL output.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn db_or_default(workspace: &Path, db: Option<PathBuf>) -> PathBuf {
    db.unwrap_or_else(|| util::default_db_path(workspace))
}

fn run_method(workspace: &Path, db_path: &Path, method: &str, params: Value) -> Result<Value> {
    let session = rpc::Session::open(workspace, db_path)?;
    rpc::handle_method(&session, method, params)
}

fn main() -> Result<()> {
    let args = cli::Args::parse();
    init_tracing(&args.log_level);

    match args.command {
        cli::Command::Import {
            workspace,
            db,
            path,
            append,
        } => {
            let db_path = db_or_default(&workspace, db);
            let path = std::path::absolute(&path)?;
            let result = run_method(
                &workspace,
                &db_path,
                "import",
                json!({ "path": path.to_string_lossy(), "append": append }),
            )?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        cli::Command::Stats { workspace, db } => {
            let db_path = db_or_default(&workspace, db);
            let result = run_method(&workspace, &db_path, "stats", json!({}))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        cli::Command::References {
            workspace,
            db,
            name,
            id,
            case_sensitive,
        } => {
            let db_path = db_or_default(&workspace, db);
            let result = match (name, id) {
                (_, Some(id)) => run_method(
                    &workspace,
                    &db_path,
                    "find_references_by_id",
                    json!({ "id": id }),
                )?,
                (Some(name), None) => run_method(
                    &workspace,
                    &db_path,
                    "find_references",
                    json!({ "name": name, "case_sensitive": case_sensitive }),
                )?,
                (None, None) => anyhow::bail!("either --name or --id is required"),
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        cli::Command::Trace {
            workspace,
            db,
            name,
            direction,
            max_depth,
            case_sensitive,
            suppress_cycles,
            format,
        } => {
            let db_path = db_or_default(&workspace, db);
            let mut params = json!({
                "name": name,
                "direction": direction,
                "case_sensitive": case_sensitive,
                "suppress_cycles": suppress_cycles,
                "format": format,
            });
            if let Some(depth) = max_depth {
                params["max_depth"] = json!(depth);
            }
            let result = run_method(&workspace, &db_path, "trace_call_path", params)?;
            match result.get("text").and_then(|value| value.as_str()) {
                Some(text) => print!("{text}"),
                None => println!("{}", serde_json::to_string_pretty(&result)?),
            }
            Ok(())
        }
        cli::Command::Request {
            workspace,
            db,
            method,
            params,
            params_file,
            id,
        } => {
            let db_path = db_or_default(&workspace, db);
            let params_raw = match params_file {
                Some(path) => util::read_to_string(&path)?,
                None => params,
            };
            let response = rpc::call(workspace, db_path, method, &params_raw, &id)?;
            println!("{response}");
            Ok(())
        }
        cli::Command::Serve { workspace, db } => {
            let db_path = db_or_default(&workspace, db);
            rpc::serve(workspace, db_path)
        }
        cli::Command::McpServe { workspace, db } => {
            let db_path = db_or_default(&workspace, db);
            mcp::serve(workspace, db_path)
        }
    }
}
