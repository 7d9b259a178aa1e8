use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "reftrace",
    version,
    about = "Reference and call-path tracing over an imported symbol index",
    after_help = r#"Examples:
  reftrace import --workspace . --path index.json
  reftrace references --name save
  reftrace trace --name handle --direction both --format tree
  reftrace request --method trace_call_path --params '{"name":"handle","direction":"down","max_depth":3}'
  reftrace serve --workspace .
  reftrace mcp-serve --workspace .
"#
)]
pub struct Args {
    /// Fallback log filter when REFTRACE_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load an index document ({symbols, identifiers}) into the store.
    Import {
        #[arg(long, default_value = ".")]
        workspace: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        path: PathBuf,
        /// Keep existing rows and upsert on top of them.
        #[arg(long)]
        append: bool,
    },
    /// Print symbol and identifier counts for the workspace.
    Stats {
        #[arg(long, default_value = ".")]
        workspace: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// List references to a name or to a symbol id.
    References {
        #[arg(long, default_value = ".")]
        workspace: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long, conflicts_with = "id", required_unless_present = "id")]
        name: Option<String>,
        #[arg(long)]
        id: Option<i64>,
        #[arg(long)]
        case_sensitive: bool,
    },
    /// Trace callers, callees or both from a symbol.
    Trace {
        #[arg(long, default_value = ".")]
        workspace: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        name: String,
        /// up|down|both
        #[arg(long, default_value = "both")]
        direction: String,
        #[arg(long)]
        max_depth: Option<usize>,
        #[arg(long)]
        case_sensitive: bool,
        /// Stop expanding a symbol already on the current branch.
        #[arg(long)]
        suppress_cycles: bool,
        /// json|tree
        #[arg(long, default_value = "json")]
        format: String,
    },
    /// Run a single JSONL request and exit.
    Request {
        #[arg(long, default_value = ".")]
        workspace: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        method: String,
        #[arg(long, default_value = "{}")]
        params: String,
        #[arg(long, value_name = "PATH")]
        params_file: Option<PathBuf>,
        #[arg(long, default_value = "1")]
        id: String,
    },
    /// Run JSONL RPC server over stdin/stdout.
    Serve {
        #[arg(long, default_value = ".")]
        workspace: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Run MCP server over stdio.
    McpServe {
        #[arg(long, default_value = ".")]
        workspace: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}
