pub mod callpath;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod model;
pub mod references;
pub mod render;
pub mod resolve;
pub mod rpc;
pub mod snapshot;
pub mod store;
pub mod util;
