// Configuration module for reftrace
// Reads from environment variables with sensible defaults

use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::warn;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection pool size (REFTRACE_POOL_SIZE)
    pub pool_size: u32,

    /// Database connection pool minimum idle connections (REFTRACE_POOL_MIN_IDLE)
    pub pool_min_idle: u32,

    /// Depth used when a trace request does not give one (REFTRACE_DEFAULT_MAX_DEPTH)
    pub default_max_depth: usize,

    /// Node count above which a finished trace logs a warning (REFTRACE_MAX_NODES_WARN)
    pub max_nodes_warn: usize,

    /// Largest depth any trace will expand to, whatever the request asks (REFTRACE_MAX_DEPTH_LIMIT)
    pub max_depth_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: 10,
            pool_min_idle: 2,
            default_max_depth: crate::callpath::DEFAULT_MAX_DEPTH,
            max_nodes_warn: 10_000,
            max_depth_limit: crate::callpath::MAX_DEPTH_LIMIT,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let mut config = Config::default();
        override_from_env("REFTRACE_POOL_SIZE", &mut config.pool_size);
        override_from_env("REFTRACE_POOL_MIN_IDLE", &mut config.pool_min_idle);
        override_from_env("REFTRACE_DEFAULT_MAX_DEPTH", &mut config.default_max_depth);
        override_from_env("REFTRACE_MAX_NODES_WARN", &mut config.max_nodes_warn);
        override_from_env("REFTRACE_MAX_DEPTH_LIMIT", &mut config.max_depth_limit);
        config.clamp_depths();
        config
    }

    /// Keep depth settings inside what the recursive tracer can walk safely.
    fn clamp_depths(&mut self) {
        let ceiling = crate::callpath::MAX_DEPTH_CEILING;
        if self.max_depth_limit > ceiling {
            warn!(
                "REFTRACE_MAX_DEPTH_LIMIT {} exceeds {ceiling}, using {ceiling}",
                self.max_depth_limit
            );
            self.max_depth_limit = ceiling;
        }
        self.default_max_depth = self.default_max_depth.min(self.max_depth_limit);
    }

    /// Get the global configuration instance
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }
}

fn override_from_env<T>(key: &str, slot: &mut T)
where
    T: FromStr + std::fmt::Display,
{
    if let Ok(val) = env::var(key) {
        apply_override(key, &val, slot);
    }
}

fn apply_override<T>(key: &str, val: &str, slot: &mut T)
where
    T: FromStr + std::fmt::Display,
{
    match val.trim().parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!("Invalid {key} value: {val}, using default: {slot}"),
    }
}
