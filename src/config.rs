//! Runtime configuration (spec §6), loaded once from the environment.
//!
//! Follows the base crate's convention of `env::var(...).ok().and_then(|v|
//! v.parse().ok()).unwrap_or(default)` for every tunable, so a malformed
//! value falls back to the default with a logged warning rather than
//! failing startup.

use std::time::Duration;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, raw, "invalid config value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial: Duration,
    pub factor: f64,
    pub max_attempts: u32,
    pub jitter: f64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,

    pub scheduler_tick: Duration,
    pub scheduler_worker_pool: usize,

    pub probe_default_timeout: Duration,
    pub probe_max_redirects: usize,

    pub evaluator_shards: usize,

    pub dispatcher_concurrency_per_type: usize,
    pub dispatcher_timeout: Duration,
    pub dispatcher_retry: RetryConfig,

    pub broadcaster_subscriber_buffer: usize,
    pub broadcaster_heartbeat: Duration,

    pub retention_check_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config::from_env()
    }
}

impl Config {
    /// Load configuration from the environment, applying defaults for any
    /// key that is absent or fails to parse. Call `dotenvy::dotenv()`
    /// before this if a `.env` file should be honoured (matches the base
    /// crate's `main.rs`).
    pub fn from_env() -> Self {
        Config {
            database_path: std::env::var("DATABASE_PATH").unwrap_or_else(|_| "sentrywatch.db".into()),

            scheduler_tick: Duration::from_secs(env_parse("SCHEDULER_TICK_SECONDS", 10)),
            scheduler_worker_pool: env_parse("SCHEDULER_WORKER_POOL", 100),

            probe_default_timeout: Duration::from_secs(env_parse("PROBE_DEFAULT_TIMEOUT_SECONDS", 30)),
            probe_max_redirects: env_parse("PROBE_MAX_REDIRECTS", 5),

            evaluator_shards: env_parse("EVALUATOR_SHARDS", 16),

            dispatcher_concurrency_per_type: env_parse("DISPATCHER_CONCURRENCY_PER_TYPE", 20),
            dispatcher_timeout: Duration::from_secs(env_parse("DISPATCHER_TIMEOUT_SECONDS", 10)),
            dispatcher_retry: RetryConfig {
                initial: Duration::from_secs(env_parse("DISPATCHER_RETRY_INITIAL_SECONDS", 5)),
                factor: env_parse("DISPATCHER_RETRY_FACTOR", 2.0),
                max_attempts: env_parse("DISPATCHER_RETRY_MAX_ATTEMPTS", 5),
                jitter: env_parse("DISPATCHER_RETRY_JITTER", 0.2),
            },

            broadcaster_subscriber_buffer: env_parse("BROADCASTER_SUBSCRIBER_BUFFER", 10),
            broadcaster_heartbeat: Duration::from_secs(env_parse("BROADCASTER_HEARTBEAT_SECONDS", 30)),

            retention_check_days: env_parse("RETENTION_CHECK_DAYS", 90),
        }
    }
}
