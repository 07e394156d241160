//! Process-level settings read from the environment.

use tuneflow_db::PoolConfig;
use tuneflow_jobs::{MusicJobSettings, WorkerConfig};

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/tuneflow";

/// Log output settings.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `LOG_FORMAT` | `text` | `json` or `text` |
/// | `LOG_FILE` | unset | Log file path; enables daily rotation |
/// | `LOG_ANSI` | auto | `true`/`false` overrides ANSI colors |
/// | `RUST_LOG` | `tuneflow=debug` | Standard env filter |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub json: bool,
    pub file: Option<String>,
    pub ansi: Option<bool>,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self {
            json: std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")),
            file: std::env::var("LOG_FILE").ok().filter(|v| !v.is_empty()),
            ansi: std::env::var("LOG_ANSI").ok().map(|v| parse_flag(&v)),
        }
    }
}

/// Everything the worker process needs to wire itself up.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `DATABASE_URL` | `postgres://localhost/tuneflow` | Record store |
/// | `REDIS_URL` | unset | Notification channels; in-process bus when unset |
/// | `SCHEDULER_ENABLED` | `true` | Dispatch the periodic catalog tasks |
/// | `RUN_MIGRATIONS` | `true` | Apply pending migrations on startup |
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub scheduler_enabled: bool,
    pub run_migrations: bool,
    pub pool: PoolConfig,
    pub worker: WorkerConfig,
    pub music: MusicJobSettings,
}

impl WorkerSettings {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            redis_url: std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            scheduler_enabled: env_flag("SCHEDULER_ENABLED", true),
            run_migrations: env_flag("RUN_MIGRATIONS", true),
            pool: PoolConfig::from_env(),
            worker: WorkerConfig::from_env(),
            music: MusicJobSettings::from_env(),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" 1 "));
        assert!(parse_flag("YES"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_missing_flag_uses_default() {
        assert!(env_flag("TUNEFLOW_TEST_UNSET_FLAG", true));
        assert!(!env_flag("TUNEFLOW_TEST_UNSET_FLAG", false));
    }
}
