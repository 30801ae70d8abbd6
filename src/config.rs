//! Ambient configuration (§7): process-wide settings loaded once from
//! environment variables, following the teacher's `sandbox::config`
//! `OnceLock` pattern and `main.rs`'s `dotenvy::dotenv()` bootstrap.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for problem/language/submission JSON files
    /// (`repository::FileRepository`).
    pub data_dir: PathBuf,
    /// Root directory for write-once submission logs
    /// (`log_store::SubmissionLogStore`).
    pub log_dir: PathBuf,
    /// Root directory for compiled/cached special-judge checkers
    /// (`spj::CheckerCache`).
    pub checker_cache_dir: PathBuf,
    /// Number of concurrent worker tasks in the bounded pool (§5).
    pub worker_count: usize,
    /// Bound on the submission queue's mpsc channel.
    pub queue_capacity: usize,
    /// Whether the fallback (non-Docker) executor may be used when the
    /// sandbox is unavailable. Defaults to `false` — the fallback is
    /// never selected automatically (§4.5).
    pub allow_fallback_executor: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_dir: PathBuf::from("./data/logs"),
            checker_cache_dir: PathBuf::from("./data/checkers"),
            worker_count: 4,
            queue_capacity: 256,
            allow_fallback_executor: false,
        }
    }
}

impl Config {
    /// Build configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable. Call `dotenvy::dotenv()`
    /// before this if a `.env` file should be honored (the worker binary
    /// does so; library consumers and tests opt in explicitly).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: env_path("JUDGE_DATA_DIR", defaults.data_dir),
            log_dir: env_path("JUDGE_LOG_DIR", defaults.log_dir),
            checker_cache_dir: env_path("JUDGE_CHECKER_CACHE_DIR", defaults.checker_cache_dir),
            worker_count: env_parsed("JUDGE_WORKER_COUNT", defaults.worker_count),
            queue_capacity: env_parsed("JUDGE_QUEUE_CAPACITY", defaults.queue_capacity),
            allow_fallback_executor: env_bool(
                "JUDGE_ALLOW_FALLBACK_EXECUTOR",
                defaults.allow_fallback_executor,
            ),
        }
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an unparseable value {:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => matches!(raw.as_str(), "1" | "true" | "TRUE" | "yes"),
        Err(_) => default,
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Initialize the global configuration. Must be called at most once;
/// later calls are ignored with a warning (mirrors `sandbox::init_config`).
pub fn init_config(config: Config) {
    if CONFIG.set(config).is_err() {
        warn!("configuration already initialized, ignoring second init");
    }
}

/// Get the global configuration, initializing it from the environment on
/// first use if `init_config` was never called.
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Whether the current process is running under the test harness (§5).
/// Grounded on the original system's `is_testing()`
/// (`PYTEST_CURRENT_TEST` env check): submissions are judged synchronously
/// inline rather than handed to the worker pool, so tests don't race a
/// background task.
pub fn is_testing() -> bool {
    std::env::var("TESTING").map(|v| v == "1" || v == "true").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_the_fallback_executor() {
        assert!(!Config::default().allow_fallback_executor);
    }

    #[test]
    fn env_bool_accepts_common_truthy_spellings() {
        std::env::set_var("JUDGE_CONFIG_TEST_BOOL", "true");
        assert!(env_bool("JUDGE_CONFIG_TEST_BOOL", false));
        std::env::set_var("JUDGE_CONFIG_TEST_BOOL", "0");
        assert!(!env_bool("JUDGE_CONFIG_TEST_BOOL", true));
        std::env::remove_var("JUDGE_CONFIG_TEST_BOOL");
    }
}
