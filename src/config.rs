use std::env;
use std::time::Duration;

/// Outbound request timeout for every page fetch.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum number of scraped pages kept in memory.
pub const CACHE_CAPACITY: usize = 12;

/// Maximum number of conversation turns kept per session.
pub const HISTORY_LIMIT: usize = 12;

/// Number of cached pages fed into each completion call.
pub const RECENT_CONTEXT_ENTRIES: usize = 2;

/// Process configuration, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub assistant_name: String,
    pub worker: WorkerConfig,
}

/// Knobs for the background query worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub search_url: String,
    pub forum_prefix: String,
    pub forum_scope: String,
    pub poll_interval: Duration,
    pub search_cooldown: Duration,
    pub max_links_per_cycle: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            search_url: "https://www.google.com/search".to_string(),
            forum_prefix: "https://www.ptt.cc/".to_string(),
            forum_scope: "ptt".to_string(),
            poll_interval: Duration::from_millis(500),
            search_cooldown: Duration::from_secs(3),
            max_links_per_cycle: 2,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = WorkerConfig::default();
        Self {
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:8000"),
            openai_api_key: var_or("OPENAI_API_KEY", ""),
            openai_base_url: var_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            openai_model: var_or("OPENAI_MODEL", "gpt-4o-mini"),
            assistant_name: var_or("ASSISTANT_NAME", "BI教父-小K"),
            worker: WorkerConfig {
                search_url: var_or("SEARCH_URL", &defaults.search_url),
                forum_prefix: var_or("FORUM_PREFIX", &defaults.forum_prefix),
                forum_scope: var_or("FORUM_SCOPE", &defaults.forum_scope),
                ..defaults
            },
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
