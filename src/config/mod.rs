use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub langbase: LangbaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub pipes: PipeConfig,
    pub search: SearchConfig,
    pub output: OutputConfig,
}

/// Langbase API configuration
#[derive(Debug, Clone)]
pub struct LangbaseConfig {
    pub api_key: String,
    pub base_url: String,
    /// Model used when creating pipes (e.g. "openai:gpt-4o-mini")
    pub model: String,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
    /// Base delay of the exponential backoff
    pub retry_delay_ms: u64,
}

/// Langbase pipe name configuration
#[derive(Debug, Clone)]
pub struct PipeConfig {
    pub generation: String,
    pub decision: String,
}

/// Limits and policy of a single search run
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Deepest distance from the root a node may have
    pub max_depth: usize,
    /// Total nodes a run may create, root included
    pub max_nodes: usize,
    /// Decision round-trips a run may spend
    pub max_oracle_calls: u32,
    pub max_wall_clock: Duration,
    /// Thoughts requested per generation
    pub num_thoughts: usize,
    /// Regenerate thoughts when a node is re-entered after backtracking
    pub regenerate_thoughts_on_revisit: bool,
}

/// Run artifacts configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Markdown log path; `{timestamp}` is substituted per run
    pub log_path_template: String,
    /// SQLite record store, disabled when unset
    pub database_path: Option<PathBuf>,
    pub database_max_connections: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let langbase = LangbaseConfig {
            api_key: env::var("LANGBASE_API_KEY").map_err(|_| AppError::Config {
                message: "LANGBASE_API_KEY is required".to_string(),
            })?,
            base_url: env::var("LANGBASE_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
            model: env::var("LANGBASE_MODEL").unwrap_or_else(|_| "openai:gpt-4o-mini".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: parse_env("REQUEST_TIMEOUT_MS", 30000),
            max_retries: parse_env("MAX_RETRIES", 3),
            retry_delay_ms: parse_env("RETRY_DELAY_MS", 1000),
        };

        let pipes = PipeConfig {
            generation: env::var("PIPE_GENERATION")
                .unwrap_or_else(|_| "tota-generation-v1".to_string()),
            decision: env::var("PIPE_DECISION").unwrap_or_else(|_| "tota-decision-v1".to_string()),
        };

        let defaults = SearchConfig::default();
        let search = SearchConfig {
            max_depth: parse_env("SEARCH_MAX_DEPTH", defaults.max_depth),
            max_nodes: parse_env("SEARCH_MAX_NODES", defaults.max_nodes),
            max_oracle_calls: parse_env("SEARCH_MAX_ORACLE_CALLS", defaults.max_oracle_calls),
            max_wall_clock: Duration::from_millis(parse_env(
                "SEARCH_MAX_WALL_CLOCK_MS",
                defaults.max_wall_clock.as_millis() as u64,
            )),
            num_thoughts: parse_env("SEARCH_NUM_THOUGHTS", defaults.num_thoughts),
            regenerate_thoughts_on_revisit: parse_env(
                "SEARCH_REGENERATE_ON_REVISIT",
                defaults.regenerate_thoughts_on_revisit,
            ),
        };
        search.validate()?;

        let output = OutputConfig {
            log_path_template: env::var("RUN_LOG_PATH_TEMPLATE")
                .unwrap_or_else(|_| "logs/tota_run_{timestamp}.md".to_string()),
            database_path: env::var("DATABASE_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            database_max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5),
        };

        Ok(Config {
            langbase,
            logging,
            request,
            pipes,
            search,
            output,
        })
    }

    /// Key/value view of the configuration for run reports. Credentials are
    /// never included.
    pub fn summary(&self) -> Vec<(String, String)> {
        let mut entries = vec![
            ("langbase_base_url".to_string(), self.langbase.base_url.clone()),
            ("langbase_model".to_string(), self.langbase.model.clone()),
            ("pipe_generation".to_string(), self.pipes.generation.clone()),
            ("pipe_decision".to_string(), self.pipes.decision.clone()),
            ("retry_attempts".to_string(), self.request.max_retries.to_string()),
            (
                "retry_delay_ms".to_string(),
                self.request.retry_delay_ms.to_string(),
            ),
        ];
        entries.extend(self.search.summary());
        entries.sort();
        entries
    }
}

impl SearchConfig {
    /// Reject limits that would make every run fail before it starts
    pub fn validate(&self) -> Result<(), AppError> {
        let invalid = |message: &str| AppError::Config {
            message: message.to_string(),
        };

        if self.max_nodes == 0 {
            return Err(invalid("SEARCH_MAX_NODES must be at least 1"));
        }
        if self.max_oracle_calls == 0 {
            return Err(invalid("SEARCH_MAX_ORACLE_CALLS must be at least 1"));
        }
        if self.max_wall_clock.is_zero() {
            return Err(invalid("SEARCH_MAX_WALL_CLOCK_MS must be positive"));
        }
        if self.num_thoughts == 0 {
            return Err(invalid("SEARCH_NUM_THOUGHTS must be at least 1"));
        }
        Ok(())
    }

    /// Key/value view of the search limits
    pub fn summary(&self) -> Vec<(String, String)> {
        vec![
            ("max_depth".to_string(), self.max_depth.to_string()),
            ("max_nodes".to_string(), self.max_nodes.to_string()),
            (
                "max_oracle_calls".to_string(),
                self.max_oracle_calls.to_string(),
            ),
            (
                "max_wall_clock_ms".to_string(),
                self.max_wall_clock.as_millis().to_string(),
            ),
            ("num_thoughts".to_string(), self.num_thoughts.to_string()),
            (
                "regenerate_thoughts_on_revisit".to_string(),
                self.regenerate_thoughts_on_revisit.to_string(),
            ),
        ]
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_nodes: 50,
            max_oracle_calls: 40,
            max_wall_clock: Duration::from_secs(600),
            num_thoughts: 3,
            regenerate_thoughts_on_revisit: false,
        }
    }
}
