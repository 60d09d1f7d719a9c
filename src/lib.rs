//! # Tree-of-Thoughts Agent
//!
//! Solves a task by searching a tree of reasoning steps with the help of a
//! language-model oracle. At each node the oracle proposes candidate thoughts
//! and then decides whether to descend into one of them, backtrack to the
//! parent, or declare the task solved.
//!
//! ## Architecture
//!
//! ```text
//! Agent -> SearchController -> Oracle (Langbase Pipes over HTTP)
//!                 |                  \-> Response Extractor (free-form text)
//!                 +-> ReasoningTree
//!                 +-> RunLog (Markdown report, SQLite records)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tota_agent::{Agent, Config, LangbaseClient, LangbaseOracle, MarkdownRunLog};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let client = LangbaseClient::new(&config.langbase, config.request.clone())?;
//!     let oracle = Arc::new(LangbaseOracle::new(client, &config));
//!     let log = Arc::new(MarkdownRunLog::from_template(&config.output.log_path_template));
//!
//!     let agent = Agent::new(config.search.clone(), oracle, log);
//!     let outcome = agent.run("Find two primes that sum to 100").await;
//!     println!("{} {:?}", outcome.status, outcome.solution_path);
//!     Ok(())
//! }
//! ```

/// Run entry point tying the search to its run log.
pub mod agent;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Recovery of thoughts and decisions from free-form oracle text.
pub mod extract;
/// Langbase API client and types for pipe communication.
pub mod langbase;
/// The oracle boundary and its Langbase implementation.
pub mod oracle;
/// System prompts for Langbase pipes.
pub mod prompts;
/// Retry with exponential backoff.
pub mod retry;
/// Run log sinks.
pub mod runlog;
/// The search controller state machine.
pub mod search;
/// SQLite storage layer for run records.
pub mod storage;
/// The in-memory reasoning tree.
pub mod tree;

pub use agent::Agent;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use langbase::LangbaseClient;
pub use oracle::{LangbaseOracle, Oracle};
pub use runlog::{FanoutLog, MarkdownRunLog, MemoryRunLog, RunLog};
pub use search::{RunOutcome, RunStatus, SearchController, TerminationReason};
