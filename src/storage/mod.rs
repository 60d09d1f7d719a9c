//! Storage layer for run persistence.
//!
//! Records every run and the node records it emitted in SQLite so past runs
//! can be inspected after the process exits. Search state itself is never
//! resumed from storage.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::runlog::NodeRecord;
use crate::search::{RunOutcome, RunStats};

/// A stored search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique run identifier.
    pub id: String,
    /// The task the run was started with.
    pub task: String,
    pub started_at: DateTime<Utc>,
    /// Set once the run has finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Final status (`succeeded`, `failed`, ...).
    pub status: Option<String>,
    /// Final termination reason.
    pub reason: Option<String>,
    pub solution_path: Option<Vec<String>>,
    pub stats: Option<RunStats>,
    /// JSON snapshot of the final reasoning tree.
    pub tree_snapshot: Option<serde_json::Value>,
    /// Configuration summary the run was started with.
    pub config: Vec<(String, String)>,
}

impl Run {
    /// Create a new, unfinished run.
    pub fn new(task: impl Into<String>, config: Vec<(String, String)>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task: task.into(),
            started_at: Utc::now(),
            finished_at: None,
            status: None,
            reason: None,
            solution_path: None,
            stats: None,
            tree_snapshot: None,
            config,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// Storage trait for run persistence.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert a new run.
    async fn create_run(&self, run: &Run) -> StorageResult<()>;
    /// Append the `seq`-th node record of a run.
    async fn append_node_record(
        &self,
        run_id: &str,
        seq: u32,
        record: &NodeRecord,
    ) -> StorageResult<()>;
    /// Store the final outcome of a run.
    async fn finish_run(&self, run_id: &str, outcome: &RunOutcome) -> StorageResult<()>;
    /// Get a run by ID.
    async fn get_run(&self, run_id: &str) -> StorageResult<Option<Run>>;
    /// Node records of a run in emission order.
    async fn get_node_records(&self, run_id: &str) -> StorageResult<Vec<NodeRecord>>;
}
