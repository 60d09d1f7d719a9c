//! Run log sinks.
//!
//! The search controller emits one [`NodeRecord`] per node visit through the
//! [`RunLog`] trait. Sinks are append-only; a failing sink is reported by the
//! caller and never ends a run.

mod markdown;
mod sqlite;

pub use markdown::MarkdownRunLog;
pub use sqlite::SqliteRunLog;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::AppResult;
use crate::oracle::Decision;
use crate::search::RunOutcome;
use crate::tree::Thought;

/// What happened during one visit of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: String,
    pub sub_problem: String,
    pub depth: usize,
    /// 1 on the first visit, incremented on each revisit.
    pub visit: u32,
    pub thoughts: Vec<Thought>,
    pub decision: Decision,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only sink for run events.
#[async_trait]
pub trait RunLog: Send + Sync {
    /// Called once before the search starts.
    async fn begin_run(&self, _task: &str, _config: &[(String, String)]) -> AppResult<()> {
        Ok(())
    }

    /// Called once after every decision step.
    async fn record(&self, record: NodeRecord) -> AppResult<()>;

    /// Called once with the final outcome.
    async fn finish_run(&self, _outcome: &RunOutcome) -> AppResult<()> {
        Ok(())
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryRunLog {
    records: Mutex<Vec<NodeRecord>>,
    finished: Mutex<Option<RunOutcome>>,
}

impl MemoryRunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records in emission order.
    pub async fn records(&self) -> Vec<NodeRecord> {
        self.records.lock().await.clone()
    }

    /// The outcome passed to `finish_run`, if it was called.
    pub async fn outcome(&self) -> Option<RunOutcome> {
        self.finished.lock().await.clone()
    }
}

#[async_trait]
impl RunLog for MemoryRunLog {
    async fn record(&self, record: NodeRecord) -> AppResult<()> {
        self.records.lock().await.push(record);
        Ok(())
    }

    async fn finish_run(&self, outcome: &RunOutcome) -> AppResult<()> {
        *self.finished.lock().await = Some(outcome.clone());
        Ok(())
    }
}

/// Forwards every event to each inner sink in order.
///
/// A failing sink does not stop the others; the first error is returned
/// after all sinks have been called.
#[derive(Default)]
pub struct FanoutLog {
    sinks: Vec<Arc<dyn RunLog>>,
}

impl FanoutLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn RunLog>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn keep_first(first: &mut Option<crate::error::AppError>, result: AppResult<()>) {
        if let Err(e) = result {
            warn!(error = %e, "Run log sink failed");
            if first.is_none() {
                *first = Some(e);
            }
        }
    }
}

#[async_trait]
impl RunLog for FanoutLog {
    async fn begin_run(&self, task: &str, config: &[(String, String)]) -> AppResult<()> {
        let mut first = None;
        for sink in &self.sinks {
            Self::keep_first(&mut first, sink.begin_run(task, config).await);
        }
        first.map_or(Ok(()), Err)
    }

    async fn record(&self, record: NodeRecord) -> AppResult<()> {
        let mut first = None;
        for sink in &self.sinks {
            Self::keep_first(&mut first, sink.record(record.clone()).await);
        }
        first.map_or(Ok(()), Err)
    }

    async fn finish_run(&self, outcome: &RunOutcome) -> AppResult<()> {
        let mut first = None;
        for sink in &self.sinks {
            Self::keep_first(&mut first, sink.finish_run(outcome).await);
        }
        first.map_or(Ok(()), Err)
    }
}
