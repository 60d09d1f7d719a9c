use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{NodeRecord, RunLog};
use crate::error::{AppError, AppResult};
use crate::search::RunOutcome;
use crate::storage::{Run, Storage};

/// Persists a run and its node records through a [`Storage`] backend.
pub struct SqliteRunLog {
    storage: Arc<dyn Storage>,
    run_id: Mutex<Option<String>>,
    seq: AtomicU32,
}

impl SqliteRunLog {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            run_id: Mutex::new(None),
            seq: AtomicU32::new(0),
        }
    }

    /// Id of the stored run once `begin_run` has been called.
    pub async fn run_id(&self) -> Option<String> {
        self.run_id.lock().await.clone()
    }

    async fn require_run_id(&self) -> AppResult<String> {
        self.run_id
            .lock()
            .await
            .clone()
            .ok_or_else(|| AppError::Internal {
                message: "run log used before begin_run".to_string(),
            })
    }
}

#[async_trait]
impl RunLog for SqliteRunLog {
    async fn begin_run(&self, task: &str, config: &[(String, String)]) -> AppResult<()> {
        let run = Run::new(task, config.to_vec());
        self.storage.create_run(&run).await?;

        debug!(run_id = %run.id, "Run stored");
        *self.run_id.lock().await = Some(run.id);
        self.seq.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn record(&self, record: NodeRecord) -> AppResult<()> {
        let run_id = self.require_run_id().await?;
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.storage
            .append_node_record(&run_id, seq, &record)
            .await?;
        Ok(())
    }

    async fn finish_run(&self, outcome: &RunOutcome) -> AppResult<()> {
        let run_id = self.require_run_id().await?;
        self.storage.finish_run(&run_id, outcome).await?;
        Ok(())
    }
}
