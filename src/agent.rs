//! Run entry point: wraps a search with the run log lifecycle.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::config::SearchConfig;
use crate::oracle::Oracle;
use crate::runlog::RunLog;
use crate::search::{RunOutcome, RunStats, RunStatus, SearchController, TerminationReason};
use crate::tree::ReasoningTree;

/// Solves tasks by running a [`SearchController`] and reporting to a
/// [`RunLog`].
pub struct Agent {
    controller: SearchController,
    log: Arc<dyn RunLog>,
    settings: Vec<(String, String)>,
}

impl Agent {
    pub fn new(search: SearchConfig, oracle: Arc<dyn Oracle>, log: Arc<dyn RunLog>) -> Self {
        let settings = search.summary();
        Self {
            controller: SearchController::new(search, oracle, log.clone()),
            log,
            settings,
        }
    }

    /// Configuration summary written at the start of each run.
    pub fn with_settings(mut self, settings: Vec<(String, String)>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.controller = self.controller.with_cancellation(token);
        self
    }

    /// Run a search for `task`.
    ///
    /// Never fails: a structural fault in the tree is reported as
    /// [`RunStatus::Error`].
    pub async fn run(&self, task: &str) -> RunOutcome {
        if let Err(e) = self.log.begin_run(task, &self.settings).await {
            warn!(error = %e, "Failed to start run log");
        }

        let outcome = match self.controller.run(task).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Search aborted by a structural fault");
                RunOutcome {
                    status: RunStatus::Error,
                    reason: TerminationReason::StructuralFault(e.to_string()),
                    solution_path: None,
                    stats: RunStats::default(),
                    tree: ReasoningTree::new(),
                }
            }
        };

        if let Err(e) = self.log.finish_run(&outcome).await {
            warn!(error = %e, "Failed to finish run log");
        }
        outcome
    }
}
