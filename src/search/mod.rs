//! The search controller.
//!
//! Drives a run from the task description to a terminal outcome through an
//! explicit state machine:
//!
//! ```text
//! Initializing -> Generating -> Deciding -+-> Descending --> Generating
//!                     ^                    +-> Backtracking -> Generating | Failed
//!                     |                    +-> Succeeded
//!                     +------------------------------------------+
//! ```
//!
//! Global guards are checked before every Generating step and cancellation
//! before every transition. Exactly one oracle round-trip is outstanding at
//! a time and the tree is only ever touched from [`SearchController::run`].

mod outcome;

pub use outcome::{Guard, RunOutcome, RunStats, RunStatus, TerminationReason};

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::error::{OracleError, OracleResult, TreeResult};
use crate::extract::{extract_decision, extract_thought_drafts};
use crate::oracle::{ActionType, AncestorContext, Decision, Oracle, OracleResponse};
use crate::runlog::{NodeRecord, RunLog};
use crate::tree::{NodeStatus, ReasoningTree, Thought};

/// Why the controller is leaving the active node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BacktrackCause {
    /// The oracle chose to backtrack.
    Chosen,
    /// The decision could not be used.
    ProtocolFailure,
    /// The selected child would be deeper than `max_depth`.
    DepthLimit,
}

#[derive(Debug, Clone, PartialEq)]
enum SearchState {
    Initializing,
    Generating,
    Deciding,
    Descending { thought_id: String },
    Backtracking { cause: BacktrackCause },
    Succeeded,
    Failed(TerminationReason),
}

impl SearchState {
    fn is_terminal(&self) -> bool {
        matches!(self, SearchState::Succeeded | SearchState::Failed(_))
    }
}

/// Per-run mutable data, owned by a single `run` call.
struct RunState {
    tree: ReasoningTree,
    stats: RunStats,
    started: Instant,
    /// Set when the active node was re-entered by backtracking and its
    /// thoughts should be regenerated.
    regenerate: bool,
}

impl RunState {
    fn new() -> Self {
        Self {
            tree: ReasoningTree::new(),
            stats: RunStats::default(),
            started: Instant::now(),
            regenerate: false,
        }
    }
}

/// Runs the generate, decide, descend/backtrack loop against an [`Oracle`].
pub struct SearchController {
    config: SearchConfig,
    oracle: Arc<dyn Oracle>,
    log: Arc<dyn RunLog>,
    cancel: CancellationToken,
}

impl SearchController {
    pub fn new(config: SearchConfig, oracle: Arc<dyn Oracle>, log: Arc<dyn RunLog>) -> Self {
        Self {
            config,
            oracle,
            log,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the run cooperatively when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search for a solution to `task`.
    ///
    /// Oracle failures and exhausted guards end the run normally with a
    /// `Failed` outcome. Only a violated tree invariant is returned as an
    /// error.
    pub async fn run(&self, task: &str) -> TreeResult<RunOutcome> {
        let mut run = RunState::new();
        let mut state = SearchState::Initializing;

        info!(
            max_depth = self.config.max_depth,
            max_nodes = self.config.max_nodes,
            max_oracle_calls = self.config.max_oracle_calls,
            "Search started"
        );

        loop {
            if !state.is_terminal() && self.cancel.is_cancelled() {
                info!(state = ?state, "Search cancelled");
                state = SearchState::Failed(TerminationReason::Cancelled);
            }

            state = match state {
                SearchState::Initializing => self.initialize(&mut run, task)?,
                SearchState::Generating => self.generate(&mut run).await?,
                SearchState::Deciding => self.decide(&mut run).await?,
                SearchState::Descending { thought_id } => self.descend(&mut run, &thought_id)?,
                SearchState::Backtracking { cause } => self.backtrack(&mut run, cause)?,
                SearchState::Succeeded => return self.succeed(run),
                SearchState::Failed(reason) => return self.fail(run, reason),
            };
        }
    }

    fn initialize(&self, run: &mut RunState, task: &str) -> TreeResult<SearchState> {
        let root_id = run.tree.create_root(task)?;
        run.tree.mark_status(&root_id, NodeStatus::Active)?;
        debug!(node_id = %root_id, "Root created");
        Ok(SearchState::Generating)
    }

    fn check_guards(&self, run: &RunState) -> Option<Guard> {
        if run.tree.len() > self.config.max_nodes {
            Some(Guard::MaxNodes)
        } else if run.stats.decision_calls >= self.config.max_oracle_calls {
            Some(Guard::MaxOracleCalls)
        } else if run.started.elapsed() >= self.config.max_wall_clock {
            Some(Guard::MaxWallClock)
        } else {
            None
        }
    }

    /// Await an oracle call unless the run is cancelled first.
    async fn call_oracle<T>(
        &self,
        call: impl Future<Output = OracleResult<T>>,
    ) -> Option<OracleResult<T>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = call => Some(result),
        }
    }

    async fn generate(&self, run: &mut RunState) -> TreeResult<SearchState> {
        if let Some(guard) = self.check_guards(run) {
            warn!(guard = guard.as_str(), "Search guard tripped");
            return Ok(SearchState::Failed(TerminationReason::ResourceExhausted(
                guard,
            )));
        }

        let node = run.tree.active_node()?;
        let node_id = node.id.clone();

        if node.thoughts_recorded {
            if !run.regenerate {
                debug!(node_id = %node_id, thoughts = node.thoughts.len(), "Reusing recorded thoughts");
                return Ok(SearchState::Deciding);
            }
            run.tree.retire_thoughts(&node_id)?;
        }
        run.regenerate = false;

        let node = run.tree.get_node(&node_id)?;
        let sub_problem = node.sub_problem.clone();
        let first_seq = node.next_thought_seq();
        let context = AncestorContext::for_node(&run.tree, &node_id, self.config.max_depth)?;

        run.stats.generation_calls += 1;
        let response = match self
            .call_oracle(self.oracle.generate(&sub_problem, &context))
            .await
        {
            Some(response) => response,
            None => return Ok(SearchState::Failed(TerminationReason::Cancelled)),
        };

        let drafts = match response {
            Ok(OracleResponse::Structured(drafts)) => drafts,
            Ok(OracleResponse::RawText(text)) => {
                let drafts = extract_thought_drafts(&text);
                if drafts.is_empty() {
                    run.stats.protocol_failures += 1;
                    warn!(node_id = %node_id, "No thoughts recognised in oracle text");
                }
                drafts
            }
            Err(e) => {
                if matches!(e, OracleError::Protocol { .. }) {
                    run.stats.protocol_failures += 1;
                }
                warn!(node_id = %node_id, error = %e, "Thought generation failed, continuing with none");
                Vec::new()
            }
        };

        let thoughts: Vec<Thought> = drafts
            .into_iter()
            .filter(|draft| !draft.description.trim().is_empty())
            .enumerate()
            .map(|(i, draft)| Thought::from_draft(&node_id, first_seq + i, draft))
            .collect();

        info!(node_id = %node_id, thoughts = thoughts.len(), "Thoughts generated");
        run.tree.record_thoughts(&node_id, thoughts)?;
        Ok(SearchState::Deciding)
    }

    async fn decide(&self, run: &mut RunState) -> TreeResult<SearchState> {
        let node = run.tree.active_node()?.clone();
        let context = AncestorContext::for_node(&run.tree, &node.id, self.config.max_depth)?;

        run.stats.decision_calls += 1;
        let response = match self
            .call_oracle(self.oracle.decide(&node, &node.thoughts, &context))
            .await
        {
            Some(response) => response,
            None => return Ok(SearchState::Failed(TerminationReason::Cancelled)),
        };

        let verdict = match response {
            Ok(OracleResponse::Structured(decision)) => Ok(decision),
            Ok(OracleResponse::RawText(text)) => match extract_decision(&text) {
                Some(payload) => Decision::try_from(payload),
                None => Err(OracleError::protocol("no decision found in oracle text")),
            },
            Err(e) => Err(e),
        }
        .and_then(|decision| decision.validate(&node.thoughts).map(|_| decision));

        let (decision, next) = match verdict {
            Ok(decision) => {
                let next = match (decision.action_type, &decision.selected_thought_id) {
                    (ActionType::Select, Some(thought_id)) => SearchState::Descending {
                        thought_id: thought_id.clone(),
                    },
                    (ActionType::Success, _) => SearchState::Succeeded,
                    _ => SearchState::Backtracking {
                        cause: BacktrackCause::Chosen,
                    },
                };
                (decision, next)
            }
            Err(e) => {
                if matches!(e, OracleError::Protocol { .. }) {
                    run.stats.protocol_failures += 1;
                }
                warn!(node_id = %node.id, error = %e, "Unusable decision, forcing backtrack");
                (
                    Decision::backtrack(format!("Decision protocol failure: {}", e)),
                    SearchState::Backtracking {
                        cause: BacktrackCause::ProtocolFailure,
                    },
                )
            }
        };

        info!(
            node_id = %node.id,
            depth = node.depth,
            action = %decision.action_type,
            selected = ?decision.selected_thought_id,
            "Decision made"
        );

        let record = NodeRecord {
            node_id: node.id.clone(),
            sub_problem: node.sub_problem.clone(),
            depth: node.depth,
            visit: node.visits,
            thoughts: node.thoughts.clone(),
            decision,
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.log.record(record).await {
            warn!(node_id = %node.id, error = %e, "Failed to write node record");
        }

        Ok(next)
    }

    fn descend(&self, run: &mut RunState, thought_id: &str) -> TreeResult<SearchState> {
        let parent = run.tree.active_node()?;
        let parent_id = parent.id.clone();
        let child_depth = parent.depth + 1;

        if child_depth > self.config.max_depth {
            warn!(node_id = %parent_id, depth = child_depth, "Depth limit reached, backtracking");
            return Ok(SearchState::Backtracking {
                cause: BacktrackCause::DepthLimit,
            });
        }
        if run.tree.len() >= self.config.max_nodes {
            warn!(nodes = run.tree.len(), "Node limit reached");
            return Ok(SearchState::Failed(TerminationReason::ResourceExhausted(
                Guard::MaxNodes,
            )));
        }

        let child_id = run.tree.create_node_for_thought(&parent_id, thought_id)?;
        run.tree.activate(&child_id, NodeStatus::Open)?;
        run.stats.max_depth_reached = run.stats.max_depth_reached.max(child_depth);

        debug!(node_id = %child_id, parent_id = %parent_id, depth = child_depth, "Descended");
        Ok(SearchState::Generating)
    }

    fn backtrack(&self, run: &mut RunState, cause: BacktrackCause) -> TreeResult<SearchState> {
        let node = run.tree.active_node()?;
        let node_id = node.id.clone();

        let parent_id = match node.parent_id.clone() {
            Some(parent_id) => parent_id,
            None if cause == BacktrackCause::ProtocolFailure => {
                debug!(node_id = %node_id, "Unusable decision at root, deciding again");
                return Ok(SearchState::Generating);
            }
            None => {
                info!(node_id = %node_id, "Backtracked out of the root");
                run.tree.mark_status(&node_id, NodeStatus::Exhausted)?;
                return Ok(SearchState::Failed(TerminationReason::RootExhausted));
            }
        };

        run.tree.activate(&parent_id, NodeStatus::Exhausted)?;
        run.stats.backtracks += 1;
        run.regenerate = self.config.regenerate_thoughts_on_revisit;

        debug!(from = %node_id, to = %parent_id, cause = ?cause, "Backtracked");
        Ok(SearchState::Generating)
    }

    fn succeed(&self, mut run: RunState) -> TreeResult<RunOutcome> {
        let node_id = run.tree.active_node()?.id.clone();
        run.tree.mark_status(&node_id, NodeStatus::Solved)?;
        let solution_path = run.tree.solution_path(&node_id)?;

        info!(node_id = %node_id, steps = solution_path.len(), "Search succeeded");
        Ok(self.outcome(
            run,
            RunStatus::Succeeded,
            TerminationReason::Solved,
            Some(solution_path),
        ))
    }

    fn fail(&self, mut run: RunState, reason: TerminationReason) -> TreeResult<RunOutcome> {
        if let Some(active_id) = run.tree.active_id().map(str::to_string) {
            run.tree.mark_status(&active_id, NodeStatus::Exhausted)?;
        }

        let status = match reason {
            TerminationReason::Cancelled => RunStatus::Cancelled,
            _ => RunStatus::Failed,
        };
        info!(reason = %reason, "Search ended without a solution");
        Ok(self.outcome(run, status, reason, None))
    }

    fn outcome(
        &self,
        run: RunState,
        status: RunStatus,
        reason: TerminationReason,
        solution_path: Option<Vec<String>>,
    ) -> RunOutcome {
        let mut stats = run.stats;
        stats.nodes_created = run.tree.len();
        stats.elapsed_ms = run.started.elapsed().as_millis() as u64;

        RunOutcome {
            status,
            reason,
            solution_path,
            stats,
            tree: run.tree,
        }
    }
}
