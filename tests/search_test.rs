//! Search controller tests
//!
//! Drives the controller with a scripted oracle: generation and decision
//! replies are queued up front and handed out in order. An exhausted
//! generation queue yields no thoughts; an exhausted decision queue yields
//! unparseable text.

use async_trait::async_trait;
use mockall::mock;
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use tota_agent::config::SearchConfig;
use tota_agent::error::{AppError, AppResult, OracleError, OracleResult};
use tota_agent::oracle::{ActionType, AncestorContext, Decision, Oracle, OracleResponse};
use tota_agent::runlog::{MemoryRunLog, NodeRecord, RunLog};
use tota_agent::search::{Guard, RunOutcome, RunStatus, SearchController, TerminationReason};
use tota_agent::tree::{Node, NodeStatus, Thought, ThoughtDraft};
use tota_agent::Agent;

type Generation = OracleResult<OracleResponse<Vec<ThoughtDraft>>>;
type Verdict = OracleResult<OracleResponse<Decision>>;

#[derive(Default)]
struct ScriptedOracle {
    generations: Mutex<VecDeque<Generation>>,
    decisions: Mutex<VecDeque<Verdict>>,
    generate_calls: AtomicU32,
    decide_calls: AtomicU32,
    /// Sub-problems passed to `generate`, in call order.
    generated_for: Mutex<Vec<String>>,
    /// Ancestor contexts passed to `decide`, in call order.
    contexts: Mutex<Vec<AncestorContext>>,
    generation_delay: Option<Duration>,
    cancel_on_decide: Option<CancellationToken>,
}

impl ScriptedOracle {
    fn new() -> Self {
        Self::default()
    }

    fn thoughts(self, drafts: Vec<ThoughtDraft>) -> Self {
        self.generation(Ok(OracleResponse::Structured(drafts)))
    }

    fn generation(self, reply: Generation) -> Self {
        self.generations.lock().unwrap().push_back(reply);
        self
    }

    fn decision(self, decision: Decision) -> Self {
        self.verdict(Ok(OracleResponse::Structured(decision)))
    }

    fn verdict(self, reply: Verdict) -> Self {
        self.decisions.lock().unwrap().push_back(reply);
        self
    }

    fn with_generation_delay(mut self, delay: Duration) -> Self {
        self.generation_delay = Some(delay);
        self
    }

    fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_decide = Some(token);
        self
    }

    fn generate_calls(&self) -> u32 {
        self.generate_calls.load(Ordering::SeqCst)
    }

    fn decide_calls(&self) -> u32 {
        self.decide_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn generate(&self, sub_problem: &str, _context: &AncestorContext) -> Generation {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.generated_for
            .lock()
            .unwrap()
            .push(sub_problem.to_string());
        if let Some(delay) = self.generation_delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.generations.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(OracleResponse::Structured(Vec::new())))
    }

    async fn decide(&self, _node: &Node, _thoughts: &[Thought], context: &AncestorContext) -> Verdict {
        self.decide_calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.clone());
        if let Some(token) = &self.cancel_on_decide {
            token.cancel();
        }
        let next = self.decisions.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(OracleResponse::RawText("???".to_string())))
    }
}

fn draft(description: &str, score: f64) -> ThoughtDraft {
    ThoughtDraft::new(description).with_score(score)
}

fn config() -> SearchConfig {
    SearchConfig {
        max_depth: 5,
        max_nodes: 50,
        max_oracle_calls: 40,
        max_wall_clock: Duration::from_secs(60),
        num_thoughts: 3,
        regenerate_thoughts_on_revisit: false,
    }
}

async fn run_search(
    config: SearchConfig,
    oracle: Arc<ScriptedOracle>,
    task: &str,
) -> (RunOutcome, Vec<NodeRecord>) {
    let log = Arc::new(MemoryRunLog::new());
    let controller = SearchController::new(config, oracle, log.clone());
    let outcome = controller.run(task).await.expect("no structural fault");
    (outcome, log.records().await)
}

fn status_of(outcome: &RunOutcome, node_id: &str) -> NodeStatus {
    outcome.tree.get_node(node_id).unwrap().status
}

fn assert_no_active_node(outcome: &RunOutcome) {
    assert!(outcome.tree.active_id().is_none());
    assert!(outcome
        .tree
        .nodes()
        .all(|n| n.status != NodeStatus::Active));
}

#[tokio::test]
async fn test_success_at_root() {
    let oracle = Arc::new(ScriptedOracle::new().decision(Decision::success("nothing to do")));

    let (outcome, records) = run_search(config(), oracle.clone(), "trivial task").await;

    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(outcome.reason, TerminationReason::Solved);
    assert_eq!(outcome.solution_path, Some(vec!["trivial task".to_string()]));
    assert_eq!(status_of(&outcome, "n0"), NodeStatus::Solved);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].decision.action_type, ActionType::Success);
    assert_eq!(oracle.generate_calls(), 1);
    assert_no_active_node(&outcome);
}

#[tokio::test]
async fn test_backtrack_then_select_sibling() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .thoughts(vec![draft("first idea", 0.9), draft("second idea", 0.3)])
            .thoughts(Vec::new())
            .thoughts(Vec::new())
            .decision(Decision::select("n0-t1", "highest score"))
            .decision(Decision::backtrack("nothing to try here"))
            .decision(Decision::select("n0-t2", "the other one"))
            .decision(Decision::success("done")),
    );

    let (outcome, records) = run_search(config(), oracle.clone(), "solve it").await;

    assert_eq!(outcome.status, RunStatus::Succeeded);
    let path = outcome.solution_path.clone().unwrap();
    assert_eq!(path, vec!["solve it", "second idea"]);

    // The root is decided twice but generated only once
    assert_eq!(oracle.generate_calls(), 3);
    assert_eq!(
        *oracle.generated_for.lock().unwrap(),
        vec!["solve it", "first idea", "second idea"]
    );
    assert_eq!(oracle.decide_calls(), 4);

    let ids: Vec<&str> = records.iter().map(|r| r.node_id.as_str()).collect();
    assert_eq!(ids, vec!["n0", "n0.1", "n0", "n0.2"]);
    assert_eq!(records[2].visit, 2);
    assert_eq!(records[2].thoughts, records[0].thoughts);

    assert_eq!(status_of(&outcome, "n0.1"), NodeStatus::Exhausted);
    assert_eq!(status_of(&outcome, "n0.2"), NodeStatus::Solved);
    assert_eq!(outcome.stats.backtracks, 1);
    assert_eq!(outcome.stats.nodes_created, 3);
    assert_no_active_node(&outcome);

    // The revisited root was told which branch had already been explored
    let contexts = oracle.contexts.lock().unwrap();
    assert_eq!(contexts[2].explored, vec!["first idea"]);
}

#[tokio::test]
async fn test_malformed_decisions_exhaust_oracle_budget() {
    let oracle = Arc::new(ScriptedOracle::new().thoughts(vec![draft("idea", 0.5)]));
    let config = SearchConfig {
        max_oracle_calls: 4,
        ..config()
    };

    let (outcome, records) = run_search(config, oracle.clone(), "hard task").await;

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(
        outcome.reason,
        TerminationReason::ResourceExhausted(Guard::MaxOracleCalls)
    );
    assert_eq!(outcome.solution_path, None);
    assert_eq!(records.len(), 4);
    assert_eq!(oracle.decide_calls(), 4);
    assert_eq!(oracle.generate_calls(), 1);
    assert_eq!(outcome.stats.protocol_failures, 4);
    for record in &records {
        assert_eq!(record.decision.action_type, ActionType::Backtrack);
        assert!(record
            .decision
            .decision_rationale
            .starts_with("Decision protocol failure"));
    }
    assert_eq!(status_of(&outcome, "n0"), NodeStatus::Exhausted);
    assert_no_active_node(&outcome);
}

#[tokio::test]
async fn test_backtrack_from_root_fails() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .thoughts(vec![draft("idea", 0.2)])
            .decision(Decision::backtrack("hopeless")),
    );

    let (outcome, records) = run_search(config(), oracle, "task").await;

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.reason, TerminationReason::RootExhausted);
    assert_eq!(outcome.solution_path, None);
    assert_eq!(records.len(), 1);
    assert_eq!(status_of(&outcome, "n0"), NodeStatus::Exhausted);
    assert_eq!(outcome.tree.len(), 1);
}

#[tokio::test]
async fn test_dangling_selection_forces_backtrack() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .thoughts(vec![draft("a", 0.8)])
            .decision(Decision::select("n0-t1", "go"))
            .decision(Decision::select("n0.1-t9", "no such thought"))
            .decision(Decision::success("root alone suffices")),
    );

    let (outcome, records) = run_search(config(), oracle, "task").await;

    assert_eq!(records.len(), 3);
    assert_eq!(records[1].node_id, "n0.1");
    assert_eq!(records[1].decision.action_type, ActionType::Backtrack);
    assert!(records[1].decision.decision_rationale.contains("n0.1-t9"));
    assert_eq!(records[1].decision.selected_thought_id, None);

    assert_eq!(status_of(&outcome, "n0.1"), NodeStatus::Exhausted);
    assert!(outcome.tree.get_node("n0.1").unwrap().children_ids.is_empty());
    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(outcome.solution_path, Some(vec!["task".to_string()]));
}

#[tokio::test]
async fn test_select_with_no_thoughts_is_rejected() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .generation(Err(OracleError::Transient {
                message: "timeout".to_string(),
                attempts: 4,
            }))
            .decision(Decision::select("n0-t1", "invented"))
            .decision(Decision::success("fine")),
    );

    let (outcome, records) = run_search(config(), oracle.clone(), "task").await;

    let root = outcome.tree.get_node("n0").unwrap();
    assert!(root.thoughts_recorded);
    assert!(root.thoughts.is_empty());
    assert_eq!(outcome.tree.len(), 1);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].decision.action_type, ActionType::Backtrack);
    assert_eq!(oracle.generate_calls(), 1);
    assert_eq!(outcome.status, RunStatus::Succeeded);
}

#[tokio::test]
async fn test_select_on_backtrack_is_protocol_failure() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .thoughts(vec![draft("a", 0.8)])
            .decision(Decision {
                action_type: ActionType::Success,
                selected_thought_id: Some("n0-t1".to_string()),
                decision_rationale: "confused".to_string(),
            })
            .decision(Decision::backtrack("give up")),
    );

    let (outcome, records) = run_search(config(), oracle, "task").await;

    assert_eq!(records.len(), 2);
    assert!(records[0]
        .decision
        .decision_rationale
        .starts_with("Decision protocol failure"));
    assert_eq!(outcome.stats.protocol_failures, 1);
    assert_eq!(outcome.reason, TerminationReason::RootExhausted);
}

#[tokio::test]
async fn test_node_limit_stops_before_creating_child() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .thoughts(vec![draft("a", 0.8)])
            .thoughts(vec![draft("b", 0.8)])
            .decision(Decision::select("n0-t1", "go"))
            .decision(Decision::select("n0.1-t1", "deeper")),
    );
    let config = SearchConfig {
        max_nodes: 2,
        ..config()
    };

    let (outcome, records) = run_search(config, oracle, "task").await;

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(
        outcome.reason,
        TerminationReason::ResourceExhausted(Guard::MaxNodes)
    );
    assert_eq!(outcome.tree.len(), 2);
    assert_eq!(outcome.stats.nodes_created, 2);
    assert_eq!(records.len(), 2);
    assert_eq!(status_of(&outcome, "n0.1"), NodeStatus::Exhausted);
    assert_no_active_node(&outcome);
}

#[tokio::test]
async fn test_depth_limit_forces_backtrack() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .thoughts(vec![draft("a", 0.8)])
            .thoughts(vec![draft("b", 0.8)])
            .decision(Decision::select("n0-t1", "go"))
            .decision(Decision::select("n0.1-t1", "too deep"))
            .decision(Decision::backtrack("out of ideas")),
    );
    let config = SearchConfig {
        max_depth: 1,
        ..config()
    };

    let (outcome, records) = run_search(config.clone(), oracle, "task").await;

    assert_eq!(outcome.tree.len(), 2);
    assert_eq!(records.len(), 3);
    assert_eq!(records[2].node_id, "n0");
    assert_eq!(records[2].depth, 0);
    assert_eq!(outcome.stats.max_depth_reached, 1);
    assert_eq!(status_of(&outcome, "n0.1"), NodeStatus::Exhausted);
    assert_eq!(outcome.reason, TerminationReason::RootExhausted);

    for node in outcome.tree.nodes() {
        let path = outcome.tree.path_to_root(&node.id).unwrap();
        assert!(path.len() <= config.max_depth + 1);
        assert!(path.last().unwrap().is_root());
    }
}

#[tokio::test]
async fn test_depth_limit_at_root_fails() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .thoughts(vec![draft("a", 0.8)])
            .decision(Decision::select("n0-t1", "go")),
    );
    let config = SearchConfig {
        max_depth: 0,
        ..config()
    };

    let (outcome, _) = run_search(config, oracle, "task").await;

    assert_eq!(outcome.tree.len(), 1);
    assert_eq!(outcome.reason, TerminationReason::RootExhausted);
}

#[tokio::test]
async fn test_regeneration_on_revisit() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .thoughts(vec![draft("a", 0.8)])
            .thoughts(Vec::new())
            .thoughts(vec![draft("c", 0.6)])
            .decision(Decision::select("n0-t1", "go"))
            .decision(Decision::backtrack("dead end"))
            .decision(Decision::success("fresh look solved it")),
    );
    let config = SearchConfig {
        regenerate_thoughts_on_revisit: true,
        ..config()
    };

    let (outcome, records) = run_search(config, oracle.clone(), "task").await;

    assert_eq!(oracle.generate_calls(), 3);
    let root = outcome.tree.get_node("n0").unwrap();
    assert_eq!(root.thoughts.len(), 1);
    assert_eq!(root.thoughts[0].thought_id, "n0-t2");
    assert_eq!(root.thoughts[0].description, "c");
    assert_eq!(root.retired_thoughts.len(), 1);
    assert_eq!(root.retired_thoughts[0].thought_id, "n0-t1");
    assert_eq!(records[2].thoughts[0].thought_id, "n0-t2");
    assert_eq!(outcome.status, RunStatus::Succeeded);
}

#[tokio::test]
async fn test_raw_text_replies_are_extracted() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .generation(Ok(OracleResponse::RawText(
                "1. Try A\n2. Try B".to_string(),
            )))
            .verdict(Ok(OracleResponse::RawText(
                "Action: Select\nSelected Thought: n0-t2\nRationale: B looks better".to_string(),
            )))
            .decision(Decision::success("B works")),
    );

    let (outcome, records) = run_search(config(), oracle, "task").await;

    assert_eq!(records[0].thoughts.len(), 2);
    assert_eq!(records[0].thoughts[1].thought_id, "n0-t2");
    assert_eq!(records[0].decision.decision_rationale, "B looks better");
    assert_eq!(
        outcome.solution_path,
        Some(vec!["task".to_string(), "Try B".to_string()])
    );
}

#[tokio::test]
async fn test_wall_clock_guard() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .with_generation_delay(Duration::from_millis(30))
            .thoughts(vec![draft("a", 0.8)])
            .decision(Decision::select("n0-t1", "go")),
    );
    let config = SearchConfig {
        max_wall_clock: Duration::from_millis(10),
        ..config()
    };

    let (outcome, records) = run_search(config, oracle.clone(), "task").await;

    assert_eq!(
        outcome.reason,
        TerminationReason::ResourceExhausted(Guard::MaxWallClock)
    );
    assert_eq!(oracle.generate_calls(), 1);
    assert_eq!(records.len(), 1);
    assert_no_active_node(&outcome);
}

#[tokio::test]
async fn test_cancellation_settles_active_node() {
    let token = CancellationToken::new();
    let oracle = Arc::new(
        ScriptedOracle::new()
            .cancelling(token.clone())
            .thoughts(vec![draft("a", 0.8)])
            .decision(Decision::select("n0-t1", "go")),
    );
    let log = Arc::new(MemoryRunLog::new());
    let controller =
        SearchController::new(config(), oracle.clone(), log.clone()).with_cancellation(token);

    let outcome = controller.run("task").await.unwrap();

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(outcome.reason, TerminationReason::Cancelled);
    assert_eq!(outcome.tree.len(), 1);
    assert_eq!(status_of(&outcome, "n0"), NodeStatus::Exhausted);
    assert_eq!(log.records().await.len(), 1);
    assert_eq!(oracle.decide_calls(), 1);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let token = CancellationToken::new();
    token.cancel();
    let oracle = Arc::new(ScriptedOracle::new());
    let log = Arc::new(MemoryRunLog::new());
    let controller = SearchController::new(config(), oracle.clone(), log.clone())
        .with_cancellation(token);

    let outcome = controller.run("task").await.unwrap();

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert!(outcome.tree.is_empty());
    assert_eq!(oracle.generate_calls(), 0);
    assert!(log.records().await.is_empty());
}

mock! {
    pub Log {}

    #[async_trait]
    impl RunLog for Log {
        async fn begin_run(&self, task: &str, config: &[(String, String)]) -> AppResult<()>;
        async fn record(&self, record: NodeRecord) -> AppResult<()>;
        async fn finish_run(&self, outcome: &RunOutcome) -> AppResult<()>;
    }
}

#[tokio::test]
async fn test_agent_drives_run_log_lifecycle() {
    let mut log = MockLog::new();
    log.expect_begin_run()
        .withf(|task, config| task == "task" && config.iter().any(|(k, _)| k == "max_depth"))
        .times(1)
        .returning(|_, _| Ok(()));
    log.expect_record()
        .times(2)
        .returning(|_| Err(AppError::Internal {
            message: "disk full".to_string(),
        }));
    log.expect_finish_run()
        .withf(|outcome| outcome.status == RunStatus::Succeeded)
        .times(1)
        .returning(|_| Ok(()));

    let oracle = Arc::new(
        ScriptedOracle::new()
            .thoughts(vec![draft("a", 0.8)])
            .decision(Decision::select("n0-t1", "go"))
            .decision(Decision::success("done")),
    );

    let agent = Agent::new(config(), oracle, Arc::new(log));
    let outcome = agent.run("task").await;

    // A failing sink never stops the search
    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(outcome.solution_path, Some(vec!["task".to_string(), "a".to_string()]));
}

#[tokio::test]
async fn test_agent_reports_outcome_to_memory_log() {
    let log = Arc::new(MemoryRunLog::new());
    let oracle = Arc::new(ScriptedOracle::new().decision(Decision::backtrack("no")));

    let outcome = Agent::new(config(), oracle, log.clone()).run("task").await;

    assert_eq!(outcome.status, RunStatus::Failed);
    let reported = log.outcome().await.unwrap();
    assert_eq!(reported.reason, TerminationReason::RootExhausted);
    assert_eq!(reported.stats, outcome.stats);
}
