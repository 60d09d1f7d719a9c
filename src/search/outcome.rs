use serde::{Deserialize, Serialize};

use crate::tree::ReasoningTree;

/// Final status of a run as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Cancelled,
    /// A structural fault in the tree; never caused by the oracle.
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Global guard that ended a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Guard {
    MaxNodes,
    MaxOracleCalls,
    MaxWallClock,
}

impl Guard {
    pub fn as_str(&self) -> &'static str {
        match self {
            Guard::MaxNodes => "max_nodes",
            Guard::MaxOracleCalls => "max_oracle_calls",
            Guard::MaxWallClock => "max_wall_clock",
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TerminationReason {
    Solved,
    /// Backtracked out of the root.
    RootExhausted,
    ResourceExhausted(Guard),
    Cancelled,
    StructuralFault(String),
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::Solved => write!(f, "solved"),
            TerminationReason::RootExhausted => write!(f, "root_exhausted"),
            TerminationReason::ResourceExhausted(guard) => {
                write!(f, "resource_exhausted({})", guard.as_str())
            }
            TerminationReason::Cancelled => write!(f, "cancelled"),
            TerminationReason::StructuralFault(message) => {
                write!(f, "structural_fault: {}", message)
            }
        }
    }
}

/// Counters collected over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub nodes_created: usize,
    pub generation_calls: u32,
    pub decision_calls: u32,
    /// Generation or decision replies that broke the contract.
    pub protocol_failures: u32,
    pub backtracks: u32,
    pub max_depth_reached: usize,
    pub elapsed_ms: u64,
}

/// Everything a run produces.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub reason: TerminationReason,
    /// Sub-problems from the root to the solved node. Only set on success.
    pub solution_path: Option<Vec<String>>,
    pub stats: RunStats,
    pub tree: ReasoningTree,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}
