//! The oracle boundary: thought generation and decisions.
//!
//! The search controller only sees the [`Oracle`] trait. Implementations own
//! their transport and retries; by the time a call returns, transient
//! failures have either been retried away or exhausted into
//! [`OracleError::Transient`].

mod langbase;

pub use langbase::LangbaseOracle;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{OracleError, OracleResult, TreeResult};
use crate::tree::{Node, ReasoningTree, Thought, ThoughtDraft};

/// Shape of an oracle reply: the structured contract was honoured, or only
/// free-form text came back.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleResponse<T> {
    Structured(T),
    RawText(String),
}

/// What to do after evaluating a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    Select,
    Backtrack,
    Success,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Select => "Select",
            ActionType::Backtrack => "Backtrack",
            ActionType::Success => "Success",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "select" => Ok(ActionType::Select),
            "backtrack" => Ok(ActionType::Backtrack),
            "success" => Ok(ActionType::Success),
            other => Err(OracleError::protocol(format!(
                "unknown action_type '{}'",
                other
            ))),
        }
    }
}

/// A validated-shape decision. Whether `selected_thought_id` resolves is
/// checked against the node with [`Decision::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action_type: ActionType,
    pub selected_thought_id: Option<String>,
    pub decision_rationale: String,
}

impl Decision {
    pub fn select(thought_id: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::Select,
            selected_thought_id: Some(thought_id.into()),
            decision_rationale: rationale.into(),
        }
    }

    pub fn backtrack(rationale: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::Backtrack,
            selected_thought_id: None,
            decision_rationale: rationale.into(),
        }
    }

    pub fn success(rationale: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::Success,
            selected_thought_id: None,
            decision_rationale: rationale.into(),
        }
    }

    /// Check the decision against the thoughts of the node it was made for.
    ///
    /// `Select` needs an id naming one of `thoughts`; `Backtrack` and
    /// `Success` must not carry one.
    pub fn validate(&self, thoughts: &[Thought]) -> OracleResult<()> {
        match (self.action_type, self.selected_thought_id.as_deref()) {
            (ActionType::Select, None) => Err(OracleError::protocol(
                "Select decision without selected_thought_id",
            )),
            (ActionType::Select, Some(id)) => {
                if thoughts.iter().any(|t| t.thought_id == id) {
                    Ok(())
                } else {
                    Err(OracleError::protocol(format!(
                        "selected_thought_id '{}' does not belong to the active node",
                        id
                    )))
                }
            }
            (action, Some(id)) => Err(OracleError::protocol(format!(
                "{} decision must not select a thought (got '{}')",
                action, id
            ))),
            (_, None) => Ok(()),
        }
    }
}

/// Decision exactly as an oracle emits it, before the action is checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionPayload {
    pub action_type: String,
    #[serde(default)]
    pub selected_thought_id: Option<String>,
    #[serde(default)]
    pub decision_rationale: String,
}

impl TryFrom<DecisionPayload> for Decision {
    type Error = OracleError;

    fn try_from(payload: DecisionPayload) -> Result<Self, Self::Error> {
        Ok(Decision {
            action_type: payload.action_type.parse()?,
            selected_thought_id: payload
                .selected_thought_id
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty() && s != "null"),
            decision_rationale: payload.decision_rationale,
        })
    }
}

/// What the oracle is told about where a node sits in the search.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AncestorContext {
    /// Sub-problems from the root down to the parent.
    pub ancestors: Vec<String>,
    /// Sub-problems already descended into from this node.
    pub explored: Vec<String>,
    pub depth: usize,
    pub max_depth: usize,
}

impl AncestorContext {
    /// Build the context of `node_id`.
    pub fn for_node(tree: &ReasoningTree, node_id: &str, max_depth: usize) -> TreeResult<Self> {
        let node = tree.get_node(node_id)?;
        let mut ancestors: Vec<String> = tree
            .path_to_root(node_id)?
            .into_iter()
            .skip(1)
            .map(|n| n.sub_problem.clone())
            .collect();
        ancestors.reverse();

        let explored = node
            .children_ids
            .iter()
            .map(|id| tree.get_node(id).map(|c| c.sub_problem.clone()))
            .collect::<TreeResult<Vec<_>>>()?;

        Ok(Self {
            ancestors,
            explored,
            depth: node.depth,
            max_depth,
        })
    }
}

/// Source of thoughts and decisions.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Propose candidate thoughts for a sub-problem.
    async fn generate(
        &self,
        sub_problem: &str,
        context: &AncestorContext,
    ) -> OracleResult<OracleResponse<Vec<ThoughtDraft>>>;

    /// Choose the next action for `node` given its thoughts.
    async fn decide(
        &self,
        node: &Node,
        thoughts: &[Thought],
        context: &AncestorContext,
    ) -> OracleResult<OracleResponse<Decision>>;
}
