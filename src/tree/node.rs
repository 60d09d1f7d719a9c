use serde::{Deserialize, Serialize};

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Created but not (currently) being expanded.
    #[default]
    Open,
    /// The single frontier node of the run.
    Active,
    /// All options rejected, or backtracked from.
    Exhausted,
    /// Terminal success reached through this node.
    Solved,
}

impl NodeStatus {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Open => "open",
            NodeStatus::Active => "active",
            NodeStatus::Exhausted => "exhausted",
            NodeStatus::Solved => "solved",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(NodeStatus::Open),
            "active" => Ok(NodeStatus::Active),
            "exhausted" => Ok(NodeStatus::Exhausted),
            "solved" => Ok(NodeStatus::Solved),
            _ => Err(format!("Unknown node status: {}", s)),
        }
    }
}

/// A thought as proposed by the oracle, before it is numbered under a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThoughtDraft {
    pub description: String,
    #[serde(default)]
    pub generation_rationale: String,
    #[serde(default)]
    pub evaluation_score: Option<f64>,
    #[serde(default)]
    pub evaluation_justification: String,
}

impl ThoughtDraft {
    /// Draft with only a description.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.generation_rationale = rationale.into();
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.evaluation_score = Some(score);
        self
    }

    pub fn with_justification(mut self, justification: impl Into<String>) -> Self {
        self.evaluation_justification = justification.into();
        self
    }
}

/// A candidate reasoning step recorded on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    /// `{node_id}-t{n}`, unique within the owning node.
    pub thought_id: String,
    pub description: String,
    pub generation_rationale: String,
    /// In [0.0, 1.0]; higher is more promising.
    pub evaluation_score: f64,
    pub evaluation_justification: String,
}

impl Thought {
    /// Number a draft as the `seq`-th (1-based) thought of `node_id`.
    ///
    /// A missing or non-finite score becomes 0.0; finite scores are clamped
    /// into [0.0, 1.0].
    pub fn from_draft(node_id: &str, seq: usize, draft: ThoughtDraft) -> Self {
        let score = draft
            .evaluation_score
            .filter(|s| s.is_finite())
            .map(|s| s.clamp(0.0, 1.0))
            .unwrap_or(0.0);

        Self {
            thought_id: thought_id(node_id, seq),
            description: draft.description.trim().to_string(),
            generation_rationale: draft.generation_rationale.trim().to_string(),
            evaluation_score: score,
            evaluation_justification: draft.evaluation_justification.trim().to_string(),
        }
    }
}

/// Id of the `seq`-th (1-based) thought of `node_id`.
pub fn thought_id(node_id: &str, seq: usize) -> String {
    format!("{}-t{}", node_id, seq)
}

/// A point in the reasoning tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Hierarchical id encoding lineage (`n0`, `n0.1`, `n0.1.2`, ...).
    pub id: String,
    pub sub_problem: String,
    pub parent_id: Option<String>,
    /// In the order the children were descended into.
    pub children_ids: Vec<String>,
    pub status: NodeStatus,
    /// Distance from the root.
    pub depth: usize,
    /// Thought of the parent this node was created from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_thought_id: Option<String>,
    /// Thoughts of the current generation round. Write-once per round.
    pub thoughts: Vec<Thought>,
    /// Whether `thoughts` has been written for the current round (it may be
    /// written as empty).
    pub thoughts_recorded: bool,
    /// Thoughts of earlier rounds, kept for audit when a revisit
    /// regenerates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retired_thoughts: Vec<Thought>,
    /// How many times the node has been made active.
    pub visits: u32,
}

impl Node {
    pub(crate) fn new(
        id: String,
        sub_problem: String,
        parent_id: Option<String>,
        depth: usize,
    ) -> Self {
        Self {
            id,
            sub_problem,
            parent_id,
            children_ids: Vec::new(),
            status: NodeStatus::Open,
            depth,
            origin_thought_id: None,
            thoughts: Vec::new(),
            thoughts_recorded: false,
            retired_thoughts: Vec::new(),
            visits: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Look up one of the current thoughts.
    pub fn thought(&self, thought_id: &str) -> Option<&Thought> {
        self.thoughts.iter().find(|t| t.thought_id == thought_id)
    }

    /// Sequence number the next recorded thought will get. Numbering spans
    /// every round so ids are never reused.
    pub fn next_thought_seq(&self) -> usize {
        self.retired_thoughts.len() + self.thoughts.len() + 1
    }

    /// The current thought with the highest score, ties going to the
    /// earlier one.
    pub fn best_thought(&self) -> Option<&Thought> {
        self.thoughts.iter().fold(None, |best: Option<&Thought>, t| match best {
            Some(b) if b.evaluation_score >= t.evaluation_score => Some(b),
            _ => Some(t),
        })
    }
}
