//! The in-memory reasoning tree.
//!
//! The tree owns every node for the lifetime of a run; nothing is ever
//! pruned, so the search can backtrack to any ancestor. The single active
//! node is held as a field and only changes through [`ReasoningTree::mark_status`]
//! and [`ReasoningTree::activate`].

mod node;

pub use node::*;

use serde::Serialize;
use std::collections::HashMap;

use crate::error::{TreeError, TreeResult};

/// Prefix of the root id.
pub const ROOT_ID: &str = "n0";

/// Rooted tree of reasoning nodes with one active frontier node.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReasoningTree {
    /// Nodes in creation order.
    nodes: Vec<Node>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    active: Option<String>,
}

impl ReasoningTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes created so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn root(&self) -> Option<&Node> {
        self.nodes.first()
    }

    /// Id of the active node, if any.
    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// The active node.
    pub fn active_node(&self) -> TreeResult<&Node> {
        let id = self.active.as_deref().ok_or(TreeError::NoActiveNode)?;
        self.get_node(id)
    }

    /// Create the root node holding the original task.
    pub fn create_root(&mut self, sub_problem: impl Into<String>) -> TreeResult<String> {
        if let Some(root) = self.root() {
            return Err(TreeError::RootExists {
                root_id: root.id.clone(),
            });
        }
        let id = ROOT_ID.to_string();
        self.insert(Node::new(id.clone(), sub_problem.into(), None, 0))?;
        Ok(id)
    }

    /// Create a child of `parent_id`. The id is `{parent_id}.{k}` where `k`
    /// is the child's 1-based position among its siblings.
    pub fn create_node(
        &mut self,
        parent_id: &str,
        sub_problem: impl Into<String>,
    ) -> TreeResult<String> {
        let (id, depth) = {
            let parent = self
                .node(parent_id)
                .ok_or_else(|| TreeError::InvalidParent {
                    parent_id: parent_id.to_string(),
                })?;
            (
                format!("{}.{}", parent.id, parent.children_ids.len() + 1),
                parent.depth + 1,
            )
        };

        self.insert(Node::new(
            id.clone(),
            sub_problem.into(),
            Some(parent_id.to_string()),
            depth,
        ))?;
        self.node_mut(parent_id)?.children_ids.push(id.clone());
        Ok(id)
    }

    /// Create a child whose sub-problem is one of the parent's thoughts.
    pub fn create_node_for_thought(
        &mut self,
        parent_id: &str,
        thought_id: &str,
    ) -> TreeResult<String> {
        let description = self
            .node(parent_id)
            .ok_or_else(|| TreeError::InvalidParent {
                parent_id: parent_id.to_string(),
            })?
            .thought(thought_id)
            .map(|t| t.description.clone())
            .ok_or_else(|| TreeError::NodeNotFound {
                node_id: thought_id.to_string(),
            })?;

        let id = self.create_node(parent_id, description)?;
        self.node_mut(&id)?.origin_thought_id = Some(thought_id.to_string());
        Ok(id)
    }

    /// Look up a node.
    pub fn get_node(&self, node_id: &str) -> TreeResult<&Node> {
        self.node(node_id).ok_or_else(|| TreeError::NodeNotFound {
            node_id: node_id.to_string(),
        })
    }

    /// Record the thoughts of the current round. Fails if they were already
    /// recorded, leaving the existing ones untouched.
    pub fn record_thoughts(&mut self, node_id: &str, thoughts: Vec<Thought>) -> TreeResult<()> {
        let node = self.node_mut(node_id)?;
        if node.thoughts_recorded {
            return Err(TreeError::AlreadyRecorded {
                node_id: node_id.to_string(),
            });
        }
        node.thoughts = thoughts;
        node.thoughts_recorded = true;
        Ok(())
    }

    /// Move the current thoughts into the node's history so a fresh round can
    /// be recorded.
    pub fn retire_thoughts(&mut self, node_id: &str) -> TreeResult<()> {
        let node = self.node_mut(node_id)?;
        let current = std::mem::take(&mut node.thoughts);
        node.retired_thoughts.extend(current);
        node.thoughts_recorded = false;
        Ok(())
    }

    /// Set a node's status.
    ///
    /// Setting `Active` fails with [`TreeError::ActiveConflict`] while another
    /// node is active; demote it first, or use [`ReasoningTree::activate`].
    /// `Solved` is terminal.
    pub fn mark_status(&mut self, node_id: &str, status: NodeStatus) -> TreeResult<()> {
        if status == NodeStatus::Active {
            if let Some(active_id) = self.active.as_deref() {
                if active_id != node_id {
                    return Err(TreeError::ActiveConflict {
                        node_id: node_id.to_string(),
                        active_id: active_id.to_string(),
                    });
                }
            }
        }

        let node = self.node_mut(node_id)?;
        if node.status == NodeStatus::Solved && status != NodeStatus::Solved {
            return Err(TreeError::InvalidTransition {
                node_id: node_id.to_string(),
                from: node.status.to_string(),
                to: status.to_string(),
            });
        }

        let was_active = node.status == NodeStatus::Active;
        node.status = status;
        match status {
            NodeStatus::Active if !was_active => {
                node.visits += 1;
                self.active = Some(node_id.to_string());
            }
            NodeStatus::Active => {}
            _ if was_active => self.active = None,
            _ => {}
        }
        Ok(())
    }

    /// Make `node_id` the active node, first demoting the current one to
    /// `demote_to` (which must be `Open` or `Exhausted`).
    pub fn activate(&mut self, node_id: &str, demote_to: NodeStatus) -> TreeResult<()> {
        if !matches!(demote_to, NodeStatus::Open | NodeStatus::Exhausted) {
            return Err(TreeError::InvalidTransition {
                node_id: self.active.clone().unwrap_or_default(),
                from: NodeStatus::Active.to_string(),
                to: demote_to.to_string(),
            });
        }
        // Fail before demoting so a missing target leaves the tree unchanged.
        self.get_node(node_id)?;

        if let Some(current) = self.active.clone() {
            if current != node_id {
                self.mark_status(&current, demote_to)?;
            }
        }
        self.mark_status(node_id, NodeStatus::Active)
    }

    /// Nodes from `node_id` up to the root, `node_id` first.
    pub fn path_to_root(&self, node_id: &str) -> TreeResult<Vec<&Node>> {
        let mut path = Vec::new();
        let mut current = Some(self.get_node(node_id)?);

        while let Some(node) = current {
            if path.len() >= self.nodes.len() {
                return Err(TreeError::CorruptLineage {
                    node_id: node_id.to_string(),
                });
            }
            path.push(node);
            current = match node.parent_id.as_deref() {
                Some(parent_id) => Some(self.node(parent_id).ok_or_else(|| {
                    TreeError::CorruptLineage {
                        node_id: node_id.to_string(),
                    }
                })?),
                None => None,
            };
        }
        Ok(path)
    }

    /// Sub-problems from the root down to `node_id`.
    pub fn solution_path(&self, node_id: &str) -> TreeResult<Vec<String>> {
        Ok(self
            .path_to_root(node_id)?
            .into_iter()
            .rev()
            .map(|n| n.sub_problem.clone())
            .collect())
    }

    fn insert(&mut self, node: Node) -> TreeResult<()> {
        if self.index.contains_key(&node.id) {
            return Err(TreeError::DuplicateId { node_id: node.id });
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    fn node(&self, node_id: &str) -> Option<&Node> {
        self.index.get(node_id).map(|&i| &self.nodes[i])
    }

    fn node_mut(&mut self, node_id: &str) -> TreeResult<&mut Node> {
        match self.index.get(node_id) {
            Some(&i) => Ok(&mut self.nodes[i]),
            None => Err(TreeError::NodeNotFound {
                node_id: node_id.to_string(),
            }),
        }
    }
}
