use async_trait::async_trait;
use chrono::Local;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::{NodeRecord, RunLog};
use crate::error::{AppResult, RunLogError};
use crate::search::RunOutcome;

/// Human-readable Markdown report of a run.
///
/// The header is written by `begin_run` (truncating any existing file), one
/// section is appended per node visit, and `finish_run` appends the result.
/// Writes are serialized so sections never interleave.
pub struct MarkdownRunLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl MarkdownRunLog {
    /// Log at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Log at `template` with `{timestamp}` replaced by the current local
    /// time (`YYYYmmdd_HHMMSS`).
    pub fn from_template(template: &str) -> Self {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        Self::new(template.replace("{timestamp}", &timestamp))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, content: &str, truncate: bool) -> Result<(), RunLogError> {
        let io_err = |source| RunLogError::Io {
            path: self.path.display().to_string(),
            source,
        };

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let mut options = OpenOptions::new();
        options.create(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }

        let mut file = options.open(&self.path).await.map_err(io_err)?;
        file.write_all(content.as_bytes()).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        file.sync_data().await.map_err(io_err)?;

        debug!(path = %self.path.display(), bytes = content.len(), "Run log written");
        Ok(())
    }
}

fn render_header(task: &str, config: &[(String, String)]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Tree-of-Thoughts Agent Run\n");
    let _ = writeln!(
        out,
        "**Timestamp:** {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(out, "**Task:** {}\n", task);
    let _ = writeln!(out, "**Configuration:**");
    for (key, value) in config {
        let _ = writeln!(out, "- **{}**: {}", key, value);
    }
    let _ = writeln!(out, "\n## Thought Process\n");
    out
}

fn render_record(record: &NodeRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\n### Node: {} ({})\n",
        record.node_id,
        record
            .recorded_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
    if record.visit > 1 {
        let _ = writeln!(out, "*Revisit {} at depth {}*\n", record.visit, record.depth);
    }
    let _ = writeln!(out, "#### Sub-Problem\n> {}\n", record.sub_problem);
    let _ = writeln!(out, "#### Generated Thoughts\n");

    if record.thoughts.is_empty() {
        let _ = writeln!(out, "*No thoughts generated.*\n");
    }
    for t in &record.thoughts {
        let _ = writeln!(out, "**Thought {}:** {}", t.thought_id, t.description);
        let _ = writeln!(out, "- **Generation Rationale:** {}", t.generation_rationale);
        let _ = writeln!(out, "- **Evaluation Score:** {:.2}", t.evaluation_score);
        let _ = writeln!(
            out,
            "- **Evaluation Justification:** {}\n",
            t.evaluation_justification
        );
    }

    let _ = writeln!(out, "#### Decision");
    let _ = writeln!(out, "- **Action:** {}", record.decision.action_type);
    if let Some(id) = &record.decision.selected_thought_id {
        let _ = writeln!(out, "- **Selected Thought:** {}", id);
    }
    let _ = writeln!(out, "- **Rationale:** {}\n\n---\n", record.decision.decision_rationale);
    out
}

fn render_outcome(outcome: &RunOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n## Result\n");
    let _ = writeln!(out, "**Status:** {}\n", outcome.status);
    let _ = writeln!(out, "**Reason:** {}\n", outcome.reason);

    if let Some(path) = &outcome.solution_path {
        let _ = writeln!(out, "**Solution Path:**");
        for (i, step) in path.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, step);
        }
        out.push('\n');
    }

    let stats = &outcome.stats;
    let _ = writeln!(out, "**Statistics:**");
    let _ = writeln!(out, "- **nodes_created**: {}", stats.nodes_created);
    let _ = writeln!(out, "- **generation_calls**: {}", stats.generation_calls);
    let _ = writeln!(out, "- **decision_calls**: {}", stats.decision_calls);
    let _ = writeln!(out, "- **protocol_failures**: {}", stats.protocol_failures);
    let _ = writeln!(out, "- **backtracks**: {}", stats.backtracks);
    let _ = writeln!(out, "- **max_depth_reached**: {}", stats.max_depth_reached);
    let _ = writeln!(out, "- **elapsed_ms**: {}", stats.elapsed_ms);
    out
}

#[async_trait]
impl RunLog for MarkdownRunLog {
    async fn begin_run(&self, task: &str, config: &[(String, String)]) -> AppResult<()> {
        self.write(&render_header(task, config), true).await?;
        Ok(())
    }

    async fn record(&self, record: NodeRecord) -> AppResult<()> {
        self.write(&render_record(&record), false).await?;
        Ok(())
    }

    async fn finish_run(&self, outcome: &RunOutcome) -> AppResult<()> {
        self.write(&render_outcome(outcome), false).await?;
        Ok(())
    }
}
