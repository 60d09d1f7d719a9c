use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use super::{Run, Storage};
use crate::error::{StorageError, StorageResult};
use crate::runlog::NodeRecord;
use crate::search::RunOutcome;

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub async fn new(path: &Path, max_connections: u32) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T, what: &str) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|e| StorageError::Query {
        message: format!("Failed to serialize {}: {}", what, e),
    })
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_run(&self, run: &Run) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO runs (id, task, started_at, config)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.task)
        .bind(run.started_at.to_rfc3339())
        .bind(to_json(&run.config, "config")?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_node_record(
        &self,
        run_id: &str,
        seq: u32,
        record: &NodeRecord,
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO node_records
                (run_id, seq, node_id, sub_problem, depth, visit, thoughts, decision, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run_id)
        .bind(seq as i64)
        .bind(&record.node_id)
        .bind(&record.sub_problem)
        .bind(record.depth as i64)
        .bind(record.visit as i64)
        .bind(to_json(&record.thoughts, "thoughts")?)
        .bind(to_json(&record.decision, "decision")?)
        .bind(record.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn finish_run(&self, run_id: &str, outcome: &RunOutcome) -> StorageResult<()> {
        let solution_path = outcome
            .solution_path
            .as_ref()
            .map(|p| to_json(p, "solution path"))
            .transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE runs
            SET finished_at = ?, status = ?, reason = ?, solution_path = ?, stats = ?, tree_snapshot = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(outcome.status.as_str())
        .bind(outcome.reason.to_string())
        .bind(solution_path)
        .bind(to_json(&outcome.stats, "stats")?)
        .bind(to_json(&outcome.tree, "tree")?)
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }

        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> StorageResult<Option<Run>> {
        let row: Option<RunRow> = sqlx::query_as(
            r#"
            SELECT id, task, started_at, finished_at, status, reason, solution_path, stats, tree_snapshot, config
            FROM runs
            WHERE id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn get_node_records(&self, run_id: &str) -> StorageResult<Vec<NodeRecord>> {
        let rows: Vec<NodeRecordRow> = sqlx::query_as(
            r#"
            SELECT node_id, sub_problem, depth, visit, thoughts, decision, recorded_at
            FROM node_records
            WHERE run_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(NodeRecord::try_from).collect()
    }
}

// Row types for SQLx

#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    task: String,
    started_at: String,
    finished_at: Option<String>,
    status: Option<String>,
    reason: Option<String>,
    solution_path: Option<String>,
    stats: Option<String>,
    tree_snapshot: Option<String>,
    config: String,
}

impl From<RunRow> for Run {
    fn from(row: RunRow) -> Self {
        Self {
            id: row.id,
            task: row.task,
            started_at: parse_timestamp(&row.started_at),
            finished_at: row.finished_at.as_deref().map(parse_timestamp),
            status: row.status,
            reason: row.reason,
            solution_path: row.solution_path.and_then(|s| serde_json::from_str(&s).ok()),
            stats: row.stats.and_then(|s| serde_json::from_str(&s).ok()),
            tree_snapshot: row.tree_snapshot.and_then(|s| serde_json::from_str(&s).ok()),
            config: serde_json::from_str(&row.config).unwrap_or_default(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct NodeRecordRow {
    node_id: String,
    sub_problem: String,
    depth: i64,
    visit: i64,
    thoughts: String,
    decision: String,
    recorded_at: String,
}

impl TryFrom<NodeRecordRow> for NodeRecord {
    type Error = StorageError;

    fn try_from(row: NodeRecordRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str, e: serde_json::Error| StorageError::Query {
            message: format!("Corrupt {} for node {}: {}", field, row.node_id, e),
        };

        Ok(Self {
            thoughts: serde_json::from_str(&row.thoughts).map_err(|e| corrupt("thoughts", e))?,
            decision: serde_json::from_str(&row.decision).map_err(|e| corrupt("decision", e))?,
            depth: row.depth.max(0) as usize,
            visit: row.visit.max(0) as u32,
            recorded_at: parse_timestamp(&row.recorded_at),
            node_id: row.node_id,
            sub_problem: row.sub_problem,
        })
    }
}
