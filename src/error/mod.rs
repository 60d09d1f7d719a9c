use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Langbase error: {0}")]
    Langbase(#[from] LangbaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Run log error: {0}")]
    RunLog(#[from] RunLogError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Structural violations of the reasoning tree.
///
/// These always indicate a controller bug, never an oracle problem, and are
/// the only errors that escape a search run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Invalid parent: {parent_id}")]
    InvalidParent { parent_id: String },

    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: String },

    #[error("Thoughts already recorded for node: {node_id}")]
    AlreadyRecorded { node_id: String },

    #[error("Duplicate node id: {node_id}")]
    DuplicateId { node_id: String },

    #[error("Cannot activate {node_id}: {active_id} is still active")]
    ActiveConflict { node_id: String, active_id: String },

    #[error("Invalid status transition for {node_id}: {from} -> {to}")]
    InvalidTransition {
        node_id: String,
        from: String,
        to: String,
    },

    #[error("No active node")]
    NoActiveNode,

    #[error("Root already exists: {root_id}")]
    RootExists { root_id: String },

    #[error("Lineage of {node_id} does not terminate at the root")]
    CorruptLineage { node_id: String },
}

/// Errors surfaced by the oracle boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("Oracle unavailable after {attempts} attempts: {message}")]
    Transient { message: String, attempts: u32 },

    #[error("Oracle protocol violation: {message}")]
    Protocol { message: String },
}

impl OracleError {
    /// Shorthand for a protocol violation.
    pub fn protocol(message: impl Into<String>) -> Self {
        OracleError::Protocol {
            message: message.into(),
        }
    }
}

/// Langbase API errors
#[derive(Debug, Error)]
pub enum LangbaseError {
    #[error("Langbase unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl LangbaseError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LangbaseError::Timeout { .. } => true,
            LangbaseError::Api { status, .. } => *status == 429 || *status >= 500,
            LangbaseError::Http(e) => e.is_connect() || e.is_timeout(),
            LangbaseError::Unavailable { .. } | LangbaseError::InvalidResponse { .. } => false,
        }
    }
}

impl From<LangbaseError> for OracleError {
    fn from(err: LangbaseError) -> Self {
        match err {
            LangbaseError::Unavailable { message, retries } => OracleError::Transient {
                message,
                attempts: retries,
            },
            err if err.is_transient() => OracleError::Transient {
                message: err.to_string(),
                attempts: 1,
            },
            err => OracleError::Protocol {
                message: err.to_string(),
            },
        }
    }
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Markdown run log errors
#[derive(Debug, Error)]
pub enum RunLogError {
    #[error("Failed to write run log {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for tree operations
pub type TreeResult<T> = Result<T, TreeError>;

/// Result type alias for oracle operations
pub type OracleResult<T> = Result<T, OracleError>;

/// Result type alias for Langbase operations
pub type LangbaseResult<T> = Result<T, LangbaseError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_tree_error_display() {
        let err = TreeError::InvalidParent {
            parent_id: "n0.9".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid parent: n0.9");

        let err = TreeError::AlreadyRecorded {
            node_id: "n0".to_string(),
        };
        assert_eq!(err.to_string(), "Thoughts already recorded for node: n0");

        let err = TreeError::ActiveConflict {
            node_id: "n0.1".to_string(),
            active_id: "n0".to_string(),
        };
        assert_eq!(err.to_string(), "Cannot activate n0.1: n0 is still active");

        let err = TreeError::InvalidTransition {
            node_id: "n0".to_string(),
            from: "solved".to_string(),
            to: "active".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition for n0: solved -> active"
        );
    }

    #[test]
    fn test_oracle_error_display() {
        let err = OracleError::Transient {
            message: "timeout".to_string(),
            attempts: 4,
        };
        assert_eq!(
            err.to_string(),
            "Oracle unavailable after 4 attempts: timeout"
        );

        let err = OracleError::protocol("missing action_type");
        assert_eq!(
            err.to_string(),
            "Oracle protocol violation: missing action_type"
        );
    }

    #[test]
    fn test_langbase_error_transient_classification() {
        assert!(LangbaseError::Timeout { timeout_ms: 10 }.is_transient());
        assert!(LangbaseError::Api {
            status: 503,
            message: "busy".to_string()
        }
        .is_transient());
        assert!(LangbaseError::Api {
            status: 429,
            message: "slow down".to_string()
        }
        .is_transient());
        assert!(!LangbaseError::Api {
            status: 401,
            message: "unauthorized".to_string()
        }
        .is_transient());
        assert!(!LangbaseError::InvalidResponse {
            message: "bad json".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_langbase_error_conversion_to_oracle_error() {
        let err: OracleError = LangbaseError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        }
        .into();
        assert!(matches!(err, OracleError::Transient { attempts: 3, .. }));

        let err: OracleError = LangbaseError::InvalidResponse {
            message: "malformed JSON".to_string(),
        }
        .into();
        assert!(matches!(err, OracleError::Protocol { .. }));

        let err: OracleError = LangbaseError::Api {
            status: 400,
            message: "bad request".to_string(),
        }
        .into();
        assert!(matches!(err, OracleError::Protocol { .. }));
    }

    #[test]
    fn test_tree_error_conversion_to_app_error() {
        let app_err: AppError = TreeError::NoActiveNode.into();
        assert!(matches!(app_err, AppError::Tree(_)));
        assert_eq!(app_err.to_string(), "Tree error: No active node");
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let storage_err = StorageError::RunNotFound {
            run_id: "run-123".to_string(),
        };
        let app_err: AppError = storage_err.into();
        assert!(matches!(app_err, AppError::Storage(_)));
        assert!(app_err.to_string().contains("run-123"));
    }
}
