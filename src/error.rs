//! Error types for the migration engine.
//!
//! One `thiserror` enum per subsystem, matching the granularity spec.md §7
//! lays out. `EngineError` is the top-level type returned by the phase
//! runner and composes the others without losing the original message.

use thiserror::Error;

/// Errors raised while validating an [`crate::schema::Schema`] or an
/// operation's preconditions against it. Purely in-memory — never touches
/// the database.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidateError {
    #[error("table does not exist: {name}")]
    TableDoesNotExist { name: String },

    #[error("table already exists: {name}")]
    TableAlreadyExists { name: String },

    #[error("column does not exist: {table}.{name}")]
    ColumnDoesNotExist { table: String, name: String },

    #[error("column is not nullable: {table}.{name}")]
    ColumnIsNotNullable { table: String, name: String },

    #[error("column migration missing required field: {table}.{name}")]
    ColumnMigrationMissing { table: String, name: String },

    #[error("constraint does not exist: {table}.{constraint}")]
    ConstraintDoesNotExist { table: String, constraint: String },

    #[error("constraint already exists: {table}.{constraint}")]
    ConstraintAlreadyExists { table: String, constraint: String },

    #[error("index does not exist: {name}")]
    IndexDoesNotExist { name: String },

    #[error("index already exists: {name}")]
    IndexAlreadyExists { name: String },

    #[error("invalid replica identity {identity} for table {table}")]
    InvalidReplicaIdentity { table: String, identity: String },

    #[error("field required: {name}")]
    FieldRequired { name: String },

    #[error("identifier too long (max 63 bytes): {name}")]
    IdentifierTooLong { name: String },
}

/// Errors raised executing a single [`crate::dbaction::DbAction`].
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("action {action_id} failed: {source}")]
    Database {
        action_id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("action {action_id} failed: concurrent index creation left an invalid index after {attempts} attempts")]
    IndexCreation { action_id: String, attempts: u32 },

    #[error("action {action_id} cannot run inside a transaction")]
    MustNotRunInTransaction { action_id: String },

    #[error("action {action_id} was cancelled")]
    Cancelled { action_id: String },
}

impl ActionError {
    pub fn action_id(&self) -> &str {
        match self {
            ActionError::Database { action_id, .. }
            | ActionError::IndexCreation { action_id, .. }
            | ActionError::MustNotRunInTransaction { action_id, .. }
            | ActionError::Cancelled { action_id, .. } => action_id,
        }
    }
}

/// Errors surfaced by the [`crate::engine::Engine`] phase runner.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed for operation {op_index} ({op_name}): {source}")]
    Validate {
        op_index: usize,
        op_name: String,
        #[source]
        source: ValidateError,
    },

    #[error("start failed for operation {op_index} ({op_name}), rollback attempted: {source}")]
    Start {
        op_index: usize,
        op_name: String,
        #[source]
        source: ActionError,
    },

    #[error("complete failed: {source}")]
    Complete {
        #[source]
        source: ActionError,
    },

    #[error("rollback failed: {source}")]
    Rollback {
        #[source]
        source: ActionError,
    },

    #[error("backfill failed: {0}")]
    BackfillFailed(String),

    #[error("state store error: {0}")]
    StateStore(String),
}

/// Errors raised decoding a migration document (§6/§4.6).
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("IO error reading migration document: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("malformed operation entry: expected exactly one key, found {count}")]
    MultiKeyOperation { count: usize },

    #[error("unknown operation tag: {tag}")]
    UnknownTag { tag: String },

    #[error("failed to decode payload for operation `{tag}`: {message}")]
    PayloadDecode { tag: String, message: String },
}

/// Engine configuration load errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}
