//! DBAction library (C2): small, idempotent, named units of SQL.
//!
//! Operations (C4) never touch the connection directly — they emit
//! `Box<dyn DbAction>` values that the Coordinator (C5) dedupes and
//! executes in order. Every action exposes a deterministic [`DbAction::id`]
//! used both for deduplication and log attribution.

pub mod column;
pub mod constraint;
pub mod function;
pub mod index;
pub mod raw;
pub mod table;
pub mod trigger;

use async_trait::async_trait;

use crate::error::ActionError;
use crate::interfaces::Connection;

#[async_trait]
pub trait DbAction: std::fmt::Debug + Send + Sync {
    /// Deterministic, collision-free identifier of the form
    /// `<verb>_<primary target>[_<secondary>]`. Equal IDs must be
    /// semantically interchangeable — the Coordinator relies on this.
    fn id(&self) -> String;

    /// Executes the action. Must be idempotent on retry within the same
    /// phase.
    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError>;
}

/// Runs a single statement and wraps any driver error with the action ID.
pub(crate) async fn exec_one(
    conn: &mut dyn Connection,
    action_id: &str,
    sql: &str,
) -> Result<(), ActionError> {
    conn.execute(sql).await.map_err(|e| match e {
        ActionError::Database { source, .. } => ActionError::Database {
            action_id: action_id.to_string(),
            source,
        },
        other => other,
    })?;
    Ok(())
}

pub type BoxedAction = Box<dyn DbAction>;
