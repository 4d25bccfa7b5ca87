//! External collaborators (C8), expressed as minimal async traits.
//!
//! The database driver, migration-state persistence, the physical backfill
//! row-copier, and the view-serving layer are all out of scope for this
//! crate (see `spec.md` §1) — it only defines the contract each must meet.
//! `src/testutil.rs` provides in-memory implementations for tests and the
//! CLI's dry-run mode.

use async_trait::async_trait;

use crate::error::ActionError;

/// A single database connection. DBActions execute SQL through this trait
/// so the engine never depends on a concrete driver.
#[async_trait]
pub trait Connection: Send {
    /// Executes a statement that returns no rows, returning the affected
    /// row count where the underlying driver reports one.
    async fn execute(&mut self, sql: &str) -> Result<u64, ActionError>;

    /// Executes a query expected to return a single boolean column in its
    /// first row (used by the concurrent-index poll loop to read
    /// `pg_index.indisvalid` / progress views without hard-coding a driver
    /// type). `Ok(None)` means the query returned no rows.
    async fn query_scalar_bool(&mut self, sql: &str) -> Result<Option<bool>, ActionError>;

    fn in_transaction(&self) -> bool;

    async fn begin(&mut self) -> Result<(), ActionError>;
    async fn commit(&mut self) -> Result<(), ActionError>;
    async fn rollback(&mut self) -> Result<(), ActionError>;
}

/// Persists migration status. Layout on disk/in the target database is
/// opaque to the engine.
#[async_trait]
pub trait StateStore: Send {
    async fn latest_version(&mut self, schema: &str) -> Result<Option<String>, ActionError>;
    async fn start_migration(&mut self, schema: &str, name: &str) -> Result<(), ActionError>;
    async fn complete_migration(&mut self, schema: &str, name: &str) -> Result<(), ActionError>;
    async fn rollback_migration(&mut self, schema: &str, name: &str) -> Result<(), ActionError>;
}

/// A unit of backfill work emitted by an alter-family operation's Start.
#[derive(Debug, Clone)]
pub struct BackfillTask {
    pub table: String,
    /// Logical columns being populated in this pass (their physical names
    /// are resolved by the backfiller against the live schema).
    pub columns: Vec<String>,
}

/// Copies existing rows into shadow columns in batches, using the
/// `_pgroll_needs_backfill` scratch column as a watermark.
#[async_trait]
pub trait Backfiller: Send {
    async fn run(&mut self, tasks: &[BackfillTask]) -> Result<(), ActionError>;
}

/// The projection of a table exposed by one migration's versioned schema:
/// logical column name -> physical column name.
#[derive(Debug, Clone, Default)]
pub struct ViewProjection {
    pub table: String,
    pub columns: Vec<(String, String)>,
}

/// Creates the `<schema>_<migration_name>` namespace of views that the
/// triggers use `search_path` to distinguish between.
#[async_trait]
pub trait ViewManager: Send {
    async fn create_versioned_schema(
        &mut self,
        schema: &str,
        migration_name: &str,
        projections: &[ViewProjection],
    ) -> Result<(), ActionError>;

    async fn drop_versioned_schema(
        &mut self,
        schema: &str,
        migration_name: &str,
    ) -> Result<(), ActionError>;
}

/// Formats the versioned-schema name the engine and triggers both rely on.
pub fn versioned_schema_name(schema: &str, migration_name: &str) -> String {
    format!("{schema}_{migration_name}")
}
