//! In-memory fakes for the external collaborators (C8), used by tests
//! across the crate and by the CLI's dry-run mode. Grounded on the
//! teacher's `catalog::builder::CatalogBuilder` pattern: small builder-style
//! structs that stand in for state a real integration would load from disk
//! or a live connection.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::ActionError;
use crate::interfaces::{BackfillTask, Backfiller, Connection, StateStore, ViewManager, ViewProjection};

/// Records every statement passed to `execute`, for assertions in tests and
/// for the CLI's dry-run mode (where nothing is actually sent to a
/// database). `query_scalar_bool` always answers from a pre-seeded table of
/// query string -> result, defaulting to `None` for anything unseeded.
#[derive(Debug, Default)]
pub struct RecordingConnection {
    pub executed: Vec<String>,
    pub scalar_bool_answers: HashMap<String, bool>,
    in_transaction: bool,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeds the answer `query_scalar_bool` gives for an exact query
    /// string match — used to drive the concurrent-index retry loop through
    /// a fixed number of "not yet valid" polls before succeeding.
    pub fn seed_scalar_bool(&mut self, query: impl Into<String>, answer: bool) {
        self.scalar_bool_answers.insert(query.into(), answer);
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn execute(&mut self, sql: &str) -> Result<u64, ActionError> {
        self.executed.push(sql.to_string());
        Ok(0)
    }

    async fn query_scalar_bool(&mut self, sql: &str) -> Result<Option<bool>, ActionError> {
        Ok(self.scalar_bool_answers.get(sql).copied())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn begin(&mut self) -> Result<(), ActionError> {
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), ActionError> {
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), ActionError> {
        self.in_transaction = false;
        Ok(())
    }
}

/// Migration status, keyed by schema name, held in memory rather than
/// persisted anywhere. Good enough for tests and a CLI dry-run.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    latest: HashMap<String, String>,
    history: Vec<String>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `start_migration`/`complete_migration`/`rollback_migration`
    /// call, in order, formatted as `"<verb>:<schema>:<name>"` — for
    /// asserting call order in tests.
    pub fn history(&self) -> &[String] {
        &self.history
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn latest_version(&mut self, schema: &str) -> Result<Option<String>, ActionError> {
        Ok(self.latest.get(schema).cloned())
    }

    async fn start_migration(&mut self, schema: &str, name: &str) -> Result<(), ActionError> {
        self.history.push(format!("start:{schema}:{name}"));
        Ok(())
    }

    async fn complete_migration(&mut self, schema: &str, name: &str) -> Result<(), ActionError> {
        self.latest.insert(schema.to_string(), name.to_string());
        self.history.push(format!("complete:{schema}:{name}"));
        Ok(())
    }

    async fn rollback_migration(&mut self, schema: &str, name: &str) -> Result<(), ActionError> {
        self.history.push(format!("rollback:{schema}:{name}"));
        Ok(())
    }
}

/// Records the table names it was asked to back-fill, without copying any
/// rows — the physical row-copier is an external collaborator (§1).
#[derive(Debug, Default)]
pub struct NoopBackfiller {
    pub runs: Vec<Vec<String>>,
}

impl NoopBackfiller {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backfiller for NoopBackfiller {
    async fn run(&mut self, tasks: &[BackfillTask]) -> Result<(), ActionError> {
        self.runs
            .push(tasks.iter().map(|t| t.table.clone()).collect());
        Ok(())
    }
}

/// Records versioned-schema create/drop calls without creating any views.
#[derive(Debug, Default)]
pub struct NoopViewManager {
    pub created: Vec<(String, Vec<ViewProjection>)>,
    pub dropped: Vec<String>,
}

impl NoopViewManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ViewManager for NoopViewManager {
    async fn create_versioned_schema(
        &mut self,
        schema: &str,
        migration_name: &str,
        projections: &[ViewProjection],
    ) -> Result<(), ActionError> {
        self.created.push((
            crate::interfaces::versioned_schema_name(schema, migration_name),
            projections.to_vec(),
        ));
        Ok(())
    }

    async fn drop_versioned_schema(
        &mut self,
        schema: &str,
        migration_name: &str,
    ) -> Result<(), ActionError> {
        self.dropped
            .push(crate::interfaces::versioned_schema_name(schema, migration_name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_connection_tracks_executed_statements() {
        let mut conn = RecordingConnection::new();
        conn.execute("CREATE TABLE widgets (id int);").await.unwrap();
        assert_eq!(conn.executed, vec!["CREATE TABLE widgets (id int);"]);
    }

    #[tokio::test]
    async fn recording_connection_answers_seeded_scalar_bool_queries() {
        let mut conn = RecordingConnection::new();
        conn.seed_scalar_bool("SELECT indisvalid FROM pg_index", true);
        let answer = conn
            .query_scalar_bool("SELECT indisvalid FROM pg_index")
            .await
            .unwrap();
        assert_eq!(answer, Some(true));
        assert_eq!(
            conn.query_scalar_bool("unseeded query").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn in_memory_state_store_tracks_latest_version_after_complete() {
        let mut store = InMemoryStateStore::new();
        assert_eq!(store.latest_version("public").await.unwrap(), None);
        store.start_migration("public", "001_init").await.unwrap();
        store.complete_migration("public", "001_init").await.unwrap();
        assert_eq!(
            store.latest_version("public").await.unwrap(),
            Some("001_init".to_string())
        );
        assert_eq!(
            store.history(),
            &["start:public:001_init".to_string(), "complete:public:001_init".to_string()]
        );
    }

    #[tokio::test]
    async fn noop_backfiller_records_table_names() {
        let mut backfiller = NoopBackfiller::new();
        backfiller
            .run(&[BackfillTask {
                table: "users".to_string(),
                columns: vec!["age".to_string()],
            }])
            .await
            .unwrap();
        assert_eq!(backfiller.runs, vec![vec!["users".to_string()]]);
    }

    #[tokio::test]
    async fn noop_view_manager_records_versioned_schema_names() {
        let mut manager = NoopViewManager::new();
        manager
            .create_versioned_schema("public", "001_init", &[])
            .await
            .unwrap();
        manager
            .drop_versioned_schema("public", "001_init")
            .await
            .unwrap();
        assert_eq!(manager.created[0].0, "public_001_init");
        assert_eq!(manager.dropped, vec!["public_001_init"]);
    }
}
