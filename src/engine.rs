//! Engine (C7): the Validate -> Start -> Complete/Rollback phase runner.
//!
//! The Engine owns the database connection and the three external
//! collaborators (state store, backfiller, view manager) for the duration
//! of a phase (§5: "The database connection is exclusively owned by the
//! Engine for the duration of a phase"). It never inspects operation
//! payloads directly — it only calls the four `Operation` methods in the
//! order spec.md §4.7 lays out and hands the resulting actions to the
//! Coordinator.

use crate::coordinator::Coordinator;
use crate::error::{ActionError, EngineError};
use crate::interfaces::{Backfiller, Connection, StateStore, ViewManager, ViewProjection};
use crate::migration::Migration;
use crate::operation::BoxedOperation;
use crate::schema::Schema;

/// Validates every operation in declaration order against a working copy of
/// the schema. A passing Validate mutates `schema` to the migration's
/// projected end state, so a later operation in the same migration sees an
/// earlier one's effects (e.g. an index on a column added earlier in the
/// same document).
pub fn validate(migration: &Migration, schema: &mut Schema) -> Result<(), EngineError> {
    for (op_index, op) in migration.operations.iter().enumerate() {
        op.validate(schema)
            .map_err(|source| EngineError::Validate {
                op_index,
                op_name: op.name().to_string(),
                source,
            })?;
    }
    Ok(())
}

/// Wraps an operation-level precondition failure encountered during Start,
/// Complete or Rollback as an `ActionError` so it fits the `EngineError`
/// variants that model phase failures, which carry the failing action's ID
/// rather than a `ValidateError`. This should be rare in practice — Start
/// runs immediately after a passing Validate against the same schema.
fn as_action_error(action_id: String, source: crate::error::ValidateError) -> ActionError {
    ActionError::Database {
        action_id,
        source: Box::new(source),
    }
}

/// The projection of every live table's logical columns onto their current
/// physical names, for the view manager's versioned schema.
fn build_projections(schema: &Schema) -> Vec<ViewProjection> {
    schema
        .tables()
        .map(|table| ViewProjection {
            table: table.name.clone(),
            columns: table
                .columns
                .iter()
                .filter(|c| !c.is_removed())
                .map(|c| (c.name.clone(), c.physical_name()))
                .collect(),
        })
        .collect()
}

/// Ties a `Migration`'s typed operations together with the Coordinator and
/// the external collaborators for one phase at a time.
pub struct Engine<'a> {
    pub schema_name: String,
    pub conn: &'a mut dyn Connection,
    pub state_store: &'a mut dyn StateStore,
    pub backfiller: &'a mut dyn Backfiller,
    pub view_manager: &'a mut dyn ViewManager,
}

impl<'a> Engine<'a> {
    pub fn new(
        schema_name: impl Into<String>,
        conn: &'a mut dyn Connection,
        state_store: &'a mut dyn StateStore,
        backfiller: &'a mut dyn Backfiller,
        view_manager: &'a mut dyn ViewManager,
    ) -> Self {
        Self {
            schema_name: schema_name.into(),
            conn,
            state_store,
            backfiller,
            view_manager,
        }
    }

    /// Runs Start: calls `Operation::start` on every operation in order,
    /// pools the resulting actions and backfill tasks, executes the actions
    /// via the Coordinator, creates the migration's versioned schema, and
    /// finally hands off any backfill tasks. On any failure, already-started
    /// operations are rolled back on a best-effort basis before the error is
    /// returned.
    pub async fn start(
        &mut self,
        migration: &Migration,
        schema: &mut Schema,
    ) -> Result<(), EngineError> {
        self.state_store
            .start_migration(&self.schema_name, &migration.name)
            .await
            .map_err(|e| EngineError::StateStore(e.to_string()))?;

        let mut all_actions = Vec::new();
        let mut backfill_tasks = Vec::new();

        for (op_index, op) in migration.operations.iter().enumerate() {
            let output = match op.start(schema) {
                Ok(output) => output,
                Err(source) => {
                    self.best_effort_rollback(&migration.operations[..op_index], schema)
                        .await;
                    return Err(EngineError::Start {
                        op_index,
                        op_name: op.name().to_string(),
                        source: as_action_error(format!("start_{}", op.name()), source),
                    });
                }
            };
            all_actions.extend(output.actions);
            if let Some(task) = output.backfill {
                backfill_tasks.push(task);
            }
        }

        let coordinator = Coordinator::from_actions(all_actions);
        if let Err(source) = coordinator.execute(self.conn).await {
            self.best_effort_rollback(&migration.operations, schema)
                .await;
            return Err(EngineError::Start {
                op_index: migration.operations.len(),
                op_name: "coordinator".to_string(),
                source,
            });
        }

        let projections = build_projections(schema);
        self.view_manager
            .create_versioned_schema(&self.schema_name, &migration.name, &projections)
            .await
            .map_err(|source| EngineError::Start {
                op_index: migration.operations.len(),
                op_name: "view_manager".to_string(),
                source,
            })?;

        if !backfill_tasks.is_empty() {
            self.backfiller
                .run(&backfill_tasks)
                .await
                .map_err(|e| EngineError::BackfillFailed(e.to_string()))?;
        }

        Ok(())
    }

    /// Runs Complete: collects `Operation::complete` actions in declaration
    /// order, executes them, and tears down the versioned schema. Errors
    /// here are terminal for the migration (§4.7: "no partial retry is
    /// attempted").
    pub async fn complete(
        &mut self,
        migration: &Migration,
        schema: &mut Schema,
    ) -> Result<(), EngineError> {
        let mut actions = Vec::new();
        for op in &migration.operations {
            let acts = op
                .complete(schema)
                .map_err(|source| EngineError::Complete {
                    source: as_action_error(format!("complete_{}", op.name()), source),
                })?;
            actions.extend(acts);
        }

        let coordinator = Coordinator::from_actions(actions);
        coordinator
            .execute(self.conn)
            .await
            .map_err(|source| EngineError::Complete { source })?;

        self.view_manager
            .drop_versioned_schema(&self.schema_name, &migration.name)
            .await
            .map_err(|source| EngineError::Complete { source })?;

        self.state_store
            .complete_migration(&self.schema_name, &migration.name)
            .await
            .map_err(|e| EngineError::StateStore(e.to_string()))?;

        Ok(())
    }

    /// Runs Rollback: iterates operations in *reverse* declaration order, so
    /// that an operation can un-remove an entity soft-deleted by a later
    /// operation before that earlier operation's own Rollback inspects it
    /// (§4.7).
    pub async fn rollback(
        &mut self,
        migration: &Migration,
        schema: &mut Schema,
    ) -> Result<(), EngineError> {
        let mut actions = Vec::new();
        for op in migration.operations.iter().rev() {
            let acts = op
                .rollback(schema)
                .map_err(|source| EngineError::Rollback {
                    source: as_action_error(format!("rollback_{}", op.name()), source),
                })?;
            actions.extend(acts);
        }

        let coordinator = Coordinator::from_actions(actions);
        coordinator
            .execute(self.conn)
            .await
            .map_err(|source| EngineError::Rollback { source })?;

        self.view_manager
            .drop_versioned_schema(&self.schema_name, &migration.name)
            .await
            .map_err(|source| EngineError::Rollback { source })?;

        self.state_store
            .rollback_migration(&self.schema_name, &migration.name)
            .await
            .map_err(|e| EngineError::StateStore(e.to_string()))?;

        Ok(())
    }

    /// Rolls back already-started operations in reverse order without
    /// propagating failures — a precondition failure at this point would
    /// leave the migration in a state no retry can fix, so we log and move
    /// on rather than mask the original Start error.
    async fn best_effort_rollback(&mut self, started: &[BoxedOperation], schema: &mut Schema) {
        let mut actions = Vec::new();
        for op in started.iter().rev() {
            match op.rollback(schema) {
                Ok(mut acts) => actions.append(&mut acts),
                Err(source) => {
                    tracing::warn!(
                        operation = op.name(),
                        error = %source,
                        "best-effort rollback: precondition failed, skipping this operation's actions"
                    );
                }
            }
        }
        let coordinator = Coordinator::from_actions(actions);
        if let Err(source) = coordinator.execute(self.conn).await {
            tracing::warn!(error = %source, "best-effort rollback action failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbaction::{BoxedAction, DbAction};
    use crate::operation::StartOutput;
    use crate::schema::Table;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct FakeConnection {
        executed: Vec<String>,
    }

    #[async_trait]
    impl Connection for FakeConnection {
        async fn execute(&mut self, sql: &str) -> Result<u64, ActionError> {
            self.executed.push(sql.to_string());
            Ok(0)
        }

        async fn query_scalar_bool(&mut self, _sql: &str) -> Result<Option<bool>, ActionError> {
            Ok(None)
        }

        fn in_transaction(&self) -> bool {
            false
        }

        async fn begin(&mut self) -> Result<(), ActionError> {
            Ok(())
        }

        async fn commit(&mut self) -> Result<(), ActionError> {
            Ok(())
        }

        async fn rollback(&mut self) -> Result<(), ActionError> {
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct FakeStateStore {
        calls: Vec<String>,
    }

    #[async_trait]
    impl StateStore for FakeStateStore {
        async fn latest_version(&mut self, _schema: &str) -> Result<Option<String>, ActionError> {
            Ok(None)
        }

        async fn start_migration(&mut self, _schema: &str, name: &str) -> Result<(), ActionError> {
            self.calls.push(format!("start:{name}"));
            Ok(())
        }

        async fn complete_migration(
            &mut self,
            _schema: &str,
            name: &str,
        ) -> Result<(), ActionError> {
            self.calls.push(format!("complete:{name}"));
            Ok(())
        }

        async fn rollback_migration(
            &mut self,
            _schema: &str,
            name: &str,
        ) -> Result<(), ActionError> {
            self.calls.push(format!("rollback:{name}"));
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct FakeBackfiller {
        runs: Vec<Vec<String>>,
    }

    #[async_trait]
    impl Backfiller for FakeBackfiller {
        async fn run(
            &mut self,
            tasks: &[crate::interfaces::BackfillTask],
        ) -> Result<(), ActionError> {
            self.runs
                .push(tasks.iter().map(|t| t.table.clone()).collect());
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct FakeViewManager {
        created: Vec<String>,
        dropped: Vec<String>,
    }

    #[async_trait]
    impl ViewManager for FakeViewManager {
        async fn create_versioned_schema(
            &mut self,
            schema: &str,
            migration_name: &str,
            _projections: &[ViewProjection],
        ) -> Result<(), ActionError> {
            self.created
                .push(crate::interfaces::versioned_schema_name(
                    schema,
                    migration_name,
                ));
            Ok(())
        }

        async fn drop_versioned_schema(
            &mut self,
            schema: &str,
            migration_name: &str,
        ) -> Result<(), ActionError> {
            self.dropped
                .push(crate::interfaces::versioned_schema_name(
                    schema,
                    migration_name,
                ));
            Ok(())
        }
    }

    /// A minimal operation that always succeeds, recording which phases ran.
    #[derive(Debug)]
    struct RecordingOp {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[derive(Debug, Clone)]
    struct LoggedAction {
        id: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl DbAction for LoggedAction {
        fn id(&self) -> String {
            self.id.clone()
        }

        async fn execute(&self, _conn: &mut dyn Connection) -> Result<(), ActionError> {
            self.log.lock().unwrap().push(format!("exec:{}", self.id));
            Ok(())
        }
    }

    impl crate::operation::Operation for RecordingOp {
        fn name(&self) -> &str {
            self.tag
        }

        fn validate(&self, _schema: &mut Schema) -> Result<(), crate::error::ValidateError> {
            self.log.lock().unwrap().push(format!("validate:{}", self.tag));
            Ok(())
        }

        fn start(
            &self,
            _schema: &mut Schema,
        ) -> Result<StartOutput, crate::error::ValidateError> {
            self.log.lock().unwrap().push(format!("start:{}", self.tag));
            let action: BoxedAction = Box::new(LoggedAction {
                id: format!("action_{}", self.tag),
                log: self.log.clone(),
            });
            Ok(StartOutput::with_actions(vec![action]))
        }

        fn complete(&self, _schema: &mut Schema) -> Result<Vec<BoxedAction>, crate::error::ValidateError> {
            self.log.lock().unwrap().push(format!("complete:{}", self.tag));
            Ok(vec![])
        }

        fn rollback(&self, _schema: &mut Schema) -> Result<Vec<BoxedAction>, crate::error::ValidateError> {
            self.log.lock().unwrap().push(format!("rollback:{}", self.tag));
            Ok(vec![])
        }
    }

    fn migration_of(tags: &[&'static str], log: &Arc<Mutex<Vec<String>>>) -> Migration {
        Migration {
            name: "001_test".to_string(),
            operations: tags
                .iter()
                .map(|tag| -> BoxedOperation {
                    Box::new(RecordingOp {
                        tag,
                        log: log.clone(),
                    })
                })
                .collect(),
        }
    }

    #[test]
    fn validate_runs_in_declaration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let migration = migration_of(&["a", "b", "c"], &log);
        let mut schema = Schema::new("public");
        validate(&migration, &mut schema).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["validate:a", "validate:b", "validate:c"]
        );
    }

    #[tokio::test]
    async fn start_runs_operations_in_order_then_executes_then_creates_views() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let migration = migration_of(&["a", "b"], &log);
        let mut schema = Schema::new("public");
        schema.add_table(Table::new("widgets")).unwrap();

        let mut conn = FakeConnection::default();
        let mut state_store = FakeStateStore::default();
        let mut backfiller = FakeBackfiller::default();
        let mut view_manager = FakeViewManager::default();

        {
            let mut engine = Engine::new(
                "public",
                &mut conn,
                &mut state_store,
                &mut backfiller,
                &mut view_manager,
            );
            engine.start(&migration, &mut schema).await.unwrap();
        }

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "start:a",
                "start:b",
                "exec:action_a",
                "exec:action_b",
            ]
        );
        assert_eq!(state_store.calls, vec!["start:001_test"]);
        assert_eq!(view_manager.created, vec!["public_001_test"]);
    }

    #[tokio::test]
    async fn complete_executes_then_drops_views_then_marks_state() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let migration = migration_of(&["a"], &log);
        let mut schema = Schema::new("public");

        let mut conn = FakeConnection::default();
        let mut state_store = FakeStateStore::default();
        let mut backfiller = FakeBackfiller::default();
        let mut view_manager = FakeViewManager::default();

        let mut engine = Engine::new(
            "public",
            &mut conn,
            &mut state_store,
            &mut backfiller,
            &mut view_manager,
        );
        engine.complete(&migration, &mut schema).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["complete:a"]);
        assert_eq!(view_manager.dropped, vec!["public_001_test"]);
        assert_eq!(state_store.calls, vec!["complete:001_test"]);
    }

    #[tokio::test]
    async fn rollback_visits_operations_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let migration = migration_of(&["a", "b", "c"], &log);
        let mut schema = Schema::new("public");

        let mut conn = FakeConnection::default();
        let mut state_store = FakeStateStore::default();
        let mut backfiller = FakeBackfiller::default();
        let mut view_manager = FakeViewManager::default();

        let mut engine = Engine::new(
            "public",
            &mut conn,
            &mut state_store,
            &mut backfiller,
            &mut view_manager,
        );
        engine.rollback(&migration, &mut schema).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["rollback:c", "rollback:b", "rollback:a"]
        );
        assert_eq!(state_store.calls, vec!["rollback:001_test"]);
    }

    #[derive(Debug)]
    struct FailingStartOp {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl crate::operation::Operation for FailingStartOp {
        fn name(&self) -> &str {
            self.tag
        }

        fn validate(&self, _schema: &mut Schema) -> Result<(), crate::error::ValidateError> {
            Ok(())
        }

        fn start(
            &self,
            _schema: &mut Schema,
        ) -> Result<StartOutput, crate::error::ValidateError> {
            Err(crate::error::ValidateError::FieldRequired {
                name: "boom".to_string(),
            })
        }

        fn complete(&self, _schema: &mut Schema) -> Result<Vec<BoxedAction>, crate::error::ValidateError> {
            Ok(vec![])
        }

        fn rollback(&self, _schema: &mut Schema) -> Result<Vec<BoxedAction>, crate::error::ValidateError> {
            self.log.lock().unwrap().push(format!("rollback:{}", self.tag));
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn start_failure_rolls_back_already_started_operations() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut operations: Vec<BoxedOperation> = vec![Box::new(RecordingOp {
            tag: "a",
            log: log.clone(),
        })];
        operations.push(Box::new(FailingStartOp {
            tag: "b",
            log: log.clone(),
        }));
        let migration = Migration {
            name: "002_fails".to_string(),
            operations,
        };
        let mut schema = Schema::new("public");

        let mut conn = FakeConnection::default();
        let mut state_store = FakeStateStore::default();
        let mut backfiller = FakeBackfiller::default();
        let mut view_manager = FakeViewManager::default();

        let mut engine = Engine::new(
            "public",
            &mut conn,
            &mut state_store,
            &mut backfiller,
            &mut view_manager,
        );
        let err = engine.start(&migration, &mut schema).await.unwrap_err();
        assert!(matches!(err, EngineError::Start { op_index: 1, .. }));

        let log = log.lock().unwrap();
        assert!(log.contains(&"rollback:a".to_string()));
        assert!(view_manager.created.is_empty());
    }
}
