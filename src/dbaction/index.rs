use async_trait::async_trait;
use std::time::Duration;

use super::DbAction;
use crate::error::ActionError;
use crate::interfaces::Connection;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct CreateIndexConcurrentlyAction {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub create_sql: String,
}

#[async_trait]
impl DbAction for CreateIndexConcurrentlyAction {
    fn id(&self) -> String {
        format!("create_index_concurrently_{}_{}", self.table, self.name)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        if conn.in_transaction() {
            return Err(ActionError::MustNotRunInTransaction { action_id: self.id() });
        }
        conn.execute(&self.create_sql).await.map(|_| ())
    }
}

/// The one non-trivial action in the catalog: issues a concurrent unique
/// index build, polls until it is no longer in progress, then checks
/// validity. An invalid index is dropped and the build retried, up to
/// [`MAX_ATTEMPTS`] times total.
#[derive(Debug, Clone)]
pub struct CreateUniqueIndexConcurrentlyAction {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub create_sql: String,
}

impl CreateUniqueIndexConcurrentlyAction {
    fn in_progress_sql(&self) -> String {
        format!(
            "SELECT EXISTS (SELECT 1 FROM pg_stat_progress_create_index WHERE index_relid = '{}.{}'::regclass);",
            self.schema, self.name
        )
    }

    fn is_valid_sql(&self) -> String {
        format!(
            "SELECT indisvalid FROM pg_index WHERE indexrelid = '{}.{}'::regclass;",
            self.schema, self.name
        )
    }

    fn drop_sql(&self) -> String {
        format!("DROP INDEX CONCURRENTLY IF EXISTS {}.{};", self.schema, self.name)
    }
}

#[async_trait]
impl DbAction for CreateUniqueIndexConcurrentlyAction {
    fn id(&self) -> String {
        format!("create_unique_index_concurrently_{}_{}", self.table, self.name)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        if conn.in_transaction() {
            return Err(ActionError::MustNotRunInTransaction { action_id: self.id() });
        }

        for attempt in 1..=MAX_ATTEMPTS {
            tracing::debug!(index = %self.name, attempt, "starting concurrent unique index build");
            conn.execute(&self.create_sql).await?;

            loop {
                let in_progress = conn.query_scalar_bool(&self.in_progress_sql()).await?;
                if !in_progress.unwrap_or(false) {
                    break;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }

            let valid = conn.query_scalar_bool(&self.is_valid_sql()).await?;
            if valid.unwrap_or(false) {
                return Ok(());
            }

            tracing::warn!(index = %self.name, attempt, "concurrent index build left an invalid index, retrying");
            conn.execute(&self.drop_sql()).await?;
        }

        Err(ActionError::IndexCreation {
            action_id: self.id(),
            attempts: MAX_ATTEMPTS,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DropIndexAction {
    pub schema: String,
    pub name: String,
}

#[async_trait]
impl DbAction for DropIndexAction {
    fn id(&self) -> String {
        format!("drop_index_{}", self.name)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let sql = format!("DROP INDEX CONCURRENTLY IF EXISTS {}.{};", self.schema, self.name);
        conn.execute(&sql).await.map(|_| ())
    }
}
