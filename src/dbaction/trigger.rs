use async_trait::async_trait;

use super::DbAction;
use crate::error::ActionError;
use crate::interfaces::Connection;
use crate::schema::NEEDS_BACKFILL_COLUMN;
use crate::trigger::TriggerConfig;

/// Installs a bridging trigger, atomically: adds the scratch backfill
/// column if it isn't already present, then creates the trigger function
/// and the trigger itself, inside a single retryable transaction (§5).
#[derive(Debug, Clone)]
pub struct CreateTriggerAction {
    pub table: String,
    pub config: TriggerConfig,
}

#[async_trait]
impl DbAction for CreateTriggerAction {
    fn id(&self) -> String {
        format!("create_trigger_{}_{}", self.table, self.config.name)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let add_backfill_column = format!(
            "ALTER TABLE {}.{} ADD COLUMN IF NOT EXISTS {} boolean NOT NULL DEFAULT true;",
            self.config.schema, self.table, NEEDS_BACKFILL_COLUMN
        );

        conn.begin().await?;
        let result: Result<(), ActionError> = async {
            conn.execute(&add_backfill_column).await?;
            conn.execute(&self.config.build()).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                conn.commit().await?;
                Ok(())
            }
            Err(e) => {
                conn.rollback().await?;
                Err(match e {
                    ActionError::Database { source, .. } => ActionError::Database {
                        action_id: self.id(),
                        source,
                    },
                    other => other,
                })
            }
        }
    }
}
