use async_trait::async_trait;

use super::{DbAction, exec_one};
use crate::error::ActionError;
use crate::interfaces::Connection;

/// Runs a single user-supplied SQL statement verbatim, for the `sql`
/// operation's `Up`/`Down` payloads. Validated to at least parse (via
/// `pg_query`) before the migration is accepted; never re-validated here.
#[derive(Debug, Clone)]
pub struct RawSqlAction {
    pub id: String,
    pub sql: String,
}

#[async_trait]
impl DbAction for RawSqlAction {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        exec_one(conn, &self.id, &self.sql).await
    }
}
