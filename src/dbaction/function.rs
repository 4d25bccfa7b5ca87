use async_trait::async_trait;

use super::{DbAction, exec_one};
use crate::error::ActionError;
use crate::interfaces::Connection;

/// Drops one or more trigger functions by name, cascading to whatever
/// triggers still reference them.
#[derive(Debug, Clone)]
pub struct DropFunctionAction {
    pub schema: String,
    pub functions: Vec<String>,
}

#[async_trait]
impl DbAction for DropFunctionAction {
    fn id(&self) -> String {
        format!("drop_function_{}", self.functions.join(""))
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        for name in &self.functions {
            let sql = format!("DROP FUNCTION IF EXISTS {}.{}() CASCADE;", self.schema, name);
            exec_one(conn, &self.id(), &sql).await?;
        }
        Ok(())
    }
}
