use async_trait::async_trait;

use super::{DbAction, exec_one};
use crate::error::ActionError;
use crate::interfaces::Connection;

#[derive(Debug, Clone)]
pub struct RenameConstraintAction {
    pub schema: String,
    pub table: String,
    pub from: String,
    pub to: String,
}

#[async_trait]
impl DbAction for RenameConstraintAction {
    fn id(&self) -> String {
        format!("rename_constraint_{}_{}_{}", self.table, self.from, self.to)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let sql = format!(
            "ALTER TABLE {}.{} RENAME CONSTRAINT {} TO {};",
            self.schema, self.table, self.from, self.to
        );
        exec_one(conn, &self.id(), &sql).await
    }
}

#[derive(Debug, Clone)]
pub struct DropConstraintAction {
    pub schema: String,
    pub table: String,
    pub constraint: String,
}

#[async_trait]
impl DbAction for DropConstraintAction {
    fn id(&self) -> String {
        format!("drop_constraint_{}_{}", self.table, self.constraint)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let sql = format!(
            "ALTER TABLE {}.{} DROP CONSTRAINT IF EXISTS {};",
            self.schema, self.table, self.constraint
        );
        exec_one(conn, &self.id(), &sql).await
    }
}

#[derive(Debug, Clone)]
pub struct CreateFkConstraintAction {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
    /// Created `NOT VALID` so the lock is brief; validated separately.
    pub not_valid: bool,
}

#[async_trait]
impl DbAction for CreateFkConstraintAction {
    fn id(&self) -> String {
        format!("create_fk_constraint_{}_{}", self.table, self.name)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let not_valid = if self.not_valid { " NOT VALID" } else { "" };
        let sql = format!(
            "ALTER TABLE {}.{} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}){};",
            self.schema,
            self.table,
            self.name,
            self.columns.join(", "),
            self.ref_table,
            self.ref_columns.join(", "),
            not_valid,
        );
        exec_one(conn, &self.id(), &sql).await
    }
}

#[derive(Debug, Clone)]
pub struct CreateCheckConstraintAction {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub expression: String,
    pub not_valid: bool,
}

#[async_trait]
impl DbAction for CreateCheckConstraintAction {
    fn id(&self) -> String {
        format!("create_check_constraint_{}_{}", self.table, self.name)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let not_valid = if self.not_valid { " NOT VALID" } else { "" };
        let sql = format!(
            "ALTER TABLE {}.{} ADD CONSTRAINT {} CHECK ({}){};",
            self.schema, self.table, self.name, self.expression, not_valid
        );
        exec_one(conn, &self.id(), &sql).await
    }
}

#[derive(Debug, Clone)]
pub struct ValidateConstraintAction {
    pub schema: String,
    pub table: String,
    pub constraint: String,
}

#[async_trait]
impl DbAction for ValidateConstraintAction {
    fn id(&self) -> String {
        format!("validate_constraint_{}_{}", self.table, self.constraint)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let sql = format!(
            "ALTER TABLE {}.{} VALIDATE CONSTRAINT {};",
            self.schema, self.table, self.constraint
        );
        exec_one(conn, &self.id(), &sql).await
    }
}

/// Promotes an existing unique index into a named UNIQUE constraint without
/// rebuilding it.
#[derive(Debug, Clone)]
pub struct AddConstraintUsingUniqueIndexAction {
    pub schema: String,
    pub table: String,
    pub constraint: String,
    pub index: String,
}

#[async_trait]
impl DbAction for AddConstraintUsingUniqueIndexAction {
    fn id(&self) -> String {
        format!(
            "add_constraint_using_unique_index_{}_{}",
            self.table, self.constraint
        )
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let sql = format!(
            "ALTER TABLE {}.{} ADD CONSTRAINT {} UNIQUE USING INDEX {};",
            self.schema, self.table, self.constraint, self.index
        );
        exec_one(conn, &self.id(), &sql).await
    }
}
