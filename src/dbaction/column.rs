use async_trait::async_trait;

use super::{DbAction, exec_one};
use crate::error::ActionError;
use crate::interfaces::Connection;

#[derive(Debug, Clone)]
pub struct AddColumnAction {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub sql: String,
}

#[async_trait]
impl DbAction for AddColumnAction {
    fn id(&self) -> String {
        format!("add_column_{}_{}", self.table, self.column)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        exec_one(conn, &self.id(), &self.sql).await
    }
}

/// Drops one or many physical columns from a table in a single statement.
#[derive(Debug, Clone)]
pub struct DropColumnAction {
    pub schema: String,
    pub table: String,
    pub columns: Vec<String>,
}

#[async_trait]
impl DbAction for DropColumnAction {
    fn id(&self) -> String {
        format!("drop_column_{}_{}", self.table, self.columns.join("_"))
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let clauses: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("DROP COLUMN IF EXISTS {c}"))
            .collect();
        let sql = format!(
            "ALTER TABLE {}.{} {};",
            self.schema,
            self.table,
            clauses.join(", ")
        );
        exec_one(conn, &self.id(), &sql).await
    }
}

#[derive(Debug, Clone)]
pub struct RenameColumnAction {
    pub schema: String,
    pub table: String,
    pub from: String,
    pub to: String,
}

#[async_trait]
impl DbAction for RenameColumnAction {
    fn id(&self) -> String {
        format!("rename_column_{}_{}_{}", self.table, self.from, self.to)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let sql = format!(
            "ALTER TABLE {}.{} RENAME COLUMN {} TO {};",
            self.schema, self.table, self.from, self.to
        );
        exec_one(conn, &self.id(), &sql).await
    }
}

/// A constraint that was found under its duplication-prefixed name and
/// needs to be canonicalized back to its stripped name.
#[derive(Debug, Clone)]
pub struct RenamedConstraint {
    pub from: String,
    pub to: String,
    /// If `to` names a synthetic NOT NULL check, the column also gets
    /// `SET NOT NULL` and the temporary CHECK is dropped instead of kept
    /// under its canonical name.
    pub promote_to_not_null: bool,
}

/// A duplication-prefixed index that needs to be canonicalized, optionally
/// promoted into a named UNIQUE constraint.
#[derive(Debug, Clone)]
pub struct RenamedIndex {
    pub from: String,
    pub to: String,
    pub promote_to_unique_constraint: Option<String>,
}

/// Composite action restoring a shadow column and every duplication-marked
/// constraint/index it owns to canonical names, run post-Complete. See
/// `spec.md` §4.2.
#[derive(Debug, Clone)]
pub struct RenameDuplicatedColumnAction {
    pub schema: String,
    pub table: String,
    /// Stripped (canonical) column name.
    pub column: String,
    pub foreign_keys: Vec<RenamedConstraint>,
    pub check_constraints: Vec<RenamedConstraint>,
    pub indexes: Vec<RenamedIndex>,
}

#[async_trait]
impl DbAction for RenameDuplicatedColumnAction {
    fn id(&self) -> String {
        format!("rename_duplicated_{}_{}", self.table, self.column)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let action_id = self.id();
        let shadow = crate::schema::duplicated_name(&self.column);

        let mut statements = vec![format!(
            "ALTER TABLE {}.{} RENAME COLUMN {} TO {};",
            self.schema, self.table, shadow, self.column
        )];

        for fk in &self.foreign_keys {
            statements.push(format!(
                "ALTER TABLE {}.{} VALIDATE CONSTRAINT {};",
                self.schema, self.table, fk.from
            ));
            statements.push(format!(
                "ALTER TABLE {}.{} RENAME CONSTRAINT {} TO {};",
                self.schema, self.table, fk.from, fk.to
            ));
        }

        for check in &self.check_constraints {
            statements.push(format!(
                "ALTER TABLE {}.{} VALIDATE CONSTRAINT {};",
                self.schema, self.table, check.from
            ));
            if check.promote_to_not_null {
                statements.push(format!(
                    "ALTER TABLE {}.{} ALTER COLUMN {} SET NOT NULL;",
                    self.schema, self.table, self.column
                ));
                statements.push(format!(
                    "ALTER TABLE {}.{} DROP CONSTRAINT {};",
                    self.schema, self.table, check.from
                ));
            } else {
                statements.push(format!(
                    "ALTER TABLE {}.{} RENAME CONSTRAINT {} TO {};",
                    self.schema, self.table, check.from, check.to
                ));
            }
        }

        for idx in &self.indexes {
            statements.push(format!(
                "ALTER INDEX {}.{} RENAME TO {};",
                self.schema, idx.from, idx.to
            ));
            if let Some(constraint_name) = &idx.promote_to_unique_constraint {
                statements.push(format!(
                    "ALTER TABLE {}.{} ADD CONSTRAINT {} UNIQUE USING INDEX {};",
                    self.schema, self.table, constraint_name, idx.to
                ));
            }
        }

        for sql in &statements {
            exec_one(conn, &action_id, sql).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AlterSequenceOwnerAction {
    pub schema: String,
    pub sequence: String,
    pub table: String,
    pub column: String,
}

#[async_trait]
impl DbAction for AlterSequenceOwnerAction {
    fn id(&self) -> String {
        format!("alter_sequence_owner_{}", self.sequence)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let sql = format!(
            "ALTER SEQUENCE {}.{} OWNED BY {}.{};",
            self.schema, self.sequence, self.table, self.column
        );
        exec_one(conn, &self.id(), &sql).await
    }
}

#[derive(Debug, Clone)]
pub struct SetNotNullAction {
    pub schema: String,
    pub table: String,
    pub column: String,
}

#[async_trait]
impl DbAction for SetNotNullAction {
    fn id(&self) -> String {
        format!("set_not_null_{}_{}", self.table, self.column)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let sql = format!(
            "ALTER TABLE {}.{} ALTER COLUMN {} SET NOT NULL;",
            self.schema, self.table, self.column
        );
        exec_one(conn, &self.id(), &sql).await
    }
}

#[derive(Debug, Clone)]
pub struct DropDefaultValueAction {
    pub schema: String,
    pub table: String,
    pub column: String,
}

#[async_trait]
impl DbAction for DropDefaultValueAction {
    fn id(&self) -> String {
        format!("drop_default_value_{}_{}", self.table, self.column)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let sql = format!(
            "ALTER TABLE {}.{} ALTER COLUMN {} DROP DEFAULT;",
            self.schema, self.table, self.column
        );
        exec_one(conn, &self.id(), &sql).await
    }
}

#[derive(Debug, Clone)]
pub struct SetDefaultValueAction {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub default: String,
}

#[async_trait]
impl DbAction for SetDefaultValueAction {
    fn id(&self) -> String {
        format!("set_default_value_{}_{}", self.table, self.column)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let sql = format!(
            "ALTER TABLE {}.{} ALTER COLUMN {} SET DEFAULT {};",
            self.schema, self.table, self.column, self.default
        );
        exec_one(conn, &self.id(), &sql).await
    }
}

#[derive(Debug, Clone)]
pub struct CommentColumnAction {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub comment: Option<String>,
}

#[async_trait]
impl DbAction for CommentColumnAction {
    fn id(&self) -> String {
        format!("comment_column_{}_{}", self.table, self.column)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let literal = match &self.comment {
            Some(c) => format!("'{}'", c.replace('\'', "''")),
            None => "NULL".to_string(),
        };
        let sql = format!(
            "COMMENT ON COLUMN {}.{}.{} IS {};",
            self.schema, self.table, self.column, literal
        );
        exec_one(conn, &self.id(), &sql).await
    }
}

#[derive(Debug, Clone)]
pub struct CommentTableAction {
    pub schema: String,
    pub table: String,
    pub comment: Option<String>,
}

#[async_trait]
impl DbAction for CommentTableAction {
    fn id(&self) -> String {
        format!("comment_table_{}", self.table)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let literal = match &self.comment {
            Some(c) => format!("'{}'", c.replace('\'', "''")),
            None => "NULL".to_string(),
        };
        let sql = format!("COMMENT ON TABLE {}.{} IS {};", self.schema, self.table, literal);
        exec_one(conn, &self.id(), &sql).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_column_id_joins_multiple_columns() {
        let action = DropColumnAction {
            schema: "public".into(),
            table: "users".into(),
            columns: vec!["a".into(), "b".into()],
        };
        assert_eq!(action.id(), "drop_column_users_a_b");
    }

    #[test]
    fn rename_duplicated_column_id_uses_table_and_column() {
        let action = RenameDuplicatedColumnAction {
            schema: "public".into(),
            table: "users".into(),
            column: "age".into(),
            foreign_keys: vec![],
            check_constraints: vec![],
            indexes: vec![],
        };
        assert_eq!(action.id(), "rename_duplicated_users_age");
    }
}
