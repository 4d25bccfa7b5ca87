use async_trait::async_trait;

use super::{DbAction, exec_one};
use crate::error::ActionError;
use crate::interfaces::Connection;

#[derive(Debug, Clone)]
pub struct CreateTableAction {
    pub schema: String,
    pub table: String,
    pub sql: String,
}

#[async_trait]
impl DbAction for CreateTableAction {
    fn id(&self) -> String {
        format!("create_table_{}", self.table)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        exec_one(conn, &self.id(), &self.sql).await
    }
}

#[derive(Debug, Clone)]
pub struct RenameTableAction {
    pub schema: String,
    pub from: String,
    pub to: String,
}

#[async_trait]
impl DbAction for RenameTableAction {
    fn id(&self) -> String {
        format!("rename_table_{}_{}", self.from, self.to)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let sql = format!(
            "ALTER TABLE {}.{} RENAME TO {};",
            self.schema, self.from, self.to
        );
        exec_one(conn, &self.id(), &sql).await
    }
}

#[derive(Debug, Clone)]
pub struct DropTableAction {
    pub schema: String,
    pub table: String,
}

#[async_trait]
impl DbAction for DropTableAction {
    fn id(&self) -> String {
        format!("drop_table_{}", self.table)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let sql = format!("DROP TABLE IF EXISTS {}.{};", self.schema, self.table);
        exec_one(conn, &self.id(), &sql).await
    }
}

#[derive(Debug, Clone)]
pub struct ReplicaIdentityAction {
    pub schema: String,
    pub table: String,
    pub clause: String,
}

#[async_trait]
impl DbAction for ReplicaIdentityAction {
    fn id(&self) -> String {
        format!("replica_identity_{}", self.table)
    }

    async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        let sql = format!(
            "ALTER TABLE {}.{} REPLICA IDENTITY {};",
            self.schema, self.table, self.clause
        );
        exec_one(conn, &self.id(), &sql).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_table_id_includes_both_names() {
        let action = RenameTableAction {
            schema: "public".into(),
            from: "users".into(),
            to: "accounts".into(),
        };
        assert_eq!(action.id(), "rename_table_users_accounts");
    }

    #[test]
    fn drop_table_id_keyed_on_logical_name() {
        let action = DropTableAction {
            schema: "public".into(),
            table: "users".into(),
        };
        assert_eq!(action.id(), "drop_table_users");
    }

    #[test]
    fn replica_identity_id_keyed_on_table() {
        let action = ReplicaIdentityAction {
            schema: "public".into(),
            table: "users".into(),
            clause: "USING INDEX idx_users_email".into(),
        };
        assert_eq!(action.id(), "replica_identity_users");
    }
}
