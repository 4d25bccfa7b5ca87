use serde::Deserialize;

use crate::dbaction::BoxedAction;
use crate::dbaction::table::ReplicaIdentityAction;
use crate::error::ValidateError;
use crate::operation::{Operation, StartOutput};
use crate::schema::Schema;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ReplicaIdentity {
    Nothing,
    Default,
    Full,
    Index { name: String },
}

impl ReplicaIdentity {
    fn as_sql(&self) -> String {
        match self {
            ReplicaIdentity::Nothing => "NOTHING".to_string(),
            ReplicaIdentity::Default => "DEFAULT".to_string(),
            ReplicaIdentity::Full => "FULL".to_string(),
            ReplicaIdentity::Index { name } => format!("USING INDEX {name}"),
        }
    }
}

// `deny_unknown_fields` is omitted: it cannot be combined with the
// `#[serde(flatten)]` below.
#[derive(Debug, Clone, Deserialize)]
pub struct SetReplicaIdentity {
    pub table: String,
    #[serde(flatten)]
    pub identity: ReplicaIdentity,
}

impl Operation for SetReplicaIdentity {
    fn name(&self) -> &str {
        "set_replica_identity"
    }

    fn validate(&self, schema: &mut Schema) -> Result<(), ValidateError> {
        schema
            .get_table(&self.table)
            .ok_or_else(|| ValidateError::TableDoesNotExist {
                name: self.table.clone(),
            })?;
        if let ReplicaIdentity::Index { name } = &self.identity
            && !schema.index_exists(name)
        {
            return Err(ValidateError::IndexDoesNotExist { name: name.clone() });
        }
        Ok(())
    }

    fn start(&self, _schema: &mut Schema) -> Result<StartOutput, ValidateError> {
        Ok(StartOutput::with_actions(vec![Box::new(ReplicaIdentityAction {
            schema: "public".to_string(),
            table: self.table.clone(),
            clause: self.identity.as_sql(),
        })]))
    }

    fn complete(&self, _schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        Ok(vec![])
    }

    fn rollback(&self, _schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        Ok(vec![])
    }
}
