//! Migration Document Model (C6): the typed operations list with
//! polymorphic decoding from a tagged-object wire form, and the file
//! updater chain that migrates breaking document-shape changes forward.

pub mod updaters;

use std::str::FromStr;

use serde_json::Value;

use crate::error::DocumentError;
use crate::operation::{BoxedOperation, Operation, OperationTag};
use crate::operation::{
    alter_column, column_ops, constraint_ops, index_ops, replica_identity, sql_op, table_ops,
};

/// A parsed migration: a name and its ordered operations. Operation order
/// is semantically significant — later operations observe the schema
/// mutations of earlier ones.
#[derive(Debug)]
pub struct Migration {
    pub name: String,
    pub operations: Vec<BoxedOperation>,
}

/// Parses a migration document, applying the updater chain to each
/// operation's payload before typed decoding. `default_name` is used when
/// the document's own `name` field is absent (the file's base name, per
/// §6 — the caller, which owns file I/O, supplies it).
pub fn decode_json(bytes: &[u8], default_name: &str) -> Result<Migration, DocumentError> {
    let value: Value = serde_json::from_slice(bytes)?;
    decode_value(value, default_name)
}

pub fn decode_yaml(bytes: &[u8], default_name: &str) -> Result<Migration, DocumentError> {
    let value: Value = serde_yaml::from_slice(bytes)?;
    decode_value(value, default_name)
}

fn decode_value(value: Value, default_name: &str) -> Result<Migration, DocumentError> {
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| default_name.to_string());

    let raw_operations = value
        .get("operations")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut operations = Vec::with_capacity(raw_operations.len());
    for raw in raw_operations {
        operations.push(decode_operation(raw)?);
    }

    Ok(Migration { name, operations })
}

fn decode_operation(raw: Value) -> Result<BoxedOperation, DocumentError> {
    let Value::Object(obj) = raw else {
        return Err(DocumentError::MultiKeyOperation { count: 0 });
    };
    if obj.len() != 1 {
        return Err(DocumentError::MultiKeyOperation { count: obj.len() });
    }
    let (tag, mut payload) = obj.into_iter().next().expect("len checked above");

    let operation_tag =
        OperationTag::from_str(&tag).map_err(|_| DocumentError::UnknownTag { tag: tag.clone() })?;

    updaters::apply(&tag, &mut payload);

    decode_payload(operation_tag, payload).map_err(|message| DocumentError::PayloadDecode {
        tag: tag.clone(),
        message,
    })
}

macro_rules! decode_as {
    ($ty:ty, $payload:expr) => {
        serde_json::from_value::<$ty>($payload)
            .map(|op| Box::new(op) as BoxedOperation)
            .map_err(|e| e.to_string())
    };
}

fn decode_payload(tag: OperationTag, payload: Value) -> Result<BoxedOperation, String> {
    match tag {
        OperationTag::CreateTable => decode_as!(table_ops::CreateTable, payload),
        OperationTag::RenameTable => decode_as!(table_ops::RenameTable, payload),
        OperationTag::DropTable => decode_as!(table_ops::DropTable, payload),
        OperationTag::AddColumn => decode_as!(column_ops::AddColumn, payload),
        OperationTag::DropColumn => decode_as!(column_ops::DropColumn, payload),
        OperationTag::RenameColumn => decode_as!(column_ops::RenameColumn, payload),
        OperationTag::AlterColumn => decode_as!(alter_column::AlterColumn, payload),
        OperationTag::ChangeType => decode_as!(alter_column::ChangeType, payload),
        OperationTag::SetNotNull => decode_as!(alter_column::SetNotNull, payload),
        OperationTag::DropNotNull => decode_as!(alter_column::DropNotNull, payload),
        OperationTag::SetUnique => decode_as!(alter_column::SetUnique, payload),
        OperationTag::SetDefault => decode_as!(alter_column::SetDefault, payload),
        OperationTag::SetForeignKey => decode_as!(alter_column::SetForeignKey, payload),
        OperationTag::SetCheckConstraint => decode_as!(alter_column::SetCheckConstraint, payload),
        OperationTag::CreateIndex => decode_as!(index_ops::CreateIndex, payload),
        OperationTag::DropIndex => decode_as!(index_ops::DropIndex, payload),
        OperationTag::CreateConstraint => decode_as!(constraint_ops::CreateConstraint, payload),
        OperationTag::DropConstraint => decode_as!(constraint_ops::DropConstraint, payload),
        OperationTag::DropMulticolumnConstraint => {
            decode_as!(constraint_ops::DropMulticolumnConstraint, payload)
        }
        OperationTag::RenameConstraint => decode_as!(constraint_ops::RenameConstraint, payload),
        OperationTag::SetReplicaIdentity => {
            decode_as!(replica_identity::SetReplicaIdentity, payload)
        }
        OperationTag::Sql => decode_as!(sql_op::Sql, payload),
    }
}
