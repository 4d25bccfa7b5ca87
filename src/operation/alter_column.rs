//! `alter_column` and its six narrower single-purpose siblings. All share
//! the duplication strategy in `operation::duplication` — this module only
//! decides *what* target shape and *which* constraint each narrower tag
//! asks for.

use serde::Deserialize;

use crate::dbaction::BoxedAction;
use crate::error::ValidateError;
use crate::operation::duplication::{self, DuplicationSpec, DuplicationState, PendingConstraint, TargetShape};
use crate::operation::{Operation, StartOutput};
use crate::schema::{ColumnReference, Schema};

#[allow(clippy::too_many_arguments)]
fn spec<'a>(
    table: &str,
    column: &str,
    target: TargetShape,
    up: &Option<String>,
    down: &Option<String>,
    constraints: Vec<PendingConstraint>,
    state: &'a DuplicationState,
) -> Result<DuplicationSpec<'a>, ValidateError> {
    let up = up.clone().ok_or_else(|| ValidateError::FieldRequired {
        name: "up".to_string(),
    })?;
    Ok(DuplicationSpec {
        schema_name: "public".to_string(),
        latest_schema: "public_latest".to_string(),
        table: table.to_string(),
        column: column.to_string(),
        target,
        up,
        down: down.clone(),
        trigger_prefix: format!("_pgroll_trigger_{table}_{column}"),
        constraints,
        state,
    })
}

/// The compound operation: may change type, nullability, default,
/// unique, check, references and comment simultaneously, always through
/// the duplication strategy.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlterColumn {
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub up: Option<String>,
    #[serde(default)]
    pub down: Option<String>,
    #[serde(default, rename = "type")]
    pub new_type: Option<String>,
    #[serde(default)]
    pub set_not_null: bool,
    #[serde(default)]
    pub drop_not_null: bool,
    #[serde(default)]
    pub set_unique: bool,
    #[serde(default)]
    pub set_default: Option<String>,
    #[serde(default)]
    pub set_foreign_key: Option<ColumnReference>,
    #[serde(default)]
    pub set_check_constraint: Option<String>,
    #[serde(skip, default = "DuplicationState::new")]
    state: DuplicationState,
}

impl AlterColumn {
    fn target_shape(&self) -> TargetShape {
        TargetShape {
            type_name: self.new_type.clone(),
            nullable: if self.set_not_null {
                Some(false)
            } else if self.drop_not_null {
                Some(true)
            } else {
                None
            },
            default: self.set_default.clone().map(Some),
        }
    }

    /// The shadow-column constraints this compound operation asks the
    /// duplication strategy to build and promote, one per requested
    /// `set_unique`/`set_foreign_key`/`set_check_constraint` field.
    fn pending_constraints(&self) -> Vec<PendingConstraint> {
        let mut out = Vec::new();
        if self.set_unique {
            out.push(PendingConstraint::Unique);
        }
        if let Some(reference) = &self.set_foreign_key {
            out.push(PendingConstraint::ForeignKey {
                ref_table: reference.table.clone(),
                ref_columns: vec![reference.column.clone()],
            });
        }
        if let Some(expression) = &self.set_check_constraint {
            out.push(PendingConstraint::Check {
                expression: expression.clone(),
            });
        }
        out
    }
}

impl Operation for AlterColumn {
    fn name(&self) -> &str {
        "alter_column"
    }

    fn validate(&self, schema: &mut Schema) -> Result<(), ValidateError> {
        let table = schema
            .get_table(&self.table)
            .ok_or_else(|| ValidateError::TableDoesNotExist {
                name: self.table.clone(),
            })?;
        if table.get_column(&self.column).is_none() {
            return Err(ValidateError::ColumnDoesNotExist {
                table: self.table.clone(),
                name: self.column.clone(),
            });
        }
        if self.new_type.is_some() && self.up.is_none() {
            return Err(ValidateError::FieldRequired {
                name: "up".to_string(),
            });
        }
        Ok(())
    }

    fn start(&self, schema: &mut Schema) -> Result<StartOutput, ValidateError> {
        duplication::start(
            schema,
            &spec(
                &self.table,
                &self.column,
                self.target_shape(),
                &self.up,
                &self.down,
                self.pending_constraints(),
                &self.state,
            )?,
        )
    }

    fn complete(&self, schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        duplication::complete(
            schema,
            &spec(
                &self.table,
                &self.column,
                self.target_shape(),
                &self.up,
                &self.down,
                self.pending_constraints(),
                &self.state,
            )?,
        )
    }

    fn rollback(&self, schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        duplication::rollback(
            schema,
            &spec(
                &self.table,
                &self.column,
                self.target_shape(),
                &self.up,
                &self.down,
                self.pending_constraints(),
                &self.state,
            )?,
        )
    }
}

macro_rules! narrow_alter_op {
    ($struct_name:ident, $tag:literal, $extra_fields:tt, $target_shape:expr, $constraints:expr, $extra_validate:expr) => {
        // Note: `deny_unknown_fields` is not used here — serde does not
        // support combining it with `#[serde(flatten)]`, which this macro
        // relies on for the per-tag extra fields.
        #[derive(Debug, Deserialize)]
        pub struct $struct_name {
            pub table: String,
            pub column: String,
            #[serde(default)]
            pub up: Option<String>,
            #[serde(default)]
            pub down: Option<String>,
            #[serde(flatten)]
            pub extra: $extra_fields,
            #[serde(skip, default = "DuplicationState::new")]
            state: DuplicationState,
        }

        impl Operation for $struct_name {
            fn name(&self) -> &str {
                $tag
            }

            fn validate(&self, schema: &mut Schema) -> Result<(), ValidateError> {
                let table = schema.get_table(&self.table).ok_or_else(|| {
                    ValidateError::TableDoesNotExist {
                        name: self.table.clone(),
                    }
                })?;
                if table.get_column(&self.column).is_none() {
                    return Err(ValidateError::ColumnDoesNotExist {
                        table: self.table.clone(),
                        name: self.column.clone(),
                    });
                }
                if self.up.is_none() {
                    return Err(ValidateError::FieldRequired {
                        name: "up".to_string(),
                    });
                }
                ($extra_validate)(self)
            }

            fn start(&self, schema: &mut Schema) -> Result<StartOutput, ValidateError> {
                duplication::start(
                    schema,
                    &spec(
                        &self.table,
                        &self.column,
                        ($target_shape)(self),
                        &self.up,
                        &self.down,
                        ($constraints)(self),
                        &self.state,
                    )?,
                )
            }

            fn complete(&self, schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
                duplication::complete(
                    schema,
                    &spec(
                        &self.table,
                        &self.column,
                        ($target_shape)(self),
                        &self.up,
                        &self.down,
                        ($constraints)(self),
                        &self.state,
                    )?,
                )
            }

            fn rollback(&self, schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
                duplication::rollback(
                    schema,
                    &spec(
                        &self.table,
                        &self.column,
                        ($target_shape)(self),
                        &self.up,
                        &self.down,
                        ($constraints)(self),
                        &self.state,
                    )?,
                )
            }
        }
    };
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeTypeFields {
    #[serde(rename = "type")]
    pub new_type: String,
}
narrow_alter_op!(
    ChangeType,
    "change_type",
    ChangeTypeFields,
    |op: &ChangeType| TargetShape {
        type_name: Some(op.extra.new_type.clone()),
        nullable: None,
        default: None,
    },
    |_op: &ChangeType| Vec::new(),
    |op: &ChangeType| {
        if op.down.is_none() {
            return Err(ValidateError::FieldRequired {
                name: "down".to_string(),
            });
        }
        Ok(())
    }
);

#[derive(Debug, Default, Deserialize)]
pub struct NoExtraFields {}
narrow_alter_op!(
    SetNotNull,
    "set_not_null",
    NoExtraFields,
    |_op: &SetNotNull| TargetShape {
        type_name: None,
        nullable: Some(false),
        default: None,
    },
    |_op: &SetNotNull| Vec::new(),
    |op: &SetNotNull| {
        let _ = op;
        Ok(())
    }
);

narrow_alter_op!(
    DropNotNull,
    "drop_not_null",
    NoExtraFields,
    |_op: &DropNotNull| TargetShape {
        type_name: None,
        nullable: Some(true),
        default: None,
    },
    |_op: &DropNotNull| Vec::new(),
    |op: &DropNotNull| {
        let _ = op;
        Ok(())
    }
);

narrow_alter_op!(
    SetUnique,
    "set_unique",
    NoExtraFields,
    |_op: &SetUnique| TargetShape::default(),
    |_op: &SetUnique| vec![PendingConstraint::Unique],
    |op: &SetUnique| {
        if op.down.is_none() {
            return Err(ValidateError::FieldRequired {
                name: "down".to_string(),
            });
        }
        Ok(())
    }
);

#[derive(Debug, Default, Deserialize)]
pub struct SetDefaultFields {
    pub default: String,
}
narrow_alter_op!(
    SetDefault,
    "set_default",
    SetDefaultFields,
    |op: &SetDefault| TargetShape {
        type_name: None,
        nullable: None,
        default: Some(Some(op.extra.default.clone())),
    },
    |_op: &SetDefault| Vec::new(),
    |op: &SetDefault| {
        let _ = op;
        Ok(())
    }
);

#[derive(Debug, Default, Deserialize)]
pub struct SetForeignKeyFields {
    pub references: ColumnReference,
}
narrow_alter_op!(
    SetForeignKey,
    "set_foreign_key",
    SetForeignKeyFields,
    |_op: &SetForeignKey| TargetShape::default(),
    |op: &SetForeignKey| {
        vec![PendingConstraint::ForeignKey {
            ref_table: op.extra.references.table.clone(),
            ref_columns: vec![op.extra.references.column.clone()],
        }]
    },
    |op: &SetForeignKey| {
        if op.down.is_none() {
            return Err(ValidateError::FieldRequired {
                name: "down".to_string(),
            });
        }
        Ok(())
    }
);

#[derive(Debug, Default, Deserialize)]
pub struct SetCheckConstraintFields {
    pub check: String,
}
narrow_alter_op!(
    SetCheckConstraint,
    "set_check_constraint",
    SetCheckConstraintFields,
    |_op: &SetCheckConstraint| TargetShape::default(),
    |op: &SetCheckConstraint| {
        vec![PendingConstraint::Check {
            expression: op.extra.check.clone(),
        }]
    },
    |op: &SetCheckConstraint| {
        if op.down.is_none() {
            return Err(ValidateError::FieldRequired {
                name: "down".to_string(),
            });
        }
        Ok(())
    }
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, Table};

    fn schema_with_age() -> Schema {
        let mut schema = Schema::new("public");
        let mut table = Table::new("users");
        table.add_column(Column::new("age", "integer", true)).unwrap();
        schema.add_table(table).unwrap();
        schema
    }

    #[test]
    fn change_type_requires_up_and_down() {
        let mut schema = schema_with_age();
        let op = ChangeType {
            table: "users".to_string(),
            column: "age".to_string(),
            up: Some("age::text".to_string()),
            down: None,
            extra: ChangeTypeFields {
                new_type: "text".to_string(),
            },
            state: DuplicationState::new(),
        };
        assert!(matches!(
            op.validate(&mut schema),
            Err(ValidateError::FieldRequired { .. })
        ));
    }

    #[test]
    fn change_type_start_duplicates_column_to_target_type() {
        let mut schema = schema_with_age();
        let op = ChangeType {
            table: "users".to_string(),
            column: "age".to_string(),
            up: Some("age::text".to_string()),
            down: Some("age::integer".to_string()),
            extra: ChangeTypeFields {
                new_type: "text".to_string(),
            },
            state: DuplicationState::new(),
        };
        op.validate(&mut schema).unwrap();
        op.start(&mut schema).unwrap();
        let col = schema.get_table("users").unwrap().get_column("age").unwrap();
        assert_eq!(col.type_name, "text");
        assert!(col.is_duplicated());
    }

    #[test]
    fn set_not_null_requires_up() {
        let mut schema = schema_with_age();
        let op = SetNotNull {
            table: "users".to_string(),
            column: "age".to_string(),
            up: None,
            down: None,
            extra: NoExtraFields::default(),
            state: DuplicationState::new(),
        };
        assert!(matches!(
            op.validate(&mut schema),
            Err(ValidateError::FieldRequired { .. })
        ));
    }

    #[test]
    fn set_unique_builds_a_low_lock_index_at_start_and_promotes_it_at_complete() {
        let mut schema = schema_with_age();
        let op = SetUnique {
            table: "users".to_string(),
            column: "age".to_string(),
            up: Some("age".to_string()),
            down: Some("age".to_string()),
            extra: NoExtraFields::default(),
            state: DuplicationState::new(),
        };
        op.validate(&mut schema).unwrap();
        let started = op.start(&mut schema).unwrap();
        assert!(
            started
                .actions
                .iter()
                .any(|a| a.id().contains("create_unique_index_concurrently")),
            "start() should build the shadow unique index concurrently, not a blocking constraint"
        );

        let completed = op.complete(&mut schema).unwrap();
        assert!(
            completed
                .iter()
                .any(|a| a.id().starts_with("rename_duplicated_")),
            "complete() should promote the shadow index via the composite rename action"
        );
    }

    #[test]
    fn alter_column_set_foreign_key_builds_shadow_fk_and_promotes_it() {
        let mut schema = schema_with_age();
        let op = AlterColumn {
            table: "users".to_string(),
            column: "age".to_string(),
            up: Some("age".to_string()),
            down: Some("age".to_string()),
            new_type: None,
            set_not_null: false,
            drop_not_null: false,
            set_unique: false,
            set_default: None,
            set_foreign_key: Some(ColumnReference {
                table: "age_bracket".to_string(),
                column: "id".to_string(),
            }),
            set_check_constraint: None,
            state: DuplicationState::new(),
        };
        op.validate(&mut schema).unwrap();
        let started = op.start(&mut schema).unwrap();
        assert!(
            started
                .actions
                .iter()
                .any(|a| a.id().contains("create_fk_constraint")),
            "start() should create the shadow FK NOT VALID, not defer it to complete()"
        );

        let completed = op.complete(&mut schema).unwrap();
        assert!(completed.iter().any(|a| a.id().starts_with("rename_duplicated_")));
    }
}
