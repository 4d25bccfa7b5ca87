use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Deserialize;

use crate::dbaction::BoxedAction;
use crate::dbaction::constraint::{AddConstraintUsingUniqueIndexAction, RenameConstraintAction, ValidateConstraintAction};
use crate::dbaction::index::CreateUniqueIndexConcurrentlyAction;
use crate::error::ValidateError;
use crate::operation::duplication::{self, DuplicationSpec, DuplicationState, TargetShape};
use crate::operation::{Operation, StartOutput};
use crate::schema::Schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Unique,
    Check,
}

/// A multi-column `unique` or `check` constraint, built via the duplication
/// strategy run once per affected column.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConstraint {
    pub table: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ConstraintKind,
    pub columns: Vec<String>,
    #[serde(default)]
    pub check: Option<String>,
    pub up: HashMap<String, String>,
    pub down: HashMap<String, String>,
    #[serde(skip, default = "OnceLock::new")]
    states: OnceLock<Vec<DuplicationState>>,
}

impl CreateConstraint {
    /// Name of the low-lock unique index built against the shadow columns
    /// at Start and promoted into the named constraint at Complete, via
    /// `ADD CONSTRAINT ... UNIQUE USING INDEX` — the same technique
    /// `RenamedIndex::promote_to_unique_constraint` uses for single-column
    /// `set_unique`.
    fn shadow_index_name(&self) -> String {
        format!("{}{}_{}", crate::schema::DUPLICATION_PREFIX, self.table, self.name)
    }

    fn state_for(&self, index: usize) -> &DuplicationState {
        let states = self
            .states
            .get_or_init(|| self.columns.iter().map(|_| DuplicationState::new()).collect());
        &states[index]
    }

    fn specs(&self) -> Result<Vec<DuplicationSpec<'_>>, ValidateError> {
        let mut out = Vec::with_capacity(self.columns.len());
        for (i, column) in self.columns.iter().enumerate() {
            let up = self
                .up
                .get(column)
                .cloned()
                .ok_or_else(|| ValidateError::FieldRequired {
                    name: format!("up.{column}"),
                })?;
            let down = self.down.get(column).cloned();
            out.push(DuplicationSpec {
                schema_name: "public".to_string(),
                latest_schema: "public_latest".to_string(),
                table: self.table.clone(),
                column: column.clone(),
                target: TargetShape::default(),
                up,
                down,
                trigger_prefix: format!("_pgroll_trigger_{}_{}_{}", self.table, self.name, column),
                constraints: vec![],
                state: self.state_for(i),
            });
        }
        Ok(out)
    }
}

impl Operation for CreateConstraint {
    fn name(&self) -> &str {
        "create_constraint"
    }

    fn validate(&self, schema: &mut Schema) -> Result<(), ValidateError> {
        let table = schema
            .get_table(&self.table)
            .ok_or_else(|| ValidateError::TableDoesNotExist {
                name: self.table.clone(),
            })?;
        if table.constraint_exists(&self.name) {
            return Err(ValidateError::ConstraintAlreadyExists {
                table: self.table.clone(),
                constraint: self.name.clone(),
            });
        }
        for column in &self.columns {
            if table.get_column(column).is_none() {
                return Err(ValidateError::ColumnDoesNotExist {
                    table: self.table.clone(),
                    name: column.clone(),
                });
            }
            if !self.up.contains_key(column) {
                return Err(ValidateError::FieldRequired {
                    name: format!("up.{column}"),
                });
            }
            if !self.down.contains_key(column) {
                return Err(ValidateError::FieldRequired {
                    name: format!("down.{column}"),
                });
            }
        }
        if self.kind == ConstraintKind::Check && self.check.is_none() {
            return Err(ValidateError::FieldRequired {
                name: "check".to_string(),
            });
        }
        Ok(())
    }

    fn start(&self, schema: &mut Schema) -> Result<StartOutput, ValidateError> {
        let mut actions = Vec::new();
        let mut backfill_columns = Vec::new();
        for spec in self.specs()? {
            let out = duplication::start(schema, &spec)?;
            backfill_columns.push(spec.column.clone());
            actions.extend(out.actions);
        }
        if self.kind == ConstraintKind::Unique {
            let shadow_columns: Vec<String> = self.columns.iter().map(|c| crate::schema::duplicated_name(c)).collect();
            let name = self.shadow_index_name();
            let create_sql = format!(
                "CREATE UNIQUE INDEX CONCURRENTLY {} ON public.{} ({});",
                name,
                self.table,
                shadow_columns.join(", ")
            );
            actions.push(Box::new(CreateUniqueIndexConcurrentlyAction {
                schema: "public".to_string(),
                table: self.table.clone(),
                name,
                create_sql,
            }));
        }
        Ok(StartOutput {
            actions,
            backfill: Some(crate::interfaces::BackfillTask {
                table: self.table.clone(),
                columns: backfill_columns,
            }),
        })
    }

    fn complete(&self, schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        let mut actions = Vec::new();
        for spec in self.specs()? {
            actions.extend(duplication::complete(schema, &spec)?);
        }
        match self.kind {
            ConstraintKind::Unique => {
                actions.push(Box::new(AddConstraintUsingUniqueIndexAction {
                    schema: "public".to_string(),
                    table: self.table.clone(),
                    constraint: self.name.clone(),
                    index: self.shadow_index_name(),
                }));
            }
            ConstraintKind::Check => {
                let expression = self.check.clone().unwrap_or_default();
                actions.push(Box::new(crate::dbaction::constraint::CreateCheckConstraintAction {
                    schema: "public".to_string(),
                    table: self.table.clone(),
                    name: self.name.clone(),
                    expression,
                    not_valid: true,
                }));
                actions.push(Box::new(ValidateConstraintAction {
                    schema: "public".to_string(),
                    table: self.table.clone(),
                    constraint: self.name.clone(),
                }));
            }
        }
        Ok(actions)
    }

    fn rollback(&self, schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        let mut actions = Vec::new();
        for spec in self.specs()? {
            actions.extend(duplication::rollback(schema, &spec)?);
        }
        Ok(actions)
    }
}

/// Rebuilds the affected columns without the named constraint, then drops
/// it. Shared by `drop_constraint` and `drop_multicolumn_constraint` — the
/// wire tags differ only in how many columns they carry.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DropConstraint {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
    pub down: HashMap<String, String>,
    #[serde(skip, default = "OnceLock::new")]
    states: OnceLock<Vec<DuplicationState>>,
}

impl DropConstraint {
    fn state_for(&self, index: usize) -> &DuplicationState {
        let states = self
            .states
            .get_or_init(|| self.columns.iter().map(|_| DuplicationState::new()).collect());
        &states[index]
    }

    fn specs(&self) -> Result<Vec<DuplicationSpec<'_>>, ValidateError> {
        let mut out = Vec::with_capacity(self.columns.len());
        for (i, column) in self.columns.iter().enumerate() {
            let down = self
                .down
                .get(column)
                .cloned()
                .ok_or_else(|| ValidateError::FieldRequired {
                    name: format!("down.{column}"),
                })?;
            out.push(DuplicationSpec {
                schema_name: "public".to_string(),
                latest_schema: "public_latest".to_string(),
                table: self.table.clone(),
                column: column.clone(),
                target: TargetShape::default(),
                // No safe default for `Up` is specified for drop_constraint;
                // the identity expression is always correct here since the
                // shadow column keeps the same shape as the original.
                up: column.clone(),
                down: Some(down),
                trigger_prefix: format!("_pgroll_trigger_{}_{}_{}", self.table, self.name, column),
                constraints: vec![],
                state: self.state_for(i),
            });
        }
        Ok(out)
    }
}

impl Operation for DropConstraint {
    fn name(&self) -> &str {
        "drop_constraint"
    }

    fn validate(&self, schema: &mut Schema) -> Result<(), ValidateError> {
        let table = schema
            .get_table(&self.table)
            .ok_or_else(|| ValidateError::TableDoesNotExist {
                name: self.table.clone(),
            })?;
        if self.name.is_empty() {
            return Err(ValidateError::FieldRequired {
                name: "name".to_string(),
            });
        }
        if !table.constraint_exists(&self.name) {
            return Err(ValidateError::ConstraintDoesNotExist {
                table: self.table.clone(),
                constraint: self.name.clone(),
            });
        }
        for column in &self.columns {
            if table.get_column(column).is_none() {
                return Err(ValidateError::ColumnDoesNotExist {
                    table: self.table.clone(),
                    name: column.clone(),
                });
            }
            if !self.down.contains_key(column) {
                return Err(ValidateError::FieldRequired {
                    name: format!("down.{column}"),
                });
            }
        }
        Ok(())
    }

    fn start(&self, schema: &mut Schema) -> Result<StartOutput, ValidateError> {
        let mut actions = Vec::new();
        let mut backfill_columns = Vec::new();
        for spec in self.specs()? {
            let out = duplication::start(schema, &spec)?;
            backfill_columns.push(spec.column.clone());
            actions.extend(out.actions);
        }
        Ok(StartOutput {
            actions,
            backfill: Some(crate::interfaces::BackfillTask {
                table: self.table.clone(),
                columns: backfill_columns,
            }),
        })
    }

    fn complete(&self, schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        let mut actions = Vec::new();
        for spec in self.specs()? {
            actions.extend(duplication::complete(schema, &spec)?);
        }
        if let Some(table) = schema.get_table_mut(&self.table) {
            table.foreign_keys.remove(&self.name);
            table.unique_constraints.remove(&self.name);
            table.check_constraints.remove(&self.name);
        }
        actions.push(Box::new(crate::dbaction::constraint::DropConstraintAction {
            schema: "public".to_string(),
            table: self.table.clone(),
            constraint: self.name.clone(),
        }));
        Ok(actions)
    }

    fn rollback(&self, schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        let mut actions = Vec::new();
        for spec in self.specs()? {
            actions.extend(duplication::rollback(schema, &spec)?);
        }
        Ok(actions)
    }
}

pub type DropMulticolumnConstraint = DropConstraint;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameConstraint {
    pub table: String,
    pub from: String,
    pub to: String,
}

impl Operation for RenameConstraint {
    fn name(&self) -> &str {
        "rename_constraint"
    }

    fn validate(&self, schema: &mut Schema) -> Result<(), ValidateError> {
        let table = schema
            .get_table(&self.table)
            .ok_or_else(|| ValidateError::TableDoesNotExist {
                name: self.table.clone(),
            })?;
        if !table.constraint_exists(&self.from) {
            return Err(ValidateError::ConstraintDoesNotExist {
                table: self.table.clone(),
                constraint: self.from.clone(),
            });
        }
        if table.constraint_exists(&self.to) {
            return Err(ValidateError::ConstraintAlreadyExists {
                table: self.table.clone(),
                constraint: self.to.clone(),
            });
        }
        Ok(())
    }

    fn start(&self, _schema: &mut Schema) -> Result<StartOutput, ValidateError> {
        Ok(StartOutput::new())
    }

    fn complete(&self, schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        if let Some(table) = schema.get_table_mut(&self.table) {
            if let Some(mut fk) = table.foreign_keys.remove(&self.from) {
                fk.name = self.to.clone();
                table.foreign_keys.insert(self.to.clone(), fk);
            }
            if let Some(mut uq) = table.unique_constraints.remove(&self.from) {
                uq.name = self.to.clone();
                table.unique_constraints.insert(self.to.clone(), uq);
            }
            if let Some(mut chk) = table.check_constraints.remove(&self.from) {
                chk.name = self.to.clone();
                table.check_constraints.insert(self.to.clone(), chk);
            }
        }
        Ok(vec![Box::new(RenameConstraintAction {
            schema: "public".to_string(),
            table: self.table.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
        })])
    }

    fn rollback(&self, _schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, Table};

    fn schema_with_orders() -> Schema {
        let mut schema = Schema::new("public");
        let mut table = Table::new("orders");
        table.add_column(Column::new("a", "integer", true)).unwrap();
        table.add_column(Column::new("b", "integer", true)).unwrap();
        schema.add_table(table).unwrap();
        schema
    }

    #[test]
    fn create_constraint_requires_up_for_every_column() {
        let mut schema = schema_with_orders();
        let mut up = HashMap::new();
        up.insert("a".to_string(), "a".to_string());
        let op = CreateConstraint {
            table: "orders".to_string(),
            name: "uq_orders_a_b".to_string(),
            kind: ConstraintKind::Unique,
            columns: vec!["a".to_string(), "b".to_string()],
            check: None,
            up,
            down: HashMap::new(),
            states: OnceLock::new(),
        };
        assert!(matches!(
            op.validate(&mut schema),
            Err(ValidateError::FieldRequired { .. })
        ));
    }

    #[test]
    fn create_constraint_check_requires_check_expression() {
        let mut schema = schema_with_orders();
        let mut up = HashMap::new();
        up.insert("a".to_string(), "a".to_string());
        let mut down = HashMap::new();
        down.insert("a".to_string(), "a".to_string());
        let op = CreateConstraint {
            table: "orders".to_string(),
            name: "chk_orders_a".to_string(),
            kind: ConstraintKind::Check,
            columns: vec!["a".to_string()],
            check: None,
            up,
            down,
            states: OnceLock::new(),
        };
        assert!(matches!(
            op.validate(&mut schema),
            Err(ValidateError::FieldRequired { .. })
        ));
    }

    #[test]
    fn rename_constraint_validate_rejects_missing_source() {
        let mut schema = schema_with_orders();
        let op = RenameConstraint {
            table: "orders".to_string(),
            from: "missing".to_string(),
            to: "new_name".to_string(),
        };
        assert!(matches!(
            op.validate(&mut schema),
            Err(ValidateError::ConstraintDoesNotExist { .. })
        ));
    }

    #[test]
    fn drop_constraint_validate_requires_existing_constraint() {
        let mut schema = schema_with_orders();
        let op = DropConstraint {
            table: "orders".to_string(),
            name: "missing".to_string(),
            columns: vec!["a".to_string()],
            down: HashMap::new(),
            states: OnceLock::new(),
        };
        assert!(matches!(
            op.validate(&mut schema),
            Err(ValidateError::ConstraintDoesNotExist { .. })
        ));
    }
}
