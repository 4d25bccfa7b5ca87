use serde::Deserialize;

use crate::dbaction::BoxedAction;
use crate::dbaction::column::{AddColumnAction, DropColumnAction, RenameColumnAction};
use crate::dbaction::function::DropFunctionAction;
use crate::dbaction::trigger::CreateTriggerAction;
use crate::error::ValidateError;
use crate::interfaces::BackfillTask;
use crate::operation::StartOutput;
use crate::operation::duplication::identity_expression;
use crate::operation::table_ops::ColumnDef;
use crate::operation::{Operation};
use crate::schema::{Column, Schema, validate_identifier_length};
use crate::trigger::{ColumnDecl, Direction, TriggerConfig};

fn column_decls(schema: &Schema, table: &str) -> Vec<ColumnDecl> {
    schema
        .get_table(table)
        .map(|t| {
            t.columns
                .iter()
                .filter(|c| !c.is_removed())
                .map(|c| ColumnDecl {
                    logical: c.name.clone(),
                    physical: c.physical_name(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddColumn {
    pub table: String,
    pub column: ColumnDef,
    #[serde(default)]
    pub up: Option<String>,
}

impl Operation for AddColumn {
    fn name(&self) -> &str {
        "add_column"
    }

    fn validate(&self, schema: &mut Schema) -> Result<(), ValidateError> {
        validate_identifier_length(&self.column.name)?;
        let table = schema
            .get_table_mut(&self.table)
            .ok_or_else(|| ValidateError::TableDoesNotExist {
                name: self.table.clone(),
            })?;
        table.add_column(Column::from(&self.column))
    }

    fn start(&self, schema: &mut Schema) -> Result<StartOutput, ValidateError> {
        let mut clause = format!("{} {}", self.column.name, self.column.type_name);
        if !self.column.nullable {
            clause.push_str(" NOT NULL");
        }
        if let Some(default) = &self.column.default {
            clause.push_str(&format!(" DEFAULT {default}"));
        }
        let sql = format!("ALTER TABLE {} ADD COLUMN {};", self.table, clause);
        let add: BoxedAction = Box::new(AddColumnAction {
            schema: "public".to_string(),
            table: self.table.clone(),
            column: self.column.name.clone(),
            sql,
        });

        let mut actions = vec![add];
        let mut backfill = None;

        if let Some(up_expr) = &self.up {
            let up_config = TriggerConfig {
                name: format!("_pgroll_trigger_{}_{}_up", self.table, self.column.name),
                direction: Direction::Up,
                schema: "public".to_string(),
                latest_schema: "public_latest".to_string(),
                table: self.table.clone(),
                columns: column_decls(schema, &self.table),
                target_column: self.column.name.clone(),
                expression: up_expr.clone(),
            };
            actions.push(Box::new(CreateTriggerAction {
                table: self.table.clone(),
                config: up_config,
            }));
            backfill = Some(BackfillTask {
                table: self.table.clone(),
                columns: vec![self.column.name.clone()],
            });
        }

        Ok(StartOutput { actions, backfill })
    }

    fn complete(&self, _schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        if self.up.is_some() {
            Ok(vec![Box::new(DropFunctionAction {
                schema: "public".to_string(),
                functions: vec![format!(
                    "_pgroll_trigger_{}_{}_up",
                    self.table, self.column.name
                )],
            })])
        } else {
            Ok(vec![])
        }
    }

    fn rollback(&self, schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        if let Some(table) = schema.get_table_mut(&self.table) {
            table.purge_column(&self.column.name);
        }
        let mut actions: Vec<BoxedAction> = vec![Box::new(DropColumnAction {
            schema: "public".to_string(),
            table: self.table.clone(),
            columns: vec![self.column.name.clone()],
        })];
        if self.up.is_some() {
            actions.push(Box::new(DropFunctionAction {
                schema: "public".to_string(),
                functions: vec![format!(
                    "_pgroll_trigger_{}_{}_up",
                    self.table, self.column.name
                )],
            }));
        }
        Ok(actions)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DropColumn {
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub down: Option<String>,
}

impl Operation for DropColumn {
    fn name(&self) -> &str {
        "drop_column"
    }

    fn validate(&self, schema: &mut Schema) -> Result<(), ValidateError> {
        let table = schema
            .get_table_mut(&self.table)
            .ok_or_else(|| ValidateError::TableDoesNotExist {
                name: self.table.clone(),
            })?;
        if table.get_column(&self.column).is_none() {
            return Err(ValidateError::ColumnDoesNotExist {
                table: self.table.clone(),
                name: self.column.clone(),
            });
        }
        table.remove_column(&self.column)
    }

    fn start(&self, schema: &mut Schema) -> Result<StartOutput, ValidateError> {
        if let Some(table) = schema.get_table_mut(&self.table) {
            table.remove_column(&self.column).ok();
        }
        let mut actions: Vec<BoxedAction> = vec![];
        if let Some(down_expr) = &self.down {
            let down_config = TriggerConfig {
                name: format!("_pgroll_trigger_{}_{}_down", self.table, self.column),
                direction: Direction::Down,
                schema: "public".to_string(),
                latest_schema: "public_latest".to_string(),
                table: self.table.clone(),
                columns: column_decls(schema, &self.table),
                target_column: self.column.clone(),
                expression: down_expr.clone(),
            };
            actions.push(Box::new(CreateTriggerAction {
                table: self.table.clone(),
                config: down_config,
            }));
        }
        Ok(StartOutput::with_actions(actions))
    }

    fn complete(&self, schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        if let Some(table) = schema.get_table_mut(&self.table) {
            table.purge_column(&self.column);
        }
        let mut actions: Vec<BoxedAction> = vec![Box::new(DropColumnAction {
            schema: "public".to_string(),
            table: self.table.clone(),
            columns: vec![self.column.clone()],
        })];
        if self.down.is_some() {
            actions.push(Box::new(DropFunctionAction {
                schema: "public".to_string(),
                functions: vec![format!(
                    "_pgroll_trigger_{}_{}_down",
                    self.table, self.column
                )],
            }));
        }
        Ok(actions)
    }

    fn rollback(&self, schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        if let Some(table) = schema.get_table_mut(&self.table) {
            table.unremove_column(&self.column).ok();
        }
        let mut actions: Vec<BoxedAction> = vec![];
        if self.down.is_some() {
            actions.push(Box::new(DropFunctionAction {
                schema: "public".to_string(),
                functions: vec![format!(
                    "_pgroll_trigger_{}_{}_down",
                    self.table, self.column
                )],
            }));
        }
        Ok(actions)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameColumn {
    pub table: String,
    pub from: String,
    pub to: String,
}

impl Operation for RenameColumn {
    fn name(&self) -> &str {
        "rename_column"
    }

    fn validate(&self, schema: &mut Schema) -> Result<(), ValidateError> {
        validate_identifier_length(&self.to)?;
        let table = schema
            .get_table_mut(&self.table)
            .ok_or_else(|| ValidateError::TableDoesNotExist {
                name: self.table.clone(),
            })?;
        let mut column = table
            .get_column(&self.from)
            .ok_or_else(|| ValidateError::ColumnDoesNotExist {
                table: self.table.clone(),
                name: self.from.clone(),
            })?
            .clone();
        column.name = self.to.clone();
        table.purge_column(&self.from);
        table.add_column(column)
    }

    fn start(&self, _schema: &mut Schema) -> Result<StartOutput, ValidateError> {
        Ok(StartOutput::new())
    }

    fn complete(&self, _schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        Ok(vec![Box::new(RenameColumnAction {
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

/// Produces the default `Up` expression (identity copy) for `add_column`
/// when no explicit one is given.
pub fn default_up_for(column: &Column) -> String {
    identity_expression(column)
}
