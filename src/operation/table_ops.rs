use serde::Deserialize;

use crate::dbaction::BoxedAction;
use crate::dbaction::table::{CreateTableAction, DropTableAction, RenameTableAction};
use crate::error::ValidateError;
use crate::operation::{Operation, StartOutput};
use crate::schema::{Column, ColumnGenerated, Schema, Table, validate_identifier_length};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub pk: bool,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub check: Option<String>,
    #[serde(default)]
    pub references: Option<crate::schema::ColumnReference>,
}

impl From<&ColumnDef> for Column {
    fn from(def: &ColumnDef) -> Self {
        let mut column = Column::new(def.name.clone(), def.type_name.clone(), def.nullable);
        column.default = def.default.clone();
        column.unique = def.unique;
        column.primary_key = def.pk;
        column.comment = def.comment.clone();
        column.references = def.references.clone();
        column.generated = ColumnGenerated::None;
        column
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTable {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl Operation for CreateTable {
    fn name(&self) -> &str {
        "create_table"
    }

    fn validate(&self, schema: &mut Schema) -> Result<(), ValidateError> {
        validate_identifier_length(&self.name)?;
        if schema.has_table(&self.name) {
            return Err(ValidateError::TableAlreadyExists {
                name: self.name.clone(),
            });
        }
        if self.columns.is_empty() {
            return Err(ValidateError::FieldRequired {
                name: "columns".to_string(),
            });
        }
        for col in &self.columns {
            validate_identifier_length(&col.name)?;
        }
        let mut table = Table::new(self.name.clone());
        for def in &self.columns {
            table.add_column(Column::from(def))?;
        }
        schema.add_table(table)
    }

    fn start(&self, _schema: &mut Schema) -> Result<StartOutput, ValidateError> {
        let mut column_sql = Vec::new();
        for col in &self.columns {
            let mut clause = format!("{} {}", col.name, col.type_name);
            if !col.nullable {
                clause.push_str(" NOT NULL");
            }
            if let Some(default) = &col.default {
                clause.push_str(&format!(" DEFAULT {default}"));
            }
            if col.unique {
                clause.push_str(" UNIQUE");
            }
            if col.pk {
                clause.push_str(" PRIMARY KEY");
            }
            if let Some(check) = &col.check {
                clause.push_str(&format!(" CHECK ({check})"));
            }
            column_sql.push(clause);
        }
        let sql = format!(
            "CREATE TABLE {} ({});",
            self.name,
            column_sql.join(", ")
        );
        let action: BoxedAction = Box::new(CreateTableAction {
            schema: "public".to_string(),
            table: self.name.clone(),
            sql,
        });
        Ok(StartOutput::with_actions(vec![action]))
    }

    fn complete(&self, _schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        Ok(vec![])
    }

    fn rollback(&self, schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        schema.purge_table(&self.name);
        let action: BoxedAction = Box::new(DropTableAction {
            schema: "public".to_string(),
            table: self.name.clone(),
        });
        Ok(vec![action])
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameTable {
    pub from: String,
    pub to: String,
}

impl Operation for RenameTable {
    fn name(&self) -> &str {
        "rename_table"
    }

    fn validate(&self, schema: &mut Schema) -> Result<(), ValidateError> {
        validate_identifier_length(&self.to)?;
        if !schema.has_table(&self.from) {
            return Err(ValidateError::TableDoesNotExist {
                name: self.from.clone(),
            });
        }
        if schema.has_table(&self.to) {
            return Err(ValidateError::TableAlreadyExists {
                name: self.to.clone(),
            });
        }
        let mut table = schema.get_table(&self.from).unwrap().clone();
        table.name = self.to.clone();
        schema.purge_table(&self.from);
        schema.add_table(table)
    }

    fn start(&self, _schema: &mut Schema) -> Result<StartOutput, ValidateError> {
        Ok(StartOutput::new())
    }

    fn complete(&self, _schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        let action: BoxedAction = Box::new(RenameTableAction {
            schema: "public".to_string(),
            from: self.from.clone(),
            to: self.to.clone(),
        });
        Ok(vec![action])
    }

    fn rollback(&self, _schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        Ok(vec![])
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DropTable {
    pub name: String,
}

impl Operation for DropTable {
    fn name(&self) -> &str {
        "drop_table"
    }

    fn validate(&self, schema: &mut Schema) -> Result<(), ValidateError> {
        if !schema.has_table(&self.name) {
            return Err(ValidateError::TableDoesNotExist {
                name: self.name.clone(),
            });
        }
        schema.remove_table(&self.name)
    }

    fn start(&self, schema: &mut Schema) -> Result<StartOutput, ValidateError> {
        schema.remove_table(&self.name).ok();
        let action: BoxedAction = Box::new(RenameTableAction {
            schema: "public".to_string(),
            from: self.name.clone(),
            to: crate::schema::deleted_name(&self.name),
        });
        Ok(StartOutput::with_actions(vec![action]))
    }

    fn complete(&self, schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        schema.purge_table(&self.name);
        let action: BoxedAction = Box::new(DropTableAction {
            schema: "public".to_string(),
            table: crate::schema::deleted_name(&self.name),
        });
        Ok(vec![action])
    }

    fn rollback(&self, schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        schema.unremove_table(&self.name).ok();
        let action: BoxedAction = Box::new(RenameTableAction {
            schema: "public".to_string(),
            from: crate::schema::deleted_name(&self.name),
            to: self.name.clone(),
        });
        Ok(vec![action])
    }
}
