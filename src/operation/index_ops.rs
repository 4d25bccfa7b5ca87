use serde::Deserialize;

use crate::dbaction::BoxedAction;
use crate::dbaction::index::{
    CreateIndexConcurrentlyAction, CreateUniqueIndexConcurrentlyAction, DropIndexAction,
};
use crate::error::ValidateError;
use crate::operation::{Operation, StartOutput};
use crate::schema::{Index, Schema, validate_identifier_length};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexMethod {
    Btree,
    Hash,
    Gist,
    Spgist,
    Gin,
    Brin,
}

impl Default for IndexMethod {
    fn default() -> Self {
        Self::Btree
    }
}

impl IndexMethod {
    fn as_sql(&self) -> &'static str {
        match self {
            IndexMethod::Btree => "btree",
            IndexMethod::Hash => "hash",
            IndexMethod::Gist => "gist",
            IndexMethod::Spgist => "spgist",
            IndexMethod::Gin => "gin",
            IndexMethod::Brin => "brin",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexColumnSpec {
    pub column: String,
    #[serde(default)]
    pub collate: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub nulls: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateIndex {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub method: IndexMethod,
    #[serde(default)]
    pub unique: bool,
    pub columns: Vec<IndexColumnSpec>,
    #[serde(default)]
    pub predicate: Option<String>,
    #[serde(default)]
    pub storage_parameters: Option<String>,
}

impl CreateIndex {
    fn column_clause(&self) -> String {
        self.columns
            .iter()
            .map(|c| {
                let mut piece = c.column.clone();
                if let Some(collate) = &c.collate {
                    piece.push_str(&format!(" COLLATE \"{collate}\""));
                }
                if let Some(sort) = &c.sort {
                    piece.push_str(&format!(" {sort}"));
                }
                if let Some(nulls) = &c.nulls {
                    piece.push_str(&format!(" NULLS {nulls}"));
                }
                piece
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn create_sql(&self) -> String {
        let unique = if self.unique { "UNIQUE " } else { "" };
        let predicate = self
            .predicate
            .as_ref()
            .map(|p| format!(" WHERE {p}"))
            .unwrap_or_default();
        let storage = self
            .storage_parameters
            .as_ref()
            .map(|p| format!(" WITH ({p})"))
            .unwrap_or_default();
        format!(
            "CREATE {}INDEX CONCURRENTLY {} ON {} USING {} ({}){}{};",
            unique,
            self.name,
            self.table,
            self.method.as_sql(),
            self.column_clause(),
            storage,
            predicate,
        )
    }
}

impl Operation for CreateIndex {
    fn name(&self) -> &str {
        "create_index"
    }

    fn validate(&self, schema: &mut Schema) -> Result<(), ValidateError> {
        validate_identifier_length(&self.name)?;
        if self.name.is_empty() {
            return Err(ValidateError::FieldRequired {
                name: "name".to_string(),
            });
        }
        let table = schema
            .get_table(&self.table)
            .ok_or_else(|| ValidateError::TableDoesNotExist {
                name: self.table.clone(),
            })?;
        for col in &self.columns {
            if table.get_column(&col.column).is_none() {
                return Err(ValidateError::ColumnDoesNotExist {
                    table: self.table.clone(),
                    name: col.column.clone(),
                });
            }
        }
        if schema.index_exists(&self.name) {
            return Err(ValidateError::IndexAlreadyExists {
                name: self.name.clone(),
            });
        }
        schema.register_index(&self.name, &self.table);
        if let Some(table) = schema.get_table_mut(&self.table) {
            table.indexes.insert(
                self.name.clone(),
                Index {
                    name: self.name.clone(),
                    table: self.table.clone(),
                    columns: self.columns.iter().map(|c| c.column.clone()).collect(),
                    unique: self.unique,
                    method: Some(self.method.as_sql().to_string()),
                    predicate: self.predicate.clone(),
                },
            );
        }
        Ok(())
    }

    fn start(&self, _schema: &mut Schema) -> Result<StartOutput, ValidateError> {
        let action: BoxedAction = if self.unique {
            Box::new(CreateUniqueIndexConcurrentlyAction {
                schema: "public".to_string(),
                table: self.table.clone(),
                name: self.name.clone(),
                create_sql: self.create_sql(),
            })
        } else {
            Box::new(CreateIndexConcurrentlyAction {
                schema: "public".to_string(),
                table: self.table.clone(),
                name: self.name.clone(),
                create_sql: self.create_sql(),
            })
        };
        Ok(StartOutput::with_actions(vec![action]))
    }

    fn complete(&self, _schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        Ok(vec![])
    }

    fn rollback(&self, schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        if let Some(table) = schema.get_table_mut(&self.table) {
            table.indexes.remove(&self.name);
        }
        schema.unregister_index(&self.name);
        Ok(vec![Box::new(DropIndexAction {
            schema: "public".to_string(),
            name: self.name.clone(),
        })])
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DropIndex {
    pub name: String,
}

impl Operation for DropIndex {
    fn name(&self) -> &str {
        "drop_index"
    }

    fn validate(&self, schema: &mut Schema) -> Result<(), ValidateError> {
        if !schema.index_exists(&self.name) {
            return Err(ValidateError::IndexDoesNotExist {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    fn start(&self, _schema: &mut Schema) -> Result<StartOutput, ValidateError> {
        Ok(StartOutput::new())
    }

    fn complete(&self, schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        if let Some(table_name) = schema.table_for_index(&self.name).map(str::to_string)
            && let Some(table) = schema.get_table_mut(&table_name)
        {
            table.indexes.remove(&self.name);
        }
        schema.unregister_index(&self.name);
        Ok(vec![Box::new(DropIndexAction {
            schema: "public".to_string(),
            name: self.name.clone(),
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

    fn schema_with_users() -> Schema {
        let mut schema = Schema::new("public");
        let mut table = Table::new("users");
        table.add_column(Column::new("email", "text", false)).unwrap();
        schema.add_table(table).unwrap();
        schema
    }

    #[test]
    fn create_index_validate_rejects_missing_column() {
        let mut schema = schema_with_users();
        let op = CreateIndex {
            name: "idx_users_phone".to_string(),
            table: "users".to_string(),
            method: IndexMethod::Btree,
            unique: false,
            columns: vec![IndexColumnSpec {
                column: "phone".to_string(),
                collate: None,
                sort: None,
                nulls: None,
            }],
            predicate: None,
            storage_parameters: None,
        };
        assert!(matches!(
            op.validate(&mut schema),
            Err(ValidateError::ColumnDoesNotExist { .. })
        ));
    }

    #[test]
    fn create_index_validate_rejects_duplicate_name_schema_wide() {
        let mut schema = schema_with_users();
        schema.register_index("idx_users_email", "users");
        let op = CreateIndex {
            name: "idx_users_email".to_string(),
            table: "users".to_string(),
            method: IndexMethod::Btree,
            unique: false,
            columns: vec![IndexColumnSpec {
                column: "email".to_string(),
                collate: None,
                sort: None,
                nulls: None,
            }],
            predicate: None,
            storage_parameters: None,
        };
        assert!(matches!(
            op.validate(&mut schema),
            Err(ValidateError::IndexAlreadyExists { .. })
        ));
    }

    #[test]
    fn drop_index_validate_requires_existing_index() {
        let mut schema = schema_with_users();
        let op = DropIndex {
            name: "idx_missing".to_string(),
        };
        assert!(matches!(
            op.validate(&mut schema),
            Err(ValidateError::IndexDoesNotExist { .. })
        ));
    }
}
