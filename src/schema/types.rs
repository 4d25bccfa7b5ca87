//! Schema, Table, Column and constraint types.
//!
//! Mirrors the shape of a static-analysis catalog (tables keyed by name,
//! indexes looked up schema-wide) but adds the soft-delete and duplication
//! bookkeeping the execution engine needs: a table or column can be marked
//! removed without losing its data so that rollback can restore it.
use std::collections::HashMap;

use crate::error::ValidateError;
use crate::schema::{DELETION_PREFIX, DUPLICATION_PREFIX, deleted_name, validate_identifier_length};

#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub name: String,
    tables: HashMap<String, Table>,
    /// Reverse lookup: index name -> owning table's logical name. Enforces
    /// schema-wide index-name uniqueness.
    index_to_table: HashMap<String, String>,
    /// Bumped on every mutation; used only by debug assertions, never
    /// observed externally.
    generation: u64,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: HashMap::new(),
            index_to_table: HashMap::new(),
            generation: 0,
        }
    }

    /// Returns the table if it exists and is not soft-removed.
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name).filter(|t| !t.removed)
    }

    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name).filter(|t| !t.removed)
    }

    /// Looks up a table regardless of soft-delete state. Used by Rollback to
    /// inspect a table it is about to un-remove.
    pub fn get_table_including_removed(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.get_table(name).is_some()
    }

    pub fn add_table(&mut self, table: Table) -> Result<(), ValidateError> {
        if self.has_table(&table.name) {
            return Err(ValidateError::TableAlreadyExists { name: table.name });
        }
        for idx_name in table.indexes.keys() {
            self.index_to_table
                .insert(idx_name.clone(), table.name.clone());
        }
        self.tables.insert(table.name.clone(), table);
        self.generation += 1;
        Ok(())
    }

    /// Soft-removes a table: it disappears from `GetTable` and its physical
    /// name becomes the deletion alias, but the row data and column metadata
    /// are untouched so a later `UnRemoveTable` can restore it.
    pub fn remove_table(&mut self, name: &str) -> Result<(), ValidateError> {
        let table = self
            .tables
            .get_mut(name)
            .filter(|t| !t.removed)
            .ok_or_else(|| ValidateError::TableDoesNotExist {
                name: name.to_string(),
            })?;
        table.removed = true;
        self.generation += 1;
        Ok(())
    }

    pub fn unremove_table(&mut self, name: &str) -> Result<(), ValidateError> {
        let table = self
            .tables
            .get_mut(name)
            .ok_or_else(|| ValidateError::TableDoesNotExist {
                name: name.to_string(),
            })?;
        table.removed = false;
        self.generation += 1;
        Ok(())
    }

    /// Fully purges a table from the schema model. Used at Complete of
    /// `drop_table`, after the physical table has already been dropped.
    pub fn purge_table(&mut self, name: &str) -> Option<Table> {
        let table = self.tables.remove(name)?;
        for idx_name in table.indexes.keys() {
            self.index_to_table.remove(idx_name);
        }
        Some(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values().filter(|t| !t.removed)
    }

    /// True if an index by this name exists anywhere in the schema —
    /// index names must be unique schema-wide, not just per table.
    pub fn index_exists(&self, index_name: &str) -> bool {
        self.index_to_table.contains_key(index_name)
    }

    pub fn table_for_index(&self, index_name: &str) -> Option<&str> {
        self.index_to_table.get(index_name).map(String::as_str)
    }

    pub fn register_index(&mut self, index_name: &str, table_name: &str) {
        self.index_to_table
            .insert(index_name.to_string(), table_name.to_string());
    }

    pub fn unregister_index(&mut self, index_name: &str) {
        self.index_to_table.remove(index_name);
    }

    pub fn rename_index(&mut self, old_name: &str, new_name: &str) {
        if let Some(table) = self.index_to_table.remove(old_name) {
            self.index_to_table.insert(new_name.to_string(), table);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    /// Logical (client-facing) name.
    pub name: String,
    pub columns: Vec<Column>,
    pub indexes: HashMap<String, Index>,
    pub foreign_keys: HashMap<String, ForeignKey>,
    pub unique_constraints: HashMap<String, UniqueConstraint>,
    pub check_constraints: HashMap<String, CheckConstraint>,
    pub primary_key: Option<PrimaryKey>,
    /// Soft-deleted: still physically present under [`Table::physical_name`]
    /// but invisible to [`Schema::get_table`].
    removed: bool,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: HashMap::new(),
            foreign_keys: HashMap::new(),
            unique_constraints: HashMap::new(),
            check_constraints: HashMap::new(),
            primary_key: None,
            removed: false,
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Computed, never stored redundantly: the physical name on disk,
    /// accounting for soft-delete.
    pub fn physical_name(&self) -> String {
        if self.removed {
            deleted_name(&self.name)
        } else {
            self.name.clone()
        }
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name && !c.removed)
    }

    pub fn get_column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns
            .iter_mut()
            .find(|c| c.name == name && !c.removed)
    }

    pub fn get_column_including_removed(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn add_column(&mut self, column: Column) -> Result<(), ValidateError> {
        if self.get_column(&column.name).is_some() {
            return Err(ValidateError::ConstraintAlreadyExists {
                table: self.name.clone(),
                constraint: column.name.clone(),
            });
        }
        self.columns.push(column);
        Ok(())
    }

    /// Soft-removes a column: `GetColumn` stops returning it but the entry
    /// stays in `columns` (with its physical, possibly-duplicated name) so a
    /// later `UnRemoveColumn` can restore it — needed when an earlier
    /// operation's Rollback has to see the pre-drop state.
    pub fn remove_column(&mut self, name: &str) -> Result<(), ValidateError> {
        let column =
            self.columns
                .iter_mut()
                .find(|c| c.name == name && !c.removed)
                .ok_or_else(|| ValidateError::ColumnDoesNotExist {
                    table: self.name.clone(),
                    name: name.to_string(),
                })?;
        column.removed = true;
        Ok(())
    }

    pub fn unremove_column(&mut self, name: &str) -> Result<(), ValidateError> {
        let column = self.columns.iter_mut().find(|c| c.name == name).ok_or_else(|| {
            ValidateError::ColumnDoesNotExist {
                table: self.name.clone(),
                name: name.to_string(),
            }
        })?;
        column.removed = false;
        Ok(())
    }

    /// Fully purges a column, and cascades to indexes/constraints that
    /// reference it (Postgres drops the whole constraint on column drop,
    /// not just the column from it).
    pub fn purge_column(&mut self, name: &str) {
        self.columns.retain(|c| c.name != name);
        self.indexes.retain(|_, idx| !idx.columns.iter().any(|c| c == name));
        self.foreign_keys
            .retain(|_, fk| !fk.columns.iter().any(|c| c == name));
        self.unique_constraints
            .retain(|_, u| !u.columns.iter().any(|c| c == name));
        self.check_constraints
            .retain(|_, chk| !expression_mentions_column(&chk.expression, name));
        if let Some(pk) = &self.primary_key
            && pk.columns.iter().any(|c| c == name)
        {
            self.primary_key = None;
        }
    }

    /// True if any constraint (of any kind) or index by this name exists on
    /// this table.
    pub fn constraint_exists(&self, name: &str) -> bool {
        self.foreign_keys.contains_key(name)
            || self.unique_constraints.contains_key(name)
            || self.check_constraints.contains_key(name)
            || self.indexes.contains_key(name)
            || self.primary_key.as_ref().is_some_and(|pk| pk.name == name)
    }

    /// Physical column names for the given logical names, honoring any
    /// in-flight duplication.
    pub fn physical_column_names_for(&self, logical_names: &[String]) -> Vec<String> {
        logical_names
            .iter()
            .map(|n| {
                self.get_column(n)
                    .map(|c| c.physical_name())
                    .unwrap_or_else(|| n.clone())
            })
            .collect()
    }
}

fn expression_mentions_column(expression: &str, column: &str) -> bool {
    expression
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .any(|token| token == column)
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    /// Set while duplicated (alter-family operations); `None` means the
    /// physical name equals `name`.
    duplicated_physical_name: Option<String>,
    pub type_name: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub unique: bool,
    pub primary_key: bool,
    pub comment: Option<String>,
    pub generated: ColumnGenerated,
    pub inline_check: Option<String>,
    pub references: Option<ColumnReference>,
    removed: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            duplicated_physical_name: None,
            type_name: type_name.into(),
            nullable,
            default: None,
            unique: false,
            primary_key: false,
            comment: None,
            generated: ColumnGenerated::None,
            inline_check: None,
            references: None,
            removed: false,
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn is_duplicated(&self) -> bool {
        self.duplicated_physical_name.is_some()
    }

    /// The physical column name: `_pgroll_new_<name>` while duplicated,
    /// else `name`.
    pub fn physical_name(&self) -> String {
        self.duplicated_physical_name
            .clone()
            .unwrap_or_else(|| self.name.clone())
    }

    /// Marks this column as duplicated under the shadow-column name.
    /// Called by the duplication strategy's Start phase.
    pub fn mark_duplicated(&mut self) {
        self.duplicated_physical_name = Some(crate::schema::duplicated_name(&self.name));
    }

    /// Clears the duplication marker once the shadow column has been
    /// canonicalized (Complete) or dropped (Rollback).
    pub fn clear_duplicated(&mut self) {
        self.duplicated_physical_name = None;
    }

    pub fn validate_name_length(&self) -> Result<(), ValidateError> {
        validate_identifier_length(&self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ColumnGenerated {
    #[default]
    None,
    Generated(String),
    Identity(IdentityKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    Always,
    ByDefault,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct ColumnReference {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone)]
pub struct Index {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub method: Option<String>,
    pub predicate: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
    pub not_valid: bool,
}

#[derive(Debug, Clone)]
pub struct UniqueConstraint {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CheckConstraint {
    pub name: String,
    pub expression: String,
    pub not_valid: bool,
}

#[derive(Debug, Clone)]
pub struct PrimaryKey {
    pub name: String,
    pub columns: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_with_users() -> Schema {
        let mut schema = Schema::new("public");
        let mut table = Table::new("users");
        table.add_column(Column::new("id", "integer", false)).unwrap();
        table.add_column(Column::new("email", "text", false)).unwrap();
        schema.add_table(table).unwrap();
        schema
    }

    #[test]
    fn add_table_twice_fails() {
        let mut schema = schema_with_users();
        let dup = Table::new("users");
        assert!(matches!(
            schema.add_table(dup),
            Err(ValidateError::TableAlreadyExists { .. })
        ));
    }

    #[test]
    fn remove_table_hides_from_get_table_but_keeps_data() {
        let mut schema = schema_with_users();
        schema.remove_table("users").unwrap();
        assert!(schema.get_table("users").is_none());
        assert!(schema.get_table_including_removed("users").is_some());
        assert_eq!(
            schema
                .get_table_including_removed("users")
                .unwrap()
                .physical_name(),
            "_pgroll_del_users"
        );
    }

    #[test]
    fn unremove_table_restores_visibility() {
        let mut schema = schema_with_users();
        schema.remove_table("users").unwrap();
        schema.unremove_table("users").unwrap();
        assert!(schema.get_table("users").is_some());
        assert_eq!(schema.get_table("users").unwrap().physical_name(), "users");
    }

    #[test]
    fn drop_then_create_same_name_in_one_migration() {
        let mut schema = schema_with_users();
        schema.remove_table("users").unwrap();
        // A later operation in the same migration creates a new `users`.
        schema.add_table(Table::new("users")).unwrap();
        assert!(schema.get_table("users").is_some());
        assert_eq!(schema.get_table("users").unwrap().columns.len(), 0);
    }

    #[test]
    fn index_names_are_unique_schema_wide() {
        let mut schema = schema_with_users();
        schema.register_index("idx_users_email", "users");
        assert!(schema.index_exists("idx_users_email"));
        assert_eq!(schema.table_for_index("idx_users_email"), Some("users"));
    }

    #[test]
    fn column_duplication_round_trip() {
        let mut col = Column::new("age", "integer", true);
        assert_eq!(col.physical_name(), "age");
        col.mark_duplicated();
        assert!(col.is_duplicated());
        assert_eq!(col.physical_name(), "_pgroll_new_age");
        col.clear_duplicated();
        assert_eq!(col.physical_name(), "age");
    }

    #[test]
    fn purge_column_cascades_check_constraint() {
        let mut table = Table::new("orders");
        table.add_column(Column::new("amount", "integer", false)).unwrap();
        table.check_constraints.insert(
            "chk_positive".to_string(),
            CheckConstraint {
                name: "chk_positive".to_string(),
                expression: "(amount > 0)".to_string(),
                not_valid: false,
            },
        );
        table.purge_column("amount");
        assert!(table.check_constraints.is_empty());
    }

    #[test]
    fn remove_column_then_unremove_restores_it() {
        let mut table = Table::new("orders");
        table.add_column(Column::new("amount", "integer", false)).unwrap();
        table.remove_column("amount").unwrap();
        assert!(table.get_column("amount").is_none());
        table.unremove_column("amount").unwrap();
        assert!(table.get_column("amount").is_some());
    }

    #[test]
    fn deletion_and_duplication_prefixes_distinct() {
        assert_ne!(DELETION_PREFIX, DUPLICATION_PREFIX);
    }
}
