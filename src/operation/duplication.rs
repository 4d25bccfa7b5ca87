//! The duplication strategy: the one algorithm shared by every alter-family
//! operation (`change_type`, `set_not_null`, `drop_not_null`, `set_unique`,
//! `set_default`, `set_foreign_key`, `set_check_constraint`, and the
//! compound `alter_column`). See `spec.md` §4.4's "central algorithm".
//!
//! Written once here and called from each operation's Start/Complete/
//! Rollback, the way the teacher shares `alter_table_check.rs` across
//! several `pgmNNN` rule modules instead of duplicating the check.

use std::cell::RefCell;

use crate::dbaction::BoxedAction;
use crate::dbaction::column::{DropColumnAction, RenameDuplicatedColumnAction, RenamedConstraint, RenamedIndex};
use crate::dbaction::constraint::{CreateCheckConstraintAction, CreateFkConstraintAction};
use crate::dbaction::function::DropFunctionAction;
use crate::dbaction::index::CreateUniqueIndexConcurrentlyAction;
use crate::dbaction::trigger::CreateTriggerAction;
use crate::error::ValidateError;
use crate::interfaces::BackfillTask;
use crate::operation::StartOutput;
use crate::schema::{Column, NEEDS_BACKFILL_COLUMN, Schema};
use crate::trigger::{ColumnDecl, Direction, TriggerConfig};

/// A single-column constraint the alter-family operations ask the
/// duplication strategy to build against the shadow column at Start and
/// promote to its canonical name at Complete, the same `NOT VALID`-then-
/// `VALIDATE` and unique-index-then-promote techniques `not_null` already
/// uses for nullability. See `spec.md` §4.4 (`set_unique`,
/// `set_foreign_key`, `set_check_constraint`).
#[derive(Debug, Clone)]
pub enum PendingConstraint {
    Unique,
    Check { expression: String },
    ForeignKey { ref_table: String, ref_columns: Vec<String> },
}

/// The target shape a duplication moves a column towards. Any field left
/// `None` keeps the column's current value.
#[derive(Debug, Clone, Default)]
pub struct TargetShape {
    pub type_name: Option<String>,
    pub nullable: Option<bool>,
    pub default: Option<Option<String>>,
}

/// Snapshot of a column's pre-duplication state, cached across Start so
/// Rollback can restore it without re-deriving it from the operation's own
/// fields. Populated by [`start`], consumed by [`rollback`].
#[derive(Debug, Clone)]
struct Captured {
    type_name: String,
    nullable: bool,
    default: Option<String>,
}

#[derive(Debug, Default)]
pub struct DuplicationState(RefCell<Option<Captured>>);

impl DuplicationState {
    pub fn new() -> Self {
        Self(RefCell::new(None))
    }
}

pub struct DuplicationSpec<'a> {
    pub schema_name: String,
    pub latest_schema: String,
    pub table: String,
    pub column: String,
    pub target: TargetShape,
    pub up: String,
    pub down: Option<String>,
    pub trigger_prefix: String,
    /// Constraints to build against the shadow column at Start and promote
    /// to their canonical name at Complete.
    pub constraints: Vec<PendingConstraint>,
    pub state: &'a DuplicationState,
}

fn trigger_function_names(spec: &DuplicationSpec) -> (String, String) {
    (
        format!("{}_up", spec.trigger_prefix),
        format!("{}_down", spec.trigger_prefix),
    )
}

fn constraint_base(spec: &DuplicationSpec) -> String {
    format!("{}_{}", spec.table, spec.column)
}

/// The duplication-prefixed name a shadow constraint/index is built under
/// at Start, before it has earned its canonical name.
fn duplicated_constraint_name(spec: &DuplicationSpec, suffix: &str) -> String {
    format!("{}{}_{suffix}", crate::schema::DUPLICATION_PREFIX, constraint_base(spec))
}

fn canonical_constraint_name(spec: &DuplicationSpec, suffix: &str) -> String {
    format!("{}_{suffix}", constraint_base(spec))
}

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

/// Start: adds the shadow column at the target shape, installs Up/Down
/// triggers, requests a backfill sweep.
pub fn start(schema: &mut Schema, spec: &DuplicationSpec) -> Result<StartOutput, ValidateError> {
    let table = schema
        .get_table_mut(&spec.table)
        .ok_or_else(|| ValidateError::TableDoesNotExist {
            name: spec.table.clone(),
        })?;
    let column = table.get_column_mut(&spec.column).ok_or_else(|| ValidateError::ColumnDoesNotExist {
        table: spec.table.clone(),
        name: spec.column.clone(),
    })?;

    *spec.state.0.borrow_mut() = Some(Captured {
        type_name: column.type_name.clone(),
        nullable: column.nullable,
        default: column.default.clone(),
    });

    column.mark_duplicated();
    if let Some(t) = &spec.target.type_name {
        column.type_name = t.clone();
    }
    if let Some(n) = spec.target.nullable {
        column.nullable = n;
    }
    if let Some(d) = &spec.target.default {
        column.default = d.clone();
    }
    let shadow_name = column.physical_name();
    let target_type = column.type_name.clone();
    // The shadow column is always added nullable: Postgres rejects
    // `ADD COLUMN ... NOT NULL` outright against a non-empty table. A
    // `NOT NULL` target instead goes through the same `NOT VALID`-check-
    // then-promote path as every other shadow constraint, below.
    let default_clause = column
        .default
        .as_ref()
        .map(|d| format!(" DEFAULT {d}"))
        .unwrap_or_default();

    let add_shadow_sql = format!(
        "ALTER TABLE {}.{} ADD COLUMN {} {}{};",
        spec.schema_name, spec.table, shadow_name, target_type, default_clause
    );
    let add_shadow: BoxedAction = Box::new(crate::dbaction::column::AddColumnAction {
        schema: spec.schema_name.clone(),
        table: spec.table.clone(),
        column: shadow_name.clone(),
        sql: add_shadow_sql,
    });

    let (up_fn, down_fn) = trigger_function_names(spec);
    let decls = column_decls(schema, &spec.table);

    let mut actions: Vec<BoxedAction> = vec![add_shadow];

    if spec.target.nullable == Some(false) {
        let name = duplicated_constraint_name(spec, "not_null");
        actions.push(Box::new(CreateCheckConstraintAction {
            schema: spec.schema_name.clone(),
            table: spec.table.clone(),
            name,
            expression: format!("{shadow_name} IS NOT NULL"),
            not_valid: true,
        }));
    }

    for pending in &spec.constraints {
        match pending {
            PendingConstraint::Unique => {
                let name = duplicated_constraint_name(spec, "key");
                let create_sql = format!(
                    "CREATE UNIQUE INDEX CONCURRENTLY {} ON {}.{} ({});",
                    name, spec.schema_name, spec.table, shadow_name
                );
                actions.push(Box::new(CreateUniqueIndexConcurrentlyAction {
                    schema: spec.schema_name.clone(),
                    table: spec.table.clone(),
                    name,
                    create_sql,
                }));
            }
            PendingConstraint::Check { expression } => {
                actions.push(Box::new(CreateCheckConstraintAction {
                    schema: spec.schema_name.clone(),
                    table: spec.table.clone(),
                    name: duplicated_constraint_name(spec, "check"),
                    expression: expression.clone(),
                    not_valid: true,
                }));
            }
            PendingConstraint::ForeignKey { ref_table, ref_columns } => {
                actions.push(Box::new(CreateFkConstraintAction {
                    schema: spec.schema_name.clone(),
                    table: spec.table.clone(),
                    name: duplicated_constraint_name(spec, "fkey"),
                    columns: vec![shadow_name.clone()],
                    ref_table: ref_table.clone(),
                    ref_columns: ref_columns.clone(),
                    not_valid: true,
                }));
            }
        }
    }

    let up_config = TriggerConfig {
        name: up_fn,
        direction: Direction::Up,
        schema: spec.schema_name.clone(),
        latest_schema: spec.latest_schema.clone(),
        table: spec.table.clone(),
        columns: decls.clone(),
        target_column: shadow_name,
        expression: spec.up.clone(),
    };
    actions.push(Box::new(CreateTriggerAction {
        table: spec.table.clone(),
        config: up_config,
    }));

    if let Some(down_expr) = &spec.down {
        let down_config = TriggerConfig {
            name: down_fn,
            direction: Direction::Down,
            schema: spec.schema_name.clone(),
            latest_schema: spec.latest_schema.clone(),
            table: spec.table.clone(),
            columns: decls,
            target_column: spec.column.clone(),
            expression: down_expr.clone(),
        };
        actions.push(Box::new(CreateTriggerAction {
            table: spec.table.clone(),
            config: down_config,
        }));
    }

    Ok(StartOutput {
        actions,
        backfill: Some(BackfillTask {
            table: spec.table.clone(),
            columns: vec![spec.column.clone()],
        }),
    })
}

/// Complete: drops the trigger functions and the original column, then
/// canonicalizes the shadow column via `RenameDuplicatedColumn`.
pub fn complete(schema: &mut Schema, spec: &DuplicationSpec) -> Result<Vec<BoxedAction>, ValidateError> {
    let (up_fn, down_fn) = trigger_function_names(spec);
    let mut functions = vec![up_fn];
    if spec.down.is_some() {
        functions.push(down_fn);
    }

    let mut actions: Vec<BoxedAction> = vec![Box::new(DropFunctionAction {
        schema: spec.schema_name.clone(),
        functions,
    })];

    actions.push(Box::new(DropColumnAction {
        schema: spec.schema_name.clone(),
        table: spec.table.clone(),
        columns: vec![spec.column.clone()],
    }));

    let mut check_constraints = Vec::new();
    let mut foreign_keys = Vec::new();
    let mut indexes = Vec::new();

    if spec.target.nullable == Some(false) {
        let name = duplicated_constraint_name(spec, "not_null");
        check_constraints.push(RenamedConstraint {
            from: name.clone(),
            to: name,
            promote_to_not_null: true,
        });
    }

    for pending in &spec.constraints {
        match pending {
            PendingConstraint::Unique => {
                let from = duplicated_constraint_name(spec, "key");
                let to = canonical_constraint_name(spec, "key");
                indexes.push(RenamedIndex {
                    from,
                    to: to.clone(),
                    promote_to_unique_constraint: Some(to),
                });
            }
            PendingConstraint::Check { .. } => {
                check_constraints.push(RenamedConstraint {
                    from: duplicated_constraint_name(spec, "check"),
                    to: canonical_constraint_name(spec, "check"),
                    promote_to_not_null: false,
                });
            }
            PendingConstraint::ForeignKey { .. } => {
                foreign_keys.push(RenamedConstraint {
                    from: duplicated_constraint_name(spec, "fkey"),
                    to: canonical_constraint_name(spec, "fkey"),
                    promote_to_not_null: false,
                });
            }
        }
    }

    actions.push(Box::new(RenameDuplicatedColumnAction {
        schema: spec.schema_name.clone(),
        table: spec.table.clone(),
        column: spec.column.clone(),
        foreign_keys,
        check_constraints,
        indexes,
    }));

    actions.push(Box::new(DropColumnAction {
        schema: spec.schema_name.clone(),
        table: spec.table.clone(),
        columns: vec![NEEDS_BACKFILL_COLUMN.to_string()],
    }));

    if let Some(table) = schema.get_table_mut(&spec.table)
        && let Some(column) = table.get_column_mut(&spec.column)
    {
        column.clear_duplicated();
    }
    *spec.state.0.borrow_mut() = None;

    Ok(actions)
}

/// Rollback: drops the shadow column and trigger functions, restores the
/// column's pre-Start shape in the schema model.
pub fn rollback(schema: &mut Schema, spec: &DuplicationSpec) -> Result<Vec<BoxedAction>, ValidateError> {
    let shadow_name = crate::schema::duplicated_name(&spec.column);
    let (up_fn, down_fn) = trigger_function_names(spec);
    let mut functions = vec![up_fn];
    if spec.down.is_some() {
        functions.push(down_fn);
    }

    let actions: Vec<BoxedAction> = vec![
        Box::new(DropColumnAction {
            schema: spec.schema_name.clone(),
            table: spec.table.clone(),
            columns: vec![shadow_name],
        }),
        Box::new(DropFunctionAction {
            schema: spec.schema_name.clone(),
            functions,
        }),
        Box::new(DropColumnAction {
            schema: spec.schema_name.clone(),
            table: spec.table.clone(),
            columns: vec![NEEDS_BACKFILL_COLUMN.to_string()],
        }),
    ];

    let captured = spec.state.0.borrow_mut().take();
    if let Some(captured) = captured
        && let Some(table) = schema.get_table_mut(&spec.table)
        && let Some(column) = table.get_column_mut(&spec.column)
    {
        column.clear_duplicated();
        column.type_name = captured.type_name;
        column.nullable = captured.nullable;
        column.default = captured.default;
    }

    Ok(actions)
}

/// The identity expression, safe as a default `Up` only when the shadow
/// column's type is assignment-compatible with the original (`spec.md`
/// §9's design note).
pub fn identity_expression(column: &Column) -> String {
    column.name.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Table;

    fn table_with_age() -> Schema {
        let mut schema = Schema::new("public");
        let mut table = Table::new("users");
        table.add_column(Column::new("id", "integer", false)).unwrap();
        table.add_column(Column::new("age", "integer", true)).unwrap();
        schema.add_table(table).unwrap();
        schema
    }

    fn spec(state: &DuplicationState) -> DuplicationSpec<'_> {
        DuplicationSpec {
            schema_name: "public".to_string(),
            latest_schema: "public_002_change_age_type".to_string(),
            table: "users".to_string(),
            column: "age".to_string(),
            target: TargetShape {
                type_name: Some("text".to_string()),
                nullable: None,
                default: None,
            },
            up: "age::text".to_string(),
            down: Some("age::integer".to_string()),
            trigger_prefix: "_pgroll_trigger_users_age".to_string(),
            constraints: vec![],
            state,
        }
    }

    #[test]
    fn start_marks_column_duplicated_with_target_type() {
        let mut schema = table_with_age();
        let state = DuplicationState::new();
        let result = start(&mut schema, &spec(&state)).unwrap();
        assert_eq!(result.actions.len(), 3); // add shadow, up trigger, down trigger
        assert!(result.backfill.is_some());

        let col = schema.get_table("users").unwrap().get_column("age").unwrap();
        assert!(col.is_duplicated());
        assert_eq!(col.type_name, "text");
        assert_eq!(col.physical_name(), "_pgroll_new_age");
    }

    #[test]
    fn rollback_restores_original_type_and_clears_duplication() {
        let mut schema = table_with_age();
        let state = DuplicationState::new();
        start(&mut schema, &spec(&state)).unwrap();
        rollback(&mut schema, &spec(&state)).unwrap();

        let col = schema.get_table("users").unwrap().get_column("age").unwrap();
        assert!(!col.is_duplicated());
        assert_eq!(col.type_name, "integer");
        assert_eq!(col.physical_name(), "age");
    }

    #[test]
    fn complete_clears_duplication_marker() {
        let mut schema = table_with_age();
        let state = DuplicationState::new();
        start(&mut schema, &spec(&state)).unwrap();
        complete(&mut schema, &spec(&state)).unwrap();

        let col = schema.get_table("users").unwrap().get_column("age").unwrap();
        assert!(!col.is_duplicated());
        assert_eq!(col.type_name, "text");
    }

    fn not_null_spec(state: &DuplicationState) -> DuplicationSpec<'_> {
        DuplicationSpec {
            schema_name: "public".to_string(),
            latest_schema: "public_latest".to_string(),
            table: "users".to_string(),
            column: "age".to_string(),
            target: TargetShape {
                type_name: None,
                nullable: Some(false),
                default: None,
            },
            up: "age".to_string(),
            down: None,
            trigger_prefix: "_pgroll_trigger_users_age".to_string(),
            constraints: vec![],
            state,
        }
    }

    #[test]
    fn start_with_not_null_target_adds_shadow_nullable_and_a_not_valid_check() {
        let mut schema = table_with_age();
        let state = DuplicationState::new();
        let result = start(&mut schema, &not_null_spec(&state)).unwrap();

        let add_shadow = &result.actions[0];
        assert!(
            !add_shadow.id().contains("check"),
            "first action should be the ADD COLUMN, not a constraint"
        );

        let has_not_valid_check = result
            .actions
            .iter()
            .any(|a| a.id().contains("create_check_constraint"));
        assert!(
            has_not_valid_check,
            "a NOT NULL target should build a NOT VALID CHECK against the shadow column, \
             never embed NOT NULL directly in ADD COLUMN"
        );
    }

    #[test]
    fn complete_with_not_null_target_promotes_the_check_to_set_not_null() {
        let mut schema = table_with_age();
        let state = DuplicationState::new();
        start(&mut schema, &not_null_spec(&state)).unwrap();
        let actions = complete(&mut schema, &not_null_spec(&state)).unwrap();

        assert!(
            actions.iter().any(|a| a.id().starts_with("rename_duplicated_")),
            "promotion travels through the composite rename action"
        );
    }

    #[test]
    fn start_with_unique_constraint_builds_a_concurrent_unique_index() {
        let mut schema = table_with_age();
        let state = DuplicationState::new();
        let mut s = spec(&state);
        s.constraints = vec![PendingConstraint::Unique];
        let result = start(&mut schema, &s).unwrap();
        assert!(
            result
                .actions
                .iter()
                .any(|a| a.id().contains("create_unique_index_concurrently")),
            "set_unique must never issue a blocking ADD CONSTRAINT ... UNIQUE directly"
        );
    }
}
