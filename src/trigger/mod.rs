//! PL/pgSQL trigger generation (C3).
//!
//! Bridges old and new schema projections during the dual-schema window:
//! every write against either projection is mirrored into the other so both
//! remain readable. See `spec.md` §4.3.

use crate::schema::NEEDS_BACKFILL_COLUMN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Fires on writes through the *old* schema projection.
    Up,
    /// Fires on writes through the *new* schema projection.
    Down,
}

/// A column declaration inside the trigger function's `DECLARE` block, so
/// user SQL can reference logical column names even when the physical name
/// currently differs (duplication in flight).
#[derive(Debug, Clone)]
pub struct ColumnDecl {
    pub logical: String,
    pub physical: String,
}

#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub name: String,
    pub direction: Direction,
    pub schema: String,
    pub latest_schema: String,
    pub table: String,
    /// Every column of the target table, for the `%TYPE` declarations.
    pub columns: Vec<ColumnDecl>,
    /// The physical column this trigger writes into: the shadow column for
    /// Up, the original column for Down.
    pub target_column: String,
    /// User-supplied SQL expression computing the value to assign.
    pub expression: String,
}

impl TriggerConfig {
    /// Renders the full `CREATE OR REPLACE FUNCTION` + `DROP TRIGGER IF
    /// EXISTS` + `CREATE TRIGGER` statement sequence.
    pub fn build(&self) -> String {
        let mut decls = String::new();
        for col in &self.columns {
            decls.push_str(&format!(
                "  {col} {schema}.{table}.{physical}%TYPE := NEW.{col};\n",
                col = col.logical,
                schema = self.schema,
                table = self.table,
                physical = col.physical,
            ));
        }

        let condition = match self.direction {
            Direction::Up => format!("current_setting('search_path') != '{}'", self.latest_schema),
            Direction::Down => format!("current_setting('search_path') = '{}'", self.latest_schema),
        };

        let expr = parenthesize(&self.expression);

        format!(
            "CREATE OR REPLACE FUNCTION {schema}.{name}()\n\
             RETURNS TRIGGER AS $$\n\
             DECLARE\n\
             {decls}\
             BEGIN\n\
             \u{20}\u{20}IF ({condition}) THEN\n\
             \u{20}\u{20}\u{20}\u{20}NEW.{target} := {expr};\n\
             \u{20}\u{20}\u{20}\u{20}NEW.{needs_backfill} := false;\n\
             \u{20}\u{20}END IF;\n\
             \u{20}\u{20}RETURN NEW;\n\
             END;\n\
             $$ LANGUAGE plpgsql;\n\
             \n\
             DROP TRIGGER IF EXISTS {name} ON {schema}.{table};\n\
             CREATE TRIGGER {name}\n\
             \u{20}\u{20}BEFORE UPDATE OR INSERT ON {schema}.{table}\n\
             \u{20}\u{20}FOR EACH ROW\n\
             \u{20}\u{20}EXECUTE PROCEDURE {schema}.{name}();\n",
            schema = self.schema,
            name = self.name,
            table = self.table,
            target = self.target_column,
            needs_backfill = NEEDS_BACKFILL_COLUMN,
        )
    }

    /// The DBAction ID that installs this trigger function, `<schema>.<name>`
    /// dropped via cascade at Complete/Rollback.
    pub fn drop_function_sql(&self) -> String {
        format!(
            "DROP FUNCTION IF EXISTS {}.{} CASCADE;",
            self.schema, self.name
        )
    }
}

/// Wraps `expr` in parentheses unless it is already a single balanced
/// parenthesized group. A naive `starts_with('(') && ends_with(')')` check
/// is not enough — `(a) + (b)` starts and ends with a paren but is not
/// itself parenthesized as a whole.
pub fn parenthesize(expr: &str) -> String {
    let trimmed = expr.trim();
    if is_fully_parenthesized(trimmed) {
        trimmed.to_string()
    } else {
        format!("({trimmed})")
    }
}

fn is_fully_parenthesized(expr: &str) -> bool {
    if !expr.starts_with('(') || !expr.ends_with(')') {
        return false;
    }
    let mut depth = 0i32;
    for (i, c) in expr.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                // If depth returns to zero before the last character, the
                // opening paren at position 0 doesn't span the whole string.
                if depth == 0 && i != expr.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(direction: Direction) -> TriggerConfig {
        TriggerConfig {
            name: "_pgroll_trigger_users_age".to_string(),
            direction,
            schema: "public".to_string(),
            latest_schema: "public_002_change_age_type".to_string(),
            table: "users".to_string(),
            columns: vec![
                ColumnDecl {
                    logical: "id".to_string(),
                    physical: "id".to_string(),
                },
                ColumnDecl {
                    logical: "age".to_string(),
                    physical: "age".to_string(),
                },
            ],
            target_column: "_pgroll_new_age".to_string(),
            expression: "age::text".to_string(),
        }
    }

    #[test]
    fn up_trigger_condition_checks_search_path_not_latest() {
        let sql = config(Direction::Up).build();
        assert!(sql.contains("current_setting('search_path') != 'public_002_change_age_type'"));
        assert!(sql.contains("NEW._pgroll_new_age := (age::text);"));
    }

    #[test]
    fn down_trigger_condition_checks_search_path_equals_latest() {
        let sql = config(Direction::Down).build();
        assert!(sql.contains("current_setting('search_path') = 'public_002_change_age_type'"));
    }

    #[test]
    fn declares_one_variable_per_column() {
        let sql = config(Direction::Up).build();
        assert!(sql.contains("id public.users.id%TYPE := NEW.id;"));
        assert!(sql.contains("age public.users.age%TYPE := NEW.age;"));
    }

    #[test]
    fn clears_needs_backfill_flag() {
        let sql = config(Direction::Up).build();
        assert!(sql.contains("NEW._pgroll_needs_backfill := false;"));
    }

    #[test]
    fn trigger_is_before_update_or_insert_for_each_row() {
        let sql = config(Direction::Up).build();
        assert!(sql.contains("BEFORE UPDATE OR INSERT ON public.users"));
        assert!(sql.contains("FOR EACH ROW"));
    }

    #[test]
    fn parenthesize_leaves_already_parenthesized_expression_alone() {
        assert_eq!(parenthesize("(age + 1)"), "(age + 1)");
    }

    #[test]
    fn parenthesize_wraps_bare_identifier() {
        assert_eq!(parenthesize("age"), "(age)");
    }

    #[test]
    fn parenthesize_wraps_expression_with_outer_unbalanced_parens() {
        // `(a) + (b)` has balanced parens overall but isn't a single group.
        assert_eq!(parenthesize("(a) + (b)"), "((a) + (b))");
    }
}
