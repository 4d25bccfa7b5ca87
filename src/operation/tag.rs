use strum_macros::{EnumIter, EnumString, IntoStaticStr};

/// Wire-form tag for an operation's single key, e.g. `{"create_table": {...}}`.
///
/// A flat enum covering every recognized tag (`spec.md` §4.4's table).
/// Used only for the registry lookup during decode — the actual payload is
/// decoded into the concrete operation struct, not into this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum OperationTag {
    CreateTable,
    RenameTable,
    DropTable,
    AddColumn,
    DropColumn,
    RenameColumn,
    AlterColumn,
    ChangeType,
    SetNotNull,
    DropNotNull,
    SetUnique,
    SetDefault,
    SetForeignKey,
    SetCheckConstraint,
    CreateIndex,
    DropIndex,
    CreateConstraint,
    DropConstraint,
    DropMulticolumnConstraint,
    RenameConstraint,
    SetReplicaIdentity,
    Sql,
}

impl OperationTag {
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }

    /// A one-line summary of the tag's effect, for `--explain`.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::CreateTable => "new table + columns + table-level constraints",
            Self::RenameTable => "pure metadata rename; RENAME at Complete",
            Self::DropTable => "soft-delete at Start, purge at Complete, restore at Rollback",
            Self::AddColumn => {
                "add physical column; Up expression installs an Up trigger and requests backfill"
            }
            Self::DropColumn => {
                "Down installs a Down trigger and soft-removes the column at Start; dropped at Complete"
            }
            Self::RenameColumn => "model-only rename at Start; physical RENAME at Complete",
            Self::AlterColumn => {
                "compound type/nullability/default/unique/check/reference change via the duplication strategy"
            }
            Self::ChangeType => "sub-operation of alter_column: change a column's type",
            Self::SetNotNull => "sub-operation of alter_column: add a NOT NULL constraint",
            Self::DropNotNull => "sub-operation of alter_column: drop a NOT NULL constraint",
            Self::SetUnique => "sub-operation of alter_column: add a single-column UNIQUE constraint",
            Self::SetDefault => "sub-operation of alter_column: change a column's default",
            Self::SetForeignKey => "sub-operation of alter_column: add a foreign key",
            Self::SetCheckConstraint => "sub-operation of alter_column: add a CHECK constraint",
            Self::CreateIndex => {
                "CreateIndexConcurrently at Start; no-op at Complete; DropIndex at Rollback"
            }
            Self::DropIndex => "no-op at Start; DropIndex at Complete; no-op at Rollback",
            Self::CreateConstraint => {
                "multi-column unique or check constraint via the duplication strategy"
            }
            Self::DropConstraint | Self::DropMulticolumnConstraint => {
                "duplication strategy rebuilds affected columns without the named constraint"
            }
            Self::RenameConstraint => "metadata rename at Complete",
            Self::SetReplicaIdentity => {
                "ALTER TABLE ... REPLICA IDENTITY {NOTHING|DEFAULT|FULL|INDEX name} at Start"
            }
            Self::Sql => {
                "user-supplied raw SQL: Up at Start (or Complete if on_complete), Down at Rollback"
            }
        }
    }
}
