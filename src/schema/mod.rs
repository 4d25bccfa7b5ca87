//! In-memory schema model (C1).
//!
//! A [`Schema`] is the engine's working copy of the managed namespace. It is
//! mutated by `Validate`/`Start`/`Complete`/`Rollback` on each operation and
//! never touches the database itself — see `src/dbaction` and
//! `src/operation` for the pieces that do.

pub mod types;

pub use types::*;

/// Shadow-column / temporary-duplicate prefix. Reserved — see module docs on
/// [`Table::physical_name`].
pub const DUPLICATION_PREFIX: &str = "_pgroll_new_";

/// Soft-deleted table prefix.
pub const DELETION_PREFIX: &str = "_pgroll_del_";

/// Scratch column used by the backfill collaborator to track rows still
/// needing a sweep.
pub const NEEDS_BACKFILL_COLUMN: &str = "_pgroll_needs_backfill";

/// Prefixes a logical name with the shadow-column marker.
pub fn duplicated_name(name: &str) -> String {
    format!("{DUPLICATION_PREFIX}{name}")
}

/// Prefixes a logical name with the soft-delete marker.
pub fn deleted_name(name: &str) -> String {
    format!("{DELETION_PREFIX}{name}")
}

/// Strips a duplication or deletion prefix, if present.
pub fn strip_duplication_prefix(name: &str) -> &str {
    name.strip_prefix(DUPLICATION_PREFIX)
        .or_else(|| name.strip_prefix(DELETION_PREFIX))
        .unwrap_or(name)
}

/// Postgres identifiers are limited to 63 bytes (`NAMEDATALEN - 1`).
pub const MAX_IDENTIFIER_LEN: usize = 63;

pub fn validate_identifier_length(name: &str) -> Result<(), crate::error::ValidateError> {
    if name.len() > MAX_IDENTIFIER_LEN {
        Err(crate::error::ValidateError::IdentifierTooLong {
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicated_name_adds_prefix() {
        assert_eq!(duplicated_name("age"), "_pgroll_new_age");
    }

    #[test]
    fn deleted_name_adds_prefix() {
        assert_eq!(deleted_name("users"), "_pgroll_del_users");
    }

    #[test]
    fn strip_duplication_prefix_strips_either_marker() {
        assert_eq!(strip_duplication_prefix("_pgroll_new_age"), "age");
        assert_eq!(strip_duplication_prefix("_pgroll_del_users"), "users");
        assert_eq!(strip_duplication_prefix("age"), "age");
    }

    #[test]
    fn validate_identifier_length_accepts_63_bytes() {
        let name = "a".repeat(63);
        assert!(validate_identifier_length(&name).is_ok());
    }

    #[test]
    fn validate_identifier_length_rejects_64_bytes() {
        let name = "a".repeat(64);
        assert!(validate_identifier_length(&name).is_err());
    }
}
