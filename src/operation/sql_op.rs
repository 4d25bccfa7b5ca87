use serde::Deserialize;

use crate::dbaction::BoxedAction;
use crate::dbaction::raw::RawSqlAction;
use crate::error::ValidateError;
use crate::operation::{Operation, StartOutput};
use crate::schema::Schema;

/// User-supplied raw SQL, run verbatim either side of the phase boundary.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sql {
    pub up: String,
    #[serde(default)]
    pub down: Option<String>,
    #[serde(default)]
    pub on_complete: bool,
}

impl Sql {
    fn check_parses(sql: &str) -> Result<(), ValidateError> {
        pg_query::parse(sql).map_err(|e| ValidateError::FieldRequired {
            name: format!("sql does not parse: {e}"),
        })?;
        Ok(())
    }
}

impl Operation for Sql {
    fn name(&self) -> &str {
        "sql"
    }

    fn validate(&self, _schema: &mut Schema) -> Result<(), ValidateError> {
        Self::check_parses(&self.up)?;
        if let Some(down) = &self.down {
            Self::check_parses(down)?;
        }
        Ok(())
    }

    fn start(&self, _schema: &mut Schema) -> Result<StartOutput, ValidateError> {
        if self.on_complete {
            return Ok(StartOutput::new());
        }
        Ok(StartOutput::with_actions(vec![Box::new(RawSqlAction {
            id: format!("sql_up_{:x}", fingerprint(&self.up)),
            sql: self.up.clone(),
        })]))
    }

    fn complete(&self, _schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        if !self.on_complete {
            return Ok(vec![]);
        }
        Ok(vec![Box::new(RawSqlAction {
            id: format!("sql_up_{:x}", fingerprint(&self.up)),
            sql: self.up.clone(),
        })])
    }

    fn rollback(&self, _schema: &mut Schema) -> Result<Vec<BoxedAction>, ValidateError> {
        if self.on_complete {
            return Ok(vec![]);
        }
        let Some(down) = &self.down else {
            return Ok(vec![]);
        };
        Ok(vec![Box::new(RawSqlAction {
            id: format!("sql_down_{:x}", fingerprint(down)),
            sql: down.clone(),
        })])
    }
}

/// A small, deterministic, non-cryptographic fingerprint of a SQL string,
/// used only to keep a `RawSqlAction`'s ID stable and collision-resistant
/// enough for Coordinator dedup across a single migration document.
pub(crate) fn fingerprint(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}
