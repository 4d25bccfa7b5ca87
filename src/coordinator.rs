//! Coordinator (C5): orders and deduplicates DBActions within a phase.
//!
//! See `spec.md` §4.5. The dedup rule is intentionally simple and is the
//! one piece of this crate with no corpus precedent — implemented directly
//! from the spec's three-step description and pinned by the fixtures in
//! `spec.md` §8.A.

use std::collections::HashMap;

use crate::dbaction::BoxedAction;
use crate::error::ActionError;
use crate::interfaces::Connection;

pub struct Coordinator {
    actions: HashMap<String, BoxedAction>,
    order: Vec<String>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Builds a coordinator from an ordered sequence of actions, applying
    /// the dedup/deferral rule as each is scanned.
    pub fn from_actions(actions: Vec<BoxedAction>) -> Self {
        let mut coordinator = Self::new();
        for action in actions {
            coordinator.push(action);
        }
        coordinator
    }

    /// Scans one more action into the coordinator:
    /// - unseen ID: appended to both the action map and `order`.
    /// - seen ID: moved to the end of `order` unless it is already last.
    pub fn push(&mut self, action: BoxedAction) {
        let id = action.id();
        if self.actions.contains_key(&id) {
            if self.order.last() != Some(&id) {
                self.order.retain(|existing| existing != &id);
                self.order.push(id.clone());
            }
        } else {
            self.order.push(id.clone());
        }
        // Later pushes with the same ID replace the stored action — the
        // contract requires equal IDs to be semantically interchangeable,
        // so this never changes behavior, only which instance is kept.
        self.actions.insert(id, action);
    }

    /// The resolved execution order, for tests and logging.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Executes every distinct action exactly once, in `order`. Returns the
    /// first error, wrapped with its action's ID (the actions already embed
    /// their own ID in errors they raise).
    pub async fn execute(&self, conn: &mut dyn Connection) -> Result<(), ActionError> {
        for id in &self.order {
            let action = self
                .actions
                .get(id)
                .expect("order and actions are kept in sync by push()");
            tracing::debug!(action_id = %id, "executing db action");
            action.execute(conn).await?;
        }
        Ok(())
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    use crate::dbaction::DbAction;

    #[derive(Debug, Clone)]
    struct NamedAction {
        id: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl DbAction for NamedAction {
        fn id(&self) -> String {
            self.id.clone()
        }

        async fn execute(&self, _conn: &mut dyn Connection) -> Result<(), ActionError> {
            self.log.lock().unwrap().push(self.id.clone());
            Ok(())
        }
    }

    fn action(id: &str, log: &Arc<Mutex<Vec<String>>>) -> BoxedAction {
        Box::new(NamedAction {
            id: id.to_string(),
            log: log.clone(),
        })
    }

    fn ids_for(inputs: &[&str]) -> Vec<String> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut coordinator = Coordinator::new();
        for id in inputs {
            coordinator.push(action(id, &log));
        }
        coordinator.order().to_vec()
    }

    #[test]
    fn scenario_a_first_fixture() {
        // [rdc(c1), rdc(c2), rdc(c1)] -> [rdc(c2), rdc(c1)]
        let order = ids_for(&["rdc_c1", "rdc_c2", "rdc_c1"]);
        assert_eq!(order, vec!["rdc_c2", "rdc_c1"]);
    }

    #[test]
    fn scenario_a_second_fixture() {
        let order = ids_for(&[
            "dc_c1", "rdc_c1", "dc_c2", "rdc_c2", "dc_c3", "rdc_c3", "dc_c1", "rdc_c1", "dc_c2",
            "rdc_c2",
        ]);
        assert_eq!(
            order,
            vec!["dc_c3", "rdc_c3", "dc_c1", "rdc_c1", "dc_c2", "rdc_c2"]
        );
    }

    #[test]
    fn duplicate_already_last_is_unchanged() {
        let order = ids_for(&["a", "b", "b"]);
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn no_duplicates_preserves_first_occurrence_order() {
        let order = ids_for(&["a", "b", "c"]);
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn execute_runs_each_distinct_action_exactly_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut coordinator = Coordinator::new();
        coordinator.push(action("a", &log));
        coordinator.push(action("b", &log));
        coordinator.push(action("a", &log));

        struct NoopConnection;
        #[async_trait]
        impl Connection for NoopConnection {
            async fn execute(&mut self, _sql: &str) -> Result<u64, ActionError> {
                Ok(0)
            }
            async fn query_scalar_bool(&mut self, _sql: &str) -> Result<Option<bool>, ActionError> {
                Ok(None)
            }
            fn in_transaction(&self) -> bool {
                false
            }
            async fn begin(&mut self) -> Result<(), ActionError> {
                Ok(())
            }
            async fn commit(&mut self) -> Result<(), ActionError> {
                Ok(())
            }
            async fn rollback(&mut self) -> Result<(), ActionError> {
                Ok(())
            }
        }

        let mut conn = NoopConnection;
        coordinator.execute(&mut conn).await.unwrap();
        let log = log.lock().unwrap();
        assert_eq!(*log, vec!["a".to_string(), "b".to_string()]);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn every_id_appears_exactly_once_and_final_order_matches_last_occurrence(
            ids in prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "d"]), 0..30)
        ) {
            let order = ids_for(&ids);

            // Every distinct input ID appears in the output exactly once.
            let mut distinct: Vec<&str> = ids.clone();
            distinct.sort();
            distinct.dedup();
            let mut output_sorted = order.clone();
            output_sorted.sort();
            prop_assert_eq!(output_sorted, distinct);

            // The final order matches each ID's position among last-occurrences,
            // scanned in order of last occurrence.
            let mut last_seen: Vec<&str> = Vec::new();
            for id in &ids {
                last_seen.retain(|x| x != id);
                last_seen.push(id);
            }
            prop_assert_eq!(order, last_seen.into_iter().map(String::from).collect::<Vec<_>>());
        }
    }
}
