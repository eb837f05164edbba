use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

/// Stable identifiers for context names, kept for the process lifetime
#[derive(Debug, Default)]
pub struct ContextIds {
    ids: Mutex<HashMap<String, Uuid>>,
}

impl ContextIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier for a context, assigned on first use
    pub fn id_for(&self, context: &str) -> Uuid {
        *self
            .ids
            .lock()
            .entry(context.to_string())
            .or_insert_with(Uuid::new_v4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_stable_and_distinct() {
        let ids = ContextIds::new();
        let dev = ids.id_for("dev");
        assert_eq!(ids.id_for("dev"), dev);
        assert_ne!(ids.id_for("prod"), dev);
    }
}
