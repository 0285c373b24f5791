//! Multi-family write requests.

use super::{Item, RuleEntry, RuleType};
use serde_json::Value;
use std::collections::BTreeMap;

/// A set of writes applied in one transaction.
///
/// - `items`: updated in place by id; items without an id are ignored
/// - `rules`: each listed type is replaced wholesale
/// - `meta`: upserted key by key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchUpdate {
    /// Items to update.
    pub items: Vec<Item>,
    /// Rule lists to replace, per type.
    pub rules: BTreeMap<RuleType, Vec<RuleEntry>>,
    /// Metadata to upsert.
    pub meta: BTreeMap<String, Value>,
}

impl BatchUpdate {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds items to update.
    #[must_use]
    pub fn with_items(mut self, items: Vec<Item>) -> Self {
        self.items.extend(items);
        self
    }

    /// Replaces the list for one rule type.
    #[must_use]
    pub fn with_rules(mut self, rule_type: RuleType, rules: Vec<RuleEntry>) -> Self {
        self.rules.insert(rule_type, rules);
        self
    }

    /// Upserts one metadata key.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Whether the batch writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.rules.is_empty() && self.meta.is_empty()
    }
}
