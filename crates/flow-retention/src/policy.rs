//! Pluggable retention policies.
//!
//! Time-, relevance-, and metadata-based policies are per-item predicates
//! and compose under `Composite`. Count-based retention needs a view of the
//! whole collection (to rank and keep the top N) so it implements `apply`
//! directly instead of going through `should_retain`; it is not composable
//! with the others via AND/OR.

use std::collections::HashMap;

use chrono::Utc;

use crate::item::RetainableItem;

/// A policy over items keyed by id. `should_retain` answers "keep this one
/// item?" in isolation; `apply` sweeps a collection and returns the number
/// of items removed. The default `apply` removes everything `should_retain`
/// rejects — sufficient for every policy except count-based ranking.
pub trait RetentionPolicy<I: RetainableItem>: Send + Sync {
    fn should_retain(&self, item: &I) -> bool;

    fn apply(&self, items: &mut HashMap<String, I>) -> usize {
        let to_remove: Vec<String> =
            items.iter().filter(|(_, item)| !self.should_retain(item)).map(|(id, _)| id.clone()).collect();
        for id in &to_remove {
            items.remove(id);
        }
        to_remove.len()
    }
}

/// Which timestamp a time-based policy measures age against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeField {
    CreatedAt,
    LastAccessedAt,
}

/// Removes items older than `max_age_ms`.
pub struct TimeBasedPolicy {
    pub max_age_ms: i64,
    pub field: AgeField,
}

impl<I: RetainableItem> RetentionPolicy<I> for TimeBasedPolicy {
    fn should_retain(&self, item: &I) -> bool {
        let at = match self.field {
            AgeField::CreatedAt => item.created_at(),
            AgeField::LastAccessedAt => item.last_accessed_at(),
        };
        (Utc::now() - at).num_milliseconds() <= self.max_age_ms
    }
}

/// Which order count-based retention sorts by before trimming to `max_items`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountOrder {
    Oldest,
    LeastAccessed,
}

/// Keeps at most `max_items`, evicting by `order`.
pub struct CountBasedPolicy {
    pub max_items: usize,
    pub order: CountOrder,
}

impl<I: RetainableItem> RetentionPolicy<I> for CountBasedPolicy {
    fn should_retain(&self, _item: &I) -> bool {
        true
    }

    fn apply(&self, items: &mut HashMap<String, I>) -> usize {
        if items.len() <= self.max_items {
            return 0;
        }
        let mut entries: Vec<(String, chrono::DateTime<Utc>)> =
            items.iter()
                 .map(|(id, item)| {
                     let key = match self.order {
                         CountOrder::Oldest => item.created_at(),
                         CountOrder::LeastAccessed => item.last_accessed_at(),
                     };
                     (id.clone(), key)
                 })
                 .collect();
        entries.sort_by_key(|(_, key)| *key);

        let excess = items.len() - self.max_items;
        let victims: Vec<String> = entries.into_iter().take(excess).map(|(id, _)| id).collect();
        for id in &victims {
            items.remove(id);
        }
        victims.len()
    }
}

/// Removes items whose relevance score falls below `threshold`. Items with
/// no relevance score are always retained (there is nothing to compare).
pub struct RelevanceBasedPolicy {
    pub threshold: f64,
}

impl<I: RetainableItem> RetentionPolicy<I> for RelevanceBasedPolicy {
    fn should_retain(&self, item: &I) -> bool {
        match item.relevance_score() {
            Some(score) => score >= self.threshold,
            None => true,
        }
    }
}

/// Retains items whose metadata matches every `(key, value)` criterion (or,
/// with `invert`, matches none of them).
pub struct MetadataBasedPolicy {
    pub criteria: HashMap<String, String>,
    pub invert: bool,
}

impl<I: RetainableItem> RetentionPolicy<I> for MetadataBasedPolicy {
    fn should_retain(&self, item: &I) -> bool {
        let matches_all =
            self.criteria.iter().all(|(k, v)| item.metadata().get(k).map(|mv| mv == v).unwrap_or(false));
        if self.invert {
            !matches_all
        } else {
            matches_all
        }
    }
}

/// How a `Composite` policy combines its members' `should_retain` answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOp {
    And,
    Or,
}

/// Combines predicate-style policies. Not meant to wrap `CountBasedPolicy`
/// (whose `should_retain` is a trivial `true` and whose real behavior lives
/// in `apply`) — run count-based retention as a separate pass instead.
pub struct CompositePolicy<I: RetainableItem> {
    pub op: CompositeOp,
    pub members: Vec<Box<dyn RetentionPolicy<I>>>,
}

impl<I: RetainableItem> RetentionPolicy<I> for CompositePolicy<I> {
    fn should_retain(&self, item: &I) -> bool {
        match self.op {
            CompositeOp::And => self.members.iter().all(|m| m.should_retain(item)),
            CompositeOp::Or => self.members.iter().any(|m| m.should_retain(item)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::MemoryItem;
    use chrono::Duration;

    fn aged_item(id: &str, age_ms: i64) -> MemoryItem {
        let mut item = MemoryItem::new(id, vec![]);
        item.created_at = Utc::now() - Duration::milliseconds(age_ms);
        item.last_accessed_at = item.created_at;
        item
    }

    #[test]
    fn time_based_removes_items_older_than_max_age() {
        let mut items = HashMap::new();
        items.insert("old".to_string(), aged_item("old", 10_000));
        items.insert("new".to_string(), aged_item("new", 10));

        let policy = TimeBasedPolicy { max_age_ms: 1_000, field: AgeField::CreatedAt };
        let removed = policy.apply(&mut items);

        assert_eq!(removed, 1);
        assert!(items.contains_key("new"));
        assert!(!items.contains_key("old"));
    }

    #[test]
    fn count_based_keeps_most_recently_created() {
        let mut items = HashMap::new();
        items.insert("a".to_string(), aged_item("a", 3_000));
        items.insert("b".to_string(), aged_item("b", 2_000));
        items.insert("c".to_string(), aged_item("c", 1_000));

        let policy = CountBasedPolicy { max_items: 2, order: CountOrder::Oldest };
        let removed = policy.apply(&mut items);

        assert_eq!(removed, 1);
        assert!(!items.contains_key("a"));
        assert!(items.contains_key("b"));
        assert!(items.contains_key("c"));
    }

    #[test]
    fn composite_and_requires_every_member_to_retain() {
        let mut items = HashMap::new();
        items.insert("keep".to_string(), aged_item("keep", 10));
        items.insert("drop".to_string(), aged_item("drop", 10_000));

        let composite: CompositePolicy<MemoryItem> =
            CompositePolicy { op: CompositeOp::And,
                               members: vec![Box::new(TimeBasedPolicy { max_age_ms: 1_000,
                                                                         field: AgeField::CreatedAt }),
                                             Box::new(RelevanceBasedPolicy { threshold: 0.0 })] };
        let removed = composite.apply(&mut items);

        assert_eq!(removed, 1);
        assert!(items.contains_key("keep"));
    }
}
