//! Attribute snapshots and dirty diffing.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use docmap_core::{Attributes, RecordId, Value};

/// Snapshots of serialized attributes, one per record id, owned by a mapper.
///
/// A snapshot records what this mapper last read from or wrote to the data
/// source. `save` sends only the attributes that differ from it, which is what
/// keeps two mappers editing different attributes of one record from
/// overwriting each other.
#[derive(Debug, Default)]
pub struct DirtyTracker {
    snapshots: RwLock<HashMap<RecordId, Attributes>>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot for `id`.
    pub fn track(&self, id: RecordId, attributes: Attributes) {
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        snapshots.insert(id, attributes);
    }

    pub fn snapshot(&self, id: &RecordId) -> Option<Attributes> {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        snapshots.get(id).cloned()
    }

    pub fn is_tracked(&self, id: &RecordId) -> bool {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        snapshots.contains_key(id)
    }

    /// Merge freshly persisted attributes into the snapshot for `id`.
    pub fn refresh(&self, id: &RecordId, persisted: &Attributes) {
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        let snapshot = snapshots.entry(id.clone()).or_default();
        for (name, value) in persisted {
            snapshot.insert(name.clone(), value.clone());
        }
    }

    /// Shift a numeric snapshot entry by `delta`.
    ///
    /// `fallback` is stored when the entry is missing or not numeric.
    pub fn apply_delta(&self, id: &RecordId, attribute: &str, delta: i64, fallback: Value) {
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        let snapshot = snapshots.entry(id.clone()).or_default();
        let shifted = snapshot
            .get(attribute)
            .and_then(|current| current.add_delta(delta))
            .unwrap_or(fallback);
        snapshot.insert(attribute.to_string(), shifted);
    }

    pub fn forget(&self, id: &RecordId) {
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        snapshots.remove(id);
    }
}

/// Attributes of `current` that differ from `snapshot`.
///
/// Comparison is structural, per attribute. An attribute missing on either
/// side reads as `Null`, so attributes gone from `current` are reported as
/// `Null` and a `Null` never differs from an absent snapshot entry.
pub fn changed_attributes(current: &Attributes, snapshot: &Attributes) -> Attributes {
    let mut changes: Attributes = current
        .iter()
        .filter(|(name, value)| snapshot.get(*name).unwrap_or(&Value::Null) != *value)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    for (name, value) in snapshot {
        if !current.contains_key(name) && !value.is_null() {
            changes.insert(name.clone(), Value::Null);
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmap_core::{attributes_from_json, Reference};
    use serde_json::json;

    #[test]
    fn unchanged_attributes_produce_empty_diff() {
        let attrs = attributes_from_json(json!({"title": "A", "views": 1}));
        assert!(changed_attributes(&attrs, &attrs.clone()).is_empty());
    }

    #[test]
    fn only_changed_attributes_are_reported() {
        let snapshot = attributes_from_json(json!({"title": "A", "views": 1}));
        let current = attributes_from_json(json!({"title": "B", "views": 1}));
        let diff = changed_attributes(&current, &snapshot);
        assert_eq!(diff, attributes_from_json(json!({"title": "B"})));
    }

    #[test]
    fn appended_references_change_the_whole_array() {
        let dave = Value::Reference(Reference::new("User", "dave"));
        let andy = Value::Reference(Reference::new("User", "andy"));
        let mut snapshot = Attributes::new();
        snapshot.insert("authors".into(), Value::Array(vec![dave.clone()]));
        let mut current = Attributes::new();
        current.insert("authors".into(), Value::Array(vec![dave.clone(), andy.clone()]));

        let diff = changed_attributes(&current, &snapshot);
        assert_eq!(diff["authors"], Value::Array(vec![dave, andy]));
    }

    #[test]
    fn removed_attributes_are_nulled() {
        let snapshot = attributes_from_json(json!({"title": "A", "subtitle": "B"}));
        let current = attributes_from_json(json!({"title": "A"}));
        assert_eq!(
            changed_attributes(&current, &snapshot),
            attributes_from_json(json!({"subtitle": null}))
        );
    }

    #[test]
    fn null_matches_a_missing_snapshot_entry() {
        let snapshot = attributes_from_json(json!({"title": "A"}));
        let current = attributes_from_json(json!({"title": "A", "views": null}));
        assert!(changed_attributes(&current, &snapshot).is_empty());

        let current = attributes_from_json(json!({"title": "A", "views": 0}));
        assert_eq!(
            changed_attributes(&current, &snapshot),
            attributes_from_json(json!({"views": 0}))
        );
    }

    #[test]
    fn refresh_merges_into_snapshot() {
        let tracker = DirtyTracker::new();
        let id = RecordId::from("1");
        tracker.track(id.clone(), attributes_from_json(json!({"title": "A", "views": 1})));
        tracker.refresh(&id, &attributes_from_json(json!({"views": 2})));
        assert_eq!(
            tracker.snapshot(&id).unwrap(),
            attributes_from_json(json!({"title": "A", "views": 2}))
        );
    }

    #[test]
    fn apply_delta_shifts_numeric_entries() {
        let tracker = DirtyTracker::new();
        let id = RecordId::from("1");
        tracker.track(id.clone(), attributes_from_json(json!({"views": 5})));
        tracker.apply_delta(&id, "views", -2, Value::Integer(0));
        assert_eq!(tracker.snapshot(&id).unwrap()["views"], Value::Integer(3));

        tracker.apply_delta(&id, "likes", 1, Value::Integer(1));
        assert_eq!(tracker.snapshot(&id).unwrap()["likes"], Value::Integer(1));
    }
}
