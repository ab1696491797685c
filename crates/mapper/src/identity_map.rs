//! Per-scope registry of live entity instances.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use docmap_core::{ClassName, Entity, RecordId};

/// Maps `(class, id)` to the one in-memory instance for that record.
///
/// The first instance registered for an id stays authoritative for the life
/// of the map; later registrations for the same id are ignored. There is no
/// expiry or eviction: entries live exactly as long as the map.
///
/// A cached instance is not reconciled with newer stored data. Records
/// changed by someone else after the first load are observed stale until the
/// scope ends.
#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: RwLock<HashMap<ClassName, HashMap<RecordId, Entity>>>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity under its class and id.
    ///
    /// Returns `false` without changing anything when the entity has no id or
    /// an instance for that id is already present.
    pub fn add(&self, entity: &Entity) -> bool {
        let Some(id) = entity.id() else {
            return false;
        };
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let by_id = entries.entry(entity.class()).or_default();
        if by_id.contains_key(&id) {
            return false;
        }
        by_id.insert(id, entity.clone());
        true
    }

    pub fn lookup(&self, class: &ClassName, id: &RecordId) -> Option<Entity> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(class).and_then(|by_id| by_id.get(id)).cloned()
    }

    pub fn remove(&self, class: &ClassName, id: &RecordId) -> Option<Entity> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.get_mut(class).and_then(|by_id| by_id.remove(id))
    }

    pub fn ids_for(&self, class: &ClassName) -> Vec<RecordId> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(class)
            .map(|by_id| by_id.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
