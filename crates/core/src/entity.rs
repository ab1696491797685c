//! Entity handle: identity + continuity across state changes.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{PersistError, PersistResult};
use crate::id::{ClassName, RecordId};
use crate::value::{Attributes, Value};

#[derive(Debug)]
struct EntityState {
    class: ClassName,
    id: Option<RecordId>,
    attributes: Attributes,
}

/// Shared handle to a mapped domain object.
///
/// Cloning the handle does not copy the object: every clone observes the same
/// attributes and id. Equality is instance identity, which is what the
/// identity map guarantees for records loaded more than once.
///
/// An entity without an id has never been persisted. The id is assigned once,
/// by the mapper, when the data source accepts the insert.
#[derive(Clone)]
pub struct Entity {
    inner: Arc<RwLock<EntityState>>,
}

impl Entity {
    pub fn new(class: impl Into<ClassName>) -> Self {
        Self::from_attributes(class, Attributes::new())
    }

    pub fn from_attributes(class: impl Into<ClassName>, attributes: Attributes) -> Self {
        Self {
            inner: Arc::new(RwLock::new(EntityState {
                class: class.into(),
                id: None,
                attributes,
            })),
        }
    }

    /// Builder-style attribute assignment.
    pub fn with(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, EntityState> {
        // Attribute maps stay consistent even if a writer panicked.
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EntityState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn class(&self) -> ClassName {
        self.read().class.clone()
    }

    pub fn id(&self) -> Option<RecordId> {
        self.read().id.clone()
    }

    pub fn is_persisted(&self) -> bool {
        self.read().id.is_some()
    }

    /// Stamp the id returned by the data source. One-way transition.
    pub fn assign_id(&self, id: RecordId) -> PersistResult<()> {
        let mut state = self.write();
        if let Some(existing) = &state.id {
            return Err(PersistError::AlreadyPersisted {
                class: state.class.clone(),
                id: existing.clone(),
            });
        }
        state.id = Some(id);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.read().attributes.get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.write().attributes.insert(name.into(), value.into());
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.write().attributes.remove(name)
    }

    /// Append to an array attribute, creating it when missing or null.
    ///
    /// Returns `false` (and leaves the attribute alone) if it holds a
    /// non-array value.
    pub fn push(&self, name: &str, value: impl Into<Value>) -> bool {
        let mut state = self.write();
        let slot = state
            .attributes
            .entry(name.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if slot.is_null() {
            *slot = Value::Array(Vec::new());
        }
        match slot {
            Value::Array(items) => {
                items.push(value.into());
                true
            }
            _ => false,
        }
    }

    /// Copy of the current attribute set.
    pub fn attributes(&self) -> Attributes {
        self.read().attributes.clone()
    }

    /// Overwrite the given attributes, leaving the others untouched.
    pub fn merge(&self, attributes: Attributes) {
        self.write().attributes.extend(attributes);
    }

    /// True if both handles point at the same in-memory object.
    pub fn same_instance(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.same_instance(other)
    }
}

impl core::fmt::Debug for Entity {
    // Attribute values may point back at this entity, so only names are shown.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.read();
        f.debug_struct("Entity")
            .field("class", &state.class)
            .field("id", &state.id)
            .field("attributes", &state.attributes.keys().collect::<Vec<_>>())
            .finish()
    }
}
