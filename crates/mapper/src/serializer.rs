//! Conversion between entities and stored attribute maps.
//!
//! Outbound, live entity values are replaced by references (or embedded
//! documents for attributes mapped as embedded). Arrays are converted element
//! by element, so a collection keeps its order and the references of elements
//! that were already persisted. Referenced entities that were never inserted
//! are inserted first, through the mapper registered for their class.
//!
//! Cascaded inserts are not transactional: if the parent write fails, the
//! referenced entities inserted on its behalf stay persisted.
//!
//! Inbound, embedded documents become fresh entities; references stay
//! references until explicitly resolved.

use std::cell::RefCell;

use docmap_core::{Attributes, ClassName, Entity, PersistError, PersistResult, Reference, Value};

use crate::data_source::RawRecord;
use crate::mapping::ClassMapping;
use crate::registry::MapperRegistry;

/// Entities whose insert is in progress, outermost first.
#[derive(Debug, Default)]
pub(crate) struct InsertChain {
    entities: RefCell<Vec<Entity>>,
}

impl InsertChain {
    /// Mark `entity` as being inserted; fails if it already is.
    pub(crate) fn enter(&self, entity: &Entity) -> PersistResult<()> {
        let mut entities = self.entities.borrow_mut();
        if entities.iter().any(|pending| pending.same_instance(entity)) {
            return Err(PersistError::CyclicReference {
                class: entity.class(),
            });
        }
        entities.push(entity.clone());
        Ok(())
    }

    pub(crate) fn leave(&self) {
        self.entities.borrow_mut().pop();
    }
}

enum Cascade<'a> {
    /// Unsaved referenced entities are kept as live values.
    Detached,
    Root(InsertChain),
    Nested(&'a InsertChain),
}

pub struct Serializer<'a> {
    mapping: &'a ClassMapping,
    registry: &'a dyn MapperRegistry,
    cascade: Cascade<'a>,
}

impl<'a> Serializer<'a> {
    /// Serializer that inserts unsaved referenced entities.
    pub fn new(mapping: &'a ClassMapping, registry: &'a dyn MapperRegistry) -> Self {
        Self {
            mapping,
            registry,
            cascade: Cascade::Root(InsertChain::default()),
        }
    }

    /// Serializer without side effects: unsaved referenced entities stay
    /// [`Value::Entity`] instead of being inserted.
    pub fn detached(mapping: &'a ClassMapping, registry: &'a dyn MapperRegistry) -> Self {
        Self {
            mapping,
            registry,
            cascade: Cascade::Detached,
        }
    }

    pub(crate) fn within(
        mapping: &'a ClassMapping,
        registry: &'a dyn MapperRegistry,
        chain: &'a InsertChain,
    ) -> Self {
        Self {
            mapping,
            registry,
            cascade: Cascade::Nested(chain),
        }
    }

    fn chain(&self) -> Option<&InsertChain> {
        match &self.cascade {
            Cascade::Detached => None,
            Cascade::Root(chain) => Some(chain),
            Cascade::Nested(chain) => Some(*chain),
        }
    }

    /// Serialize every persisted attribute of `entity`.
    ///
    /// Declared attributes missing from the entity are written as `Null`.
    pub fn serialize(&self, entity: &Entity) -> PersistResult<Attributes> {
        let mut attributes = entity.attributes();
        let mut serialized = Attributes::new();

        if self.mapping.is_dynamic() {
            for (name, value) in attributes {
                let value = self.serialize_value(value, false)?;
                serialized.insert(name, value);
            }
        } else {
            for declared in self.mapping.attributes() {
                let value = attributes.remove(&declared.name).unwrap_or_default();
                let value = self.serialize_value(value, declared.embedded)?;
                serialized.insert(declared.name.clone(), value);
            }
        }
        Ok(serialized)
    }

    /// Serialize an explicit attribute map, honouring embedded declarations.
    ///
    /// Attributes the mapping does not persist are dropped.
    pub fn serialize_attributes(&self, attributes: Attributes) -> PersistResult<Attributes> {
        attributes
            .into_iter()
            .filter(|(name, _)| self.mapping.persists(name))
            .map(|(name, value)| {
                let embedded = self.mapping.is_embedded(&name);
                Ok((name, self.serialize_value(value, embedded)?))
            })
            .collect()
    }

    fn serialize_value(&self, value: Value, embedded: bool) -> PersistResult<Value> {
        match value {
            Value::Entity(entity) if embedded => Ok(Value::Embedded {
                class: entity.class(),
                attributes: self.serialize_nested(entity.attributes())?,
            }),
            Value::Entity(entity) => Ok(match self.reference_to(&entity)? {
                Some(reference) => Value::Reference(reference),
                None => Value::Entity(entity),
            }),
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.serialize_value(item, embedded))
                .collect::<PersistResult<Vec<_>>>()
                .map(Value::Array),
            Value::Map(map) => map
                .into_iter()
                .map(|(key, item)| Ok((key, self.serialize_value(item, embedded)?)))
                .collect::<PersistResult<Attributes>>()
                .map(Value::Map),
            Value::Embedded { class, attributes } => Ok(Value::Embedded {
                class,
                attributes: self.serialize_nested(attributes)?,
            }),
            other => Ok(other),
        }
    }

    fn serialize_nested(&self, attributes: Attributes) -> PersistResult<Attributes> {
        attributes
            .into_iter()
            .map(|(name, value)| Ok((name, self.serialize_value(value, false)?)))
            .collect()
    }

    fn reference_to(&self, entity: &Entity) -> PersistResult<Option<Reference>> {
        let class = entity.class();
        if let Some(id) = entity.id() {
            return Ok(Some(Reference::new(class, id)));
        }
        let Some(chain) = self.chain() else {
            return Ok(None);
        };

        tracing::debug!(class = %class, "inserting unsaved referenced entity");
        let id = self.registry.mapper_for(&class)?.insert_within(entity, chain)?;
        Ok(Some(Reference::new(class, id)))
    }
}

/// Build an entity of `class` from a raw record.
pub fn unserialize_record(record: RawRecord, class: &ClassName) -> PersistResult<Entity> {
    let attributes = record
        .attributes
        .into_iter()
        .map(|(name, value)| (name, unembed(value)))
        .collect();
    let entity = Entity::from_attributes(class.clone(), attributes);
    entity.assign_id(record.id)?;
    Ok(entity)
}

fn unembed(value: Value) -> Value {
    match value {
        Value::Embedded { class, attributes } => Value::Entity(Entity::from_attributes(
            class,
            attributes
                .into_iter()
                .map(|(name, value)| (name, unembed(value)))
                .collect(),
        )),
        Value::Array(items) => Value::Array(items.into_iter().map(unembed).collect()),
        Value::Map(map) => Value::Map(map.into_iter().map(|(k, v)| (k, unembed(v))).collect()),
        other => other,
    }
}
