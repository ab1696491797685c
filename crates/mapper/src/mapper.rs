//! The mapper facade: insert, find, dirty-tracked save, atomic counters and
//! reference resolution for one class.

use std::collections::HashMap;
use std::sync::Arc;

use docmap_core::{
    Attributes, ClassName, Entity, PersistError, PersistResult, RecordId, Reference, Value,
};

use crate::config::MapperConfig;
use crate::data_source::DataSource;
use crate::dirty::{changed_attributes, DirtyTracker};
use crate::identity_map::IdentityMap;
use crate::mapping::ClassMapping;
use crate::query::Query;
use crate::registry::MapperRegistry;
use crate::retrieval::Retrieval;
use crate::serializer::{InsertChain, Serializer};

/// Persists entities of one class.
///
/// Each mapper owns the snapshots of the entities it inserted or loaded, and
/// (by default) an identity map. Two mappers for the same class are fully
/// independent: they may hold different instances of one record, and each
/// saves only what changed relative to its own snapshot.
///
/// ## Concurrency
///
/// - saves touching disjoint attributes of one record never overwrite each
///   other, whatever the interleaving
/// - saves touching the same attribute are last-write-wins; no conflict is
///   detected
/// - `increment`/`decrement` are applied by the data source as deltas, so
///   they commute with each other and with unrelated saves
pub struct Mapper {
    mapping: Arc<ClassMapping>,
    data_source: Arc<dyn DataSource>,
    registry: Arc<dyn MapperRegistry>,
    identity_map: Option<Arc<IdentityMap>>,
    dirty: DirtyTracker,
    config: MapperConfig,
}

impl Mapper {
    pub fn new(
        mapping: Arc<ClassMapping>,
        data_source: Arc<dyn DataSource>,
        registry: Arc<dyn MapperRegistry>,
    ) -> Self {
        Self {
            mapping,
            data_source,
            registry,
            identity_map: Some(Arc::new(IdentityMap::new())),
            dirty: DirtyTracker::new(),
            config: MapperConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MapperConfig) -> Self {
        if !config.identity_map {
            self.identity_map = None;
        }
        self.config = config;
        self
    }

    pub fn with_identity_map(mut self, identity_map: Arc<IdentityMap>) -> Self {
        self.identity_map = Some(identity_map);
        self
    }

    pub fn class(&self) -> &ClassName {
        self.mapping.class()
    }

    pub fn mapping(&self) -> &ClassMapping {
        &self.mapping
    }

    pub fn data_source(&self) -> &dyn DataSource {
        self.data_source.as_ref()
    }

    pub fn registry(&self) -> &dyn MapperRegistry {
        self.registry.as_ref()
    }

    pub fn identity_map(&self) -> Option<&Arc<IdentityMap>> {
        self.identity_map.as_ref()
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub(crate) fn dirty(&self) -> &DirtyTracker {
        &self.dirty
    }

    fn serializer(&self) -> Serializer<'_> {
        Serializer::new(&self.mapping, self.registry.as_ref())
    }

    fn detached_serializer(&self) -> Serializer<'_> {
        Serializer::detached(&self.mapping, self.registry.as_ref())
    }

    fn check_class(&self, entity: &Entity) -> PersistResult<()> {
        let actual = entity.class();
        if &actual != self.class() {
            return Err(PersistError::ClassMismatch {
                expected: self.class().clone(),
                actual,
            });
        }
        Ok(())
    }

    fn require_id(&self, entity: &Entity, operation: &'static str) -> PersistResult<RecordId> {
        self.check_class(entity)?;
        entity
            .id()
            .ok_or_else(|| PersistError::precursor_missing(self.class(), operation))
    }

    pub fn id_for(&self, entity: &Entity) -> Option<RecordId> {
        entity.id()
    }

    pub fn is_persisted(&self, entity: &Entity) -> bool {
        entity.is_persisted()
    }

    /// Write the full attribute set and stamp the returned id on `entity`.
    ///
    /// Unsaved entities it references are inserted first. Unsaved entities
    /// referencing each other in a cycle fail with `CyclicReference`.
    pub fn insert(&self, entity: &Entity) -> PersistResult<RecordId> {
        self.insert_within(entity, &InsertChain::default())
    }

    pub(crate) fn insert_within(&self, entity: &Entity, chain: &InsertChain) -> PersistResult<RecordId> {
        self.check_class(entity)?;
        if let Some(id) = entity.id() {
            return Err(PersistError::AlreadyPersisted {
                class: self.class().clone(),
                id,
            });
        }

        chain.enter(entity)?;
        let result = self.write_new(entity, chain);
        chain.leave();
        result
    }

    fn write_new(&self, entity: &Entity, chain: &InsertChain) -> PersistResult<RecordId> {
        let attributes =
            Serializer::within(&self.mapping, self.registry.as_ref(), chain).serialize(entity)?;
        let id = self
            .data_source
            .insert(self.class(), attributes.clone())
            .inspect_err(|err| tracing::warn!(class = %self.class(), error = %err, "insert rejected"))?;

        entity.assign_id(id.clone())?;
        self.dirty.track(id.clone(), attributes);
        tracing::info!(class = %self.class(), id = %id, "inserted");
        Ok(id)
    }

    pub fn insert_all(&self, entities: &[Entity]) -> PersistResult<Vec<RecordId>> {
        entities.iter().map(|entity| self.insert(entity)).collect()
    }

    /// Look up `id`, consulting the identity map before the data source.
    pub fn find(&self, id: &RecordId) -> PersistResult<Entity> {
        if let Some(entity) = self
            .identity_map
            .as_ref()
            .and_then(|map| map.lookup(self.class(), id))
        {
            tracing::debug!(class = %self.class(), id = %id, "identity map hit");
            self.adopt(id, &entity)?;
            return Ok(entity);
        }

        self.select(Query::by_id(id.clone()))
            .limit(1)
            .first()?
            .ok_or_else(|| PersistError::not_found(self.class(), id))
    }

    /// Snapshot an identity-mapped instance this mapper has not seen yet,
    /// e.g. one loaded by another mapper sharing the map.
    ///
    /// The snapshot is the instance's current state, so a later `save` sends
    /// only what is changed from here on.
    pub(crate) fn adopt(&self, id: &RecordId, entity: &Entity) -> PersistResult<()> {
        if self.dirty.is_tracked(id) {
            return Ok(());
        }
        let snapshot = self.detached_serializer().serialize(entity)?;
        self.dirty.track(id.clone(), snapshot);
        Ok(())
    }

    /// Every record of the class, bound to this mapper's identity map.
    pub fn all(&self) -> Retrieval<'_> {
        self.select(Query::all())
    }

    pub fn select(&self, criteria: Query) -> Retrieval<'_> {
        let retrieval = Retrieval::new(self, criteria.with_references());
        match &self.identity_map {
            Some(map) => retrieval.with_identity_map(map.clone()),
            None => retrieval,
        }
    }

    pub fn first(&self) -> PersistResult<Option<Entity>> {
        self.all().limit(1).first()
    }

    pub fn count(&self) -> PersistResult<usize> {
        self.all().count()
    }

    /// Attributes `save` would send: the serialized values that differ from
    /// this mapper's snapshot.
    ///
    /// An entity this mapper never loaded or inserted has no snapshot, so all
    /// its non-null attributes count as changed. Nothing is written: unsaved
    /// referenced entities show up as live [`Value::Entity`] values, which
    /// `save` inserts first.
    pub fn dirty_attributes(&self, entity: &Entity) -> PersistResult<Attributes> {
        let id = self.require_id(entity, "diff")?;
        let current = self.detached_serializer().serialize(entity)?;
        Ok(self.changes_since_snapshot(&id, &current))
    }

    fn changes_since_snapshot(&self, id: &RecordId, current: &Attributes) -> Attributes {
        let snapshot = self.dirty.snapshot(id).unwrap_or_default();
        changed_attributes(current, &snapshot)
    }

    /// Send only the attributes changed since the last load or save.
    ///
    /// No-op when nothing changed. On failure the snapshot is kept, so a
    /// retry computes the same diff.
    pub fn save(&self, entity: &Entity) -> PersistResult<()> {
        let id = self.require_id(entity, "save")?;
        let current = self.serializer().serialize(entity)?;
        let changes = self.changes_since_snapshot(&id, &current);
        if changes.is_empty() {
            tracing::debug!(class = %self.class(), id = %id, "save skipped: nothing changed");
            return Ok(());
        }

        let changed: Vec<&str> = changes.keys().map(String::as_str).collect();
        tracing::info!(class = %self.class(), id = %id, attributes = ?changed, "saving changes");
        self.data_source
            .update(self.class(), &id, changes.clone())
            .inspect_err(|err| tracing::warn!(class = %self.class(), id = %id, error = %err, "save rejected"))?;

        self.dirty.refresh(&id, &changes);
        Ok(())
    }

    /// Write exactly `attributes`, bypassing the diff, then apply them to
    /// `entity`.
    ///
    /// Attributes the class mapping does not persist are applied to the
    /// entity only.
    pub fn update(&self, entity: &Entity, attributes: Attributes) -> PersistResult<()> {
        let id = self.require_id(entity, "update")?;
        let serialized = self.serializer().serialize_attributes(attributes.clone())?;
        if serialized.is_empty() {
            entity.merge(attributes);
            return Ok(());
        }

        tracing::info!(class = %self.class(), id = %id, "updating");
        self.data_source
            .update(self.class(), &id, serialized.clone())
            .inspect_err(|err| tracing::warn!(class = %self.class(), id = %id, error = %err, "update rejected"))?;

        entity.merge(attributes);
        self.dirty.refresh(&id, &serialized);
        Ok(())
    }

    /// Atomically add `amount` to a numeric attribute at the data source.
    ///
    /// The same delta is then applied to the in-memory value and to the
    /// snapshot, so the attribute is not sent again by a later `save`.
    pub fn increment(&self, entity: &Entity, attribute: &str, amount: i64) -> PersistResult<()> {
        let id = self.require_id(entity, "increment")?;
        let current = entity.get(attribute).unwrap_or_default();
        let updated = current
            .add_delta(amount)
            .ok_or_else(|| PersistError::not_numeric(attribute))?;

        tracing::info!(class = %self.class(), id = %id, attribute, delta = amount, "incrementing");
        self.data_source
            .increment(self.class(), &id, attribute, amount)
            .inspect_err(|err| tracing::warn!(class = %self.class(), id = %id, error = %err, "increment rejected"))?;

        entity.set(attribute, updated.clone());
        self.dirty.apply_delta(&id, attribute, amount, updated);
        Ok(())
    }

    pub fn decrement(&self, entity: &Entity, attribute: &str, amount: i64) -> PersistResult<()> {
        self.increment(entity, attribute, amount.saturating_neg())
    }

    pub fn increment_by_one(&self, entity: &Entity, attribute: &str) -> PersistResult<()> {
        self.increment(entity, attribute, 1)
    }

    pub fn decrement_by_one(&self, entity: &Entity, attribute: &str) -> PersistResult<()> {
        self.decrement(entity, attribute, 1)
    }

    /// Remove the stored record and forget its snapshot and identity entry.
    pub fn delete(&self, entity: &Entity) -> PersistResult<()> {
        let id = self.require_id(entity, "delete")?;
        self.data_source
            .delete(self.class(), &id)
            .inspect_err(|err| tracing::warn!(class = %self.class(), id = %id, error = %err, "delete rejected"))?;
        self.dirty.forget(&id);
        if let Some(map) = &self.identity_map {
            map.remove(self.class(), &id);
        }
        tracing::info!(class = %self.class(), id = %id, "deleted");
        Ok(())
    }

    /// Load the entity a reference points to.
    ///
    /// References to this mapper's class go through this mapper (and its
    /// identity map); others through a mapper from the registry.
    pub fn resolve(&self, reference: &Reference) -> PersistResult<Entity> {
        if reference.class() == self.class() {
            return self.find(reference.id());
        }
        self.registry
            .mapper_for(reference.class())?
            .find(reference.id())
    }

    /// Replace the reference(s) held in `attribute` with loaded entities.
    ///
    /// Arrays keep their order; non-reference elements are left as they are.
    /// Each referenced class is looked up through a single mapper, so repeated
    /// references resolve to one instance.
    pub fn load_association(&self, entity: &Entity, attribute: &str) -> PersistResult<()> {
        let Some(value) = entity.get(attribute) else {
            return Ok(());
        };

        let mut mappers: HashMap<ClassName, Mapper> = HashMap::new();
        let resolved = match value {
            Value::Reference(reference) => Value::Entity(self.resolve_with(&mut mappers, &reference)?),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::Reference(reference) => {
                            Ok(Value::Entity(self.resolve_with(&mut mappers, &reference)?))
                        }
                        other => Ok(other),
                    })
                    .collect::<PersistResult<Vec<_>>>()?,
            ),
            _ => return Ok(()),
        };

        tracing::debug!(class = %self.class(), attribute, "association loaded");
        entity.set(attribute, resolved);
        Ok(())
    }

    fn resolve_with(
        &self,
        mappers: &mut HashMap<ClassName, Mapper>,
        reference: &Reference,
    ) -> PersistResult<Entity> {
        if reference.class() == self.class() {
            return self.find(reference.id());
        }
        if !mappers.contains_key(reference.class()) {
            let mapper = self.registry.mapper_for(reference.class())?;
            mappers.insert(reference.class().clone(), mapper);
        }
        match mappers.get(reference.class()) {
            Some(mapper) => mapper.find(reference.id()),
            None => Err(PersistError::UnknownClass(reference.class().clone())),
        }
    }
}

impl core::fmt::Debug for Mapper {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mapper")
            .field("class", self.class())
            .field("mapping", &self.mapping)
            .field("identity_map", &self.identity_map.as_ref().map(|m| m.len()))
            .field("config", &self.config)
            .finish()
    }
}
