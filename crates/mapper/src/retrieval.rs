//! Lazy, chainable query results.

use std::sync::{Arc, PoisonError, RwLock};

use docmap_core::{DataSourceError, Entity, PersistResult};

use crate::data_source::{RawRecord, RetrieveOptions, SortDirection};
use crate::identity_map::IdentityMap;
use crate::mapper::Mapper;
use crate::query::Query;

/// A query that has not run yet.
///
/// Chain methods (`sort`, `reverse`, `limit`, `page`, `per_page`) return a new
/// descriptor and leave `self` untouched, so an intermediate step can be kept
/// and re-chained. Nothing reaches the data source until [`Retrieval::to_a`];
/// its result is cached until [`Retrieval::clear_cache`].
pub struct Retrieval<'m> {
    mapper: &'m Mapper,
    criteria: Query,
    sort_attribute: Option<String>,
    sort_direction: Option<SortDirection>,
    result_limit: Option<usize>,
    result_offset: Option<usize>,
    result_page: Option<usize>,
    quantity_per_page: usize,
    identity_map: Option<Arc<IdentityMap>>,
    result_cache: RwLock<Option<Vec<Entity>>>,
}

impl<'m> Retrieval<'m> {
    pub fn new(mapper: &'m Mapper, criteria: Query) -> Self {
        Self {
            mapper,
            criteria,
            sort_attribute: None,
            sort_direction: None,
            result_limit: None,
            result_offset: None,
            result_page: None,
            quantity_per_page: mapper.config().default_per_page,
            identity_map: None,
            result_cache: RwLock::new(None),
        }
    }

    /// Route materialized records through `identity_map`.
    pub fn with_identity_map(mut self, identity_map: Arc<IdentityMap>) -> Self {
        self.identity_map = Some(identity_map);
        self
    }

    /// Copy of the descriptor with an empty result cache.
    fn derive(&self) -> Self {
        Self {
            mapper: self.mapper,
            criteria: self.criteria.clone(),
            sort_attribute: self.sort_attribute.clone(),
            sort_direction: self.sort_direction,
            result_limit: self.result_limit,
            result_offset: self.result_offset,
            result_page: self.result_page,
            quantity_per_page: self.quantity_per_page,
            identity_map: self.identity_map.clone(),
            result_cache: RwLock::new(None),
        }
    }

    pub fn sort(&self, attribute: impl Into<String>) -> Self {
        let mut next = self.derive();
        next.sort_attribute = Some(attribute.into());
        next.sort_direction = Some(SortDirection::Ascending);
        next
    }

    /// Flip the sort direction. Without a sort attribute this changes nothing.
    pub fn reverse(&self) -> Self {
        let mut next = self.derive();
        if next.sort_attribute.is_some() {
            next.sort_direction = Some(
                next.sort_direction
                    .unwrap_or(SortDirection::Ascending)
                    .reversed(),
            );
        }
        next
    }

    pub fn limit(&self, count: usize) -> Self {
        let mut next = self.derive();
        next.result_limit = Some(count);
        next
    }

    /// Select page `page` (1-based; 0 reads as 1).
    pub fn page(&self, page: usize) -> Self {
        let mut next = self.derive();
        next.result_page = Some(page.max(1));
        next.paginate();
        next
    }

    /// Change the page size, re-deriving offset and limit for the current page.
    pub fn per_page(&self, count: usize) -> Self {
        let mut next = self.derive();
        next.quantity_per_page = count;
        if next.result_page.is_some() {
            next.paginate();
        }
        next
    }

    fn paginate(&mut self) {
        let page = self.result_page.unwrap_or(1);
        self.result_offset = Some((page - 1).saturating_mul(self.quantity_per_page));
        self.result_limit = Some(self.quantity_per_page);
    }

    pub fn criteria(&self) -> &Query {
        &self.criteria
    }

    pub fn sort_attribute(&self) -> Option<&str> {
        self.sort_attribute.as_deref()
    }

    pub fn sort_direction(&self) -> Option<SortDirection> {
        self.sort_direction
    }

    pub fn result_limit(&self) -> Option<usize> {
        self.result_limit
    }

    pub fn result_offset(&self) -> Option<usize> {
        self.result_offset
    }

    pub fn quantity_per_page(&self) -> usize {
        self.quantity_per_page
    }

    pub fn identity_map(&self) -> Option<&Arc<IdentityMap>> {
        self.identity_map.as_ref()
    }

    pub fn result_cache(&self) -> Option<Vec<Entity>> {
        self.result_cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_cache(&self) {
        *self.result_cache.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Options sent to the data source, built from the current descriptor.
    pub fn options(&self) -> RetrieveOptions {
        RetrieveOptions {
            attribute: self.sort_attribute.clone(),
            direction: self.sort_direction,
            limit: self.result_limit,
            skip: self.result_offset,
        }
    }

    /// Run the query (once) and return the entities in data source order.
    ///
    /// Records whose id is already in the identity map resolve to the cached
    /// instance; the rest are unserialized, snapshotted and registered.
    pub fn to_a(&self) -> PersistResult<Vec<Entity>> {
        if let Some(cached) = self.result_cache() {
            return Ok(cached);
        }

        let class = self.mapper.class();
        let options = self.options();
        tracing::debug!(class = %class, ?options, "retrieving records");
        let records = self
            .mapper
            .data_source()
            .retrieve(class, &self.criteria, &options)?;

        let mut slots: Vec<Option<Entity>> = Vec::with_capacity(records.len());
        let mut misses: Vec<RawRecord> = Vec::new();
        for record in records {
            let cached = self
                .identity_map
                .as_ref()
                .and_then(|map| map.lookup(class, &record.id));
            match &cached {
                // The map may be shared with other mappers.
                Some(entity) => self.mapper.adopt(&record.id, entity)?,
                None => misses.push(record),
            }
            slots.push(cached);
        }
        let hits = slots.iter().filter(|slot| slot.is_some()).count();
        if hits > 0 {
            tracing::debug!(class = %class, hits, "identity map hits");
        }

        let loaded = self.load(misses)?;
        let mut loaded = loaded.into_iter();
        let results: Vec<Entity> = slots
            .into_iter()
            .filter_map(|slot| slot.or_else(|| loaded.next()))
            .collect();

        *self.result_cache.write().unwrap_or_else(PoisonError::into_inner) = Some(results.clone());
        Ok(results)
    }

    fn load(&self, records: Vec<RawRecord>) -> PersistResult<Vec<Entity>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let expected = records.len();
        let snapshots: Vec<_> = records
            .iter()
            .map(|record| (record.id.clone(), record.attributes.clone()))
            .collect();
        let entities = self.mapper.data_source().unserialize(records, self.mapper)?;
        if entities.len() != expected {
            return Err(DataSourceError::corrupt(format!(
                "unserialize produced {} entities for {} records",
                entities.len(),
                expected
            ))
            .into());
        }

        let mut resolved = Vec::with_capacity(expected);
        for (entity, (id, attributes)) in entities.into_iter().zip(snapshots) {
            if entity.id().is_none() {
                entity.assign_id(id.clone())?;
            }
            let entity = match &self.identity_map {
                // A duplicate id inside one batch resolves to the first instance.
                Some(map) if !map.add(&entity) => {
                    let existing = map.lookup(self.mapper.class(), &id).unwrap_or(entity);
                    self.mapper.adopt(&id, &existing)?;
                    existing
                }
                _ => {
                    self.mapper.dirty().track(id, attributes);
                    entity
                }
            };
            resolved.push(entity);
        }
        Ok(resolved)
    }

    pub fn first(&self) -> PersistResult<Option<Entity>> {
        Ok(self.to_a()?.into_iter().next())
    }

    pub fn count(&self) -> PersistResult<usize> {
        Ok(self.to_a()?.len())
    }

    pub fn is_empty(&self) -> PersistResult<bool> {
        Ok(self.to_a()?.is_empty())
    }

    /// True if this exact instance is among the results.
    pub fn includes(&self, entity: &Entity) -> PersistResult<bool> {
        Ok(self.to_a()?.iter().any(|e| e.same_instance(entity)))
    }
}

impl core::fmt::Debug for Retrieval<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Retrieval")
            .field("class", self.mapper.class())
            .field("criteria", &self.criteria)
            .field("options", &self.options())
            .field("per_page", &self.quantity_per_page)
            .field("identity_map", &self.identity_map.is_some())
            .finish()
    }
}
