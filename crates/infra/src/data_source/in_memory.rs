use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use docmap_core::{Attributes, ClassName, DataSourceError, RecordId, Value};
use docmap_mapper::{DataSource, Query, RawRecord, RetrieveOptions, SortDirection};

/// Number of primitive calls served, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DataSourceStats {
    pub retrieves: usize,
    pub inserts: usize,
    pub updates: usize,
    pub increments: usize,
    pub deletes: usize,
}

#[derive(Debug, Default)]
struct Counters {
    retrieves: AtomicUsize,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    increments: AtomicUsize,
    deletes: AtomicUsize,
}

/// In-memory document store.
///
/// Intended for tests/dev. Not optimized for performance: every retrieve scans
/// the whole collection.
///
/// - records keep insertion order unless a sort attribute is given
/// - sorting is stable; missing attributes sort as `Null` (first)
/// - `update` merges attributes into the stored record
/// - `increment` treats a missing attribute as 0 and runs under the write lock,
///   so concurrent deltas never get lost
#[derive(Debug, Default)]
pub struct InMemoryDataSource {
    collections: RwLock<HashMap<ClassName, Vec<RawRecord>>>,
    counters: Counters,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DataSourceStats {
        DataSourceStats {
            retrieves: self.counters.retrieves.load(Ordering::Relaxed),
            inserts: self.counters.inserts.load(Ordering::Relaxed),
            updates: self.counters.updates.load(Ordering::Relaxed),
            increments: self.counters.increments.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
        }
    }

    /// Stored form of one record, for inspection.
    pub fn record(&self, class: &ClassName, id: &RecordId) -> Option<RawRecord> {
        let collections = self.collections.read().ok()?;
        collections
            .get(class)?
            .iter()
            .find(|record| &record.id == id)
            .cloned()
    }

    pub fn len(&self, class: &ClassName) -> usize {
        self.collections
            .read()
            .map(|collections| collections.get(class).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Drop every record of `class`.
    pub fn clear(&self, class: &ClassName) {
        if let Ok(mut collections) = self.collections.write() {
            collections.remove(class);
        }
    }

    fn with_record<T>(
        &self,
        class: &ClassName,
        id: &RecordId,
        f: impl FnOnce(&mut RawRecord) -> Result<T, DataSourceError>,
    ) -> Result<T, DataSourceError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| DataSourceError::unavailable("lock poisoned"))?;
        let record = collections
            .get_mut(class)
            .and_then(|records| records.iter_mut().find(|record| &record.id == id))
            .ok_or_else(|| DataSourceError::NotFound {
                class: class.clone(),
                id: id.clone(),
            })?;
        f(record)
    }
}

fn compare_by(attribute: &str, a: &RawRecord, b: &RawRecord) -> CmpOrdering {
    let left = a.attributes.get(attribute).unwrap_or(&Value::Null);
    let right = b.attributes.get(attribute).unwrap_or(&Value::Null);
    left.sort_cmp(right)
}

impl DataSource for InMemoryDataSource {
    fn retrieve(
        &self,
        class: &ClassName,
        criteria: &Query,
        options: &RetrieveOptions,
    ) -> Result<Vec<RawRecord>, DataSourceError> {
        self.counters.retrieves.fetch_add(1, Ordering::Relaxed);

        let collections = self
            .collections
            .read()
            .map_err(|_| DataSourceError::unavailable("lock poisoned"))?;
        let Some(records) = collections.get(class) else {
            tracing::debug!(class = %class, "retrieve from empty collection");
            return Ok(vec![]);
        };

        let mut matching: Vec<RawRecord> = records
            .iter()
            .filter(|record| criteria.matches(&record.id, &record.attributes))
            .cloned()
            .collect();
        drop(collections);

        if let Some(attribute) = &options.attribute {
            match options.direction.unwrap_or(SortDirection::Ascending) {
                SortDirection::Ascending => matching.sort_by(|a, b| compare_by(attribute, a, b)),
                SortDirection::Descending => matching.sort_by(|a, b| compare_by(attribute, b, a)),
            }
        }

        Ok(matching
            .into_iter()
            .skip(options.skip.unwrap_or(0))
            .take(options.limit.unwrap_or(usize::MAX))
            .collect())
    }

    fn insert(&self, class: &ClassName, attributes: Attributes) -> Result<RecordId, DataSourceError> {
        if attributes.values().any(|value| matches!(value, Value::Entity(_))) {
            return Err(DataSourceError::rejected(
                "live entities must be serialized before insert",
            ));
        }

        let id = RecordId::generate();
        let mut collections = self
            .collections
            .write()
            .map_err(|_| DataSourceError::unavailable("lock poisoned"))?;
        collections
            .entry(class.clone())
            .or_default()
            .push(RawRecord::new(id.clone(), attributes));
        self.counters.inserts.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(class = %class, id = %id, "record stored");
        Ok(id)
    }

    fn update(
        &self,
        class: &ClassName,
        id: &RecordId,
        attributes: Attributes,
    ) -> Result<(), DataSourceError> {
        self.with_record(class, id, |record| {
            record.attributes.extend(attributes);
            Ok(())
        })?;
        self.counters.updates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn increment(
        &self,
        class: &ClassName,
        id: &RecordId,
        attribute: &str,
        delta: i64,
    ) -> Result<(), DataSourceError> {
        self.with_record(class, id, |record| {
            let current = record.attributes.get(attribute).unwrap_or(&Value::Null);
            let next = current.add_delta(delta).ok_or_else(|| {
                DataSourceError::rejected(format!("cannot increment non-numeric attribute {attribute}"))
            })?;
            record.attributes.insert(attribute.to_string(), next);
            Ok(())
        })?;
        self.counters.increments.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn delete(&self, class: &ClassName, id: &RecordId) -> Result<(), DataSourceError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| DataSourceError::unavailable("lock poisoned"))?;
        let records = collections.get_mut(class).ok_or_else(|| DataSourceError::NotFound {
            class: class.clone(),
            id: id.clone(),
        })?;
        let before = records.len();
        records.retain(|record| &record.id != id);
        if records.len() == before {
            return Err(DataSourceError::NotFound {
                class: class.clone(),
                id: id.clone(),
            });
        }
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(class = %class, id = %id, "record removed");
        Ok(())
    }
}
