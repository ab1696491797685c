//! Recording data source double for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;

use docmap_core::{Attributes, ClassName, DataSourceError, RecordId, Value};

use crate::data_source::{DataSource, RawRecord, RetrieveOptions};
use crate::query::Query;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallStats {
    pub retrieves: usize,
    pub inserts: usize,
    pub updates: usize,
    pub increments: usize,
    pub deletes: usize,
}

/// Minimal store that records every call. No sorting.
#[derive(Debug, Default)]
pub struct RecordingDataSource {
    records: RwLock<HashMap<ClassName, Vec<RawRecord>>>,
    next_id: AtomicU64,
    reject_writes: AtomicBool,
    retrieves: AtomicUsize,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    increments: AtomicUsize,
    deletes: AtomicUsize,
    last_options: RwLock<Option<RetrieveOptions>>,
    update_payloads: RwLock<Vec<Attributes>>,
}

impl RecordingDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub fn stats(&self) -> CallStats {
        CallStats {
            retrieves: self.retrieves.load(Ordering::SeqCst),
            inserts: self.inserts.load(Ordering::SeqCst),
            updates: self.updates.load(Ordering::SeqCst),
            increments: self.increments.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
        }
    }

    pub fn last_options(&self) -> Option<RetrieveOptions> {
        self.last_options.read().unwrap().clone()
    }

    pub fn update_payloads(&self) -> Vec<Attributes> {
        self.update_payloads.read().unwrap().clone()
    }

    pub fn stored(&self, class: &str, id: &RecordId) -> Option<Attributes> {
        let records = self.records.read().unwrap();
        records
            .get(&ClassName::from(class))?
            .iter()
            .find(|r| &r.id == id)
            .map(|r| r.attributes.clone())
    }

    /// Store a record directly, bypassing `insert` accounting.
    pub fn seed(&self, class: &str, id: &str, attributes: Attributes) {
        let mut records = self.records.write().unwrap();
        records
            .entry(ClassName::from(class))
            .or_default()
            .push(RawRecord::new(RecordId::from(id), attributes));
    }

    fn check_writable(&self) -> Result<(), DataSourceError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(DataSourceError::unavailable("writes rejected by test"));
        }
        Ok(())
    }
}

impl DataSource for RecordingDataSource {
    fn retrieve(
        &self,
        class: &ClassName,
        criteria: &Query,
        options: &RetrieveOptions,
    ) -> Result<Vec<RawRecord>, DataSourceError> {
        self.retrieves.fetch_add(1, Ordering::SeqCst);
        *self.last_options.write().unwrap() = Some(options.clone());
        let records = self.records.read().unwrap();
        let matching: Vec<RawRecord> = records
            .get(class)
            .map(|rs| {
                rs.iter()
                    .filter(|r| criteria.matches(&r.id, &r.attributes))
                    .skip(options.skip.unwrap_or(0))
                    .take(options.limit.unwrap_or(usize::MAX))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(matching)
    }

    fn insert(&self, class: &ClassName, attributes: Attributes) -> Result<RecordId, DataSourceError> {
        self.check_writable()?;
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let id = RecordId::from(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut records = self.records.write().unwrap();
        records
            .entry(class.clone())
            .or_default()
            .push(RawRecord::new(id.clone(), attributes));
        Ok(id)
    }

    fn update(
        &self,
        class: &ClassName,
        id: &RecordId,
        attributes: Attributes,
    ) -> Result<(), DataSourceError> {
        self.check_writable()?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.update_payloads.write().unwrap().push(attributes.clone());
        let mut records = self.records.write().unwrap();
        let record = records
            .get_mut(class)
            .and_then(|rs| rs.iter_mut().find(|r| &r.id == id))
            .ok_or_else(|| DataSourceError::NotFound {
                class: class.clone(),
                id: id.clone(),
            })?;
        record.attributes.extend(attributes);
        Ok(())
    }

    fn increment(
        &self,
        class: &ClassName,
        id: &RecordId,
        attribute: &str,
        delta: i64,
    ) -> Result<(), DataSourceError> {
        self.check_writable()?;
        self.increments.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.write().unwrap();
        let record = records
            .get_mut(class)
            .and_then(|rs| rs.iter_mut().find(|r| &r.id == id))
            .ok_or_else(|| DataSourceError::NotFound {
                class: class.clone(),
                id: id.clone(),
            })?;
        let current = record.attributes.get(attribute).cloned().unwrap_or(Value::Null);
        let next = current
            .add_delta(delta)
            .ok_or_else(|| DataSourceError::rejected("not numeric"))?;
        record.attributes.insert(attribute.to_string(), next);
        Ok(())
    }

    fn delete(&self, class: &ClassName, id: &RecordId) -> Result<(), DataSourceError> {
        self.check_writable()?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.write().unwrap();
        if let Some(rs) = records.get_mut(class) {
            rs.retain(|r| &r.id != id);
        }
        Ok(())
    }
}
