//! Data source boundary.
//!
//! The mapper never talks to a store directly. Everything it needs from one is
//! captured by [`DataSource`]: retrieval with sort/limit/skip options, record
//! construction, inserts, partial updates and atomic numeric deltas.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use docmap_core::{Attributes, ClassName, DataSourceError, Entity, PersistResult, RecordId};

use crate::mapper::Mapper;
use crate::query::Query;
use crate::serializer;

/// A record as stored: id plus serialized attributes.
///
/// Attribute values never contain live entities, only references and
/// embedded documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: RecordId,
    pub attributes: Attributes,
}

impl RawRecord {
    pub fn new(id: RecordId, attributes: Attributes) -> Self {
        Self { id, attributes }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

/// Options passed along with every retrieve call.
///
/// `None` means "unspecified": no sort, no limit, no skip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieveOptions {
    pub attribute: Option<String>,
    pub direction: Option<SortDirection>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

/// Pluggable store behind a mapper.
///
/// Implementations must:
/// - apply `update` as a partial update (attributes not listed stay untouched)
/// - apply `increment` atomically, without needing the caller's current value
/// - generate ids on `insert`; the mapper never chooses them
///
/// Blocking, timeouts and retries are the implementation's business; the
/// mapper propagates every error unchanged.
pub trait DataSource: Send + Sync {
    fn retrieve(
        &self,
        class: &ClassName,
        criteria: &Query,
        options: &RetrieveOptions,
    ) -> Result<Vec<RawRecord>, DataSourceError>;

    /// Build entities from raw records, one per record, in order.
    fn unserialize(&self, records: Vec<RawRecord>, mapper: &Mapper) -> PersistResult<Vec<Entity>> {
        records
            .into_iter()
            .map(|record| serializer::unserialize_record(record, mapper.class()))
            .collect()
    }

    fn insert(&self, class: &ClassName, attributes: Attributes) -> Result<RecordId, DataSourceError>;

    fn update(
        &self,
        class: &ClassName,
        id: &RecordId,
        attributes: Attributes,
    ) -> Result<(), DataSourceError>;

    fn increment(
        &self,
        class: &ClassName,
        id: &RecordId,
        attribute: &str,
        delta: i64,
    ) -> Result<(), DataSourceError>;

    fn delete(&self, class: &ClassName, id: &RecordId) -> Result<(), DataSourceError>;
}

impl<S> DataSource for Arc<S>
where
    S: DataSource + ?Sized,
{
    fn retrieve(
        &self,
        class: &ClassName,
        criteria: &Query,
        options: &RetrieveOptions,
    ) -> Result<Vec<RawRecord>, DataSourceError> {
        (**self).retrieve(class, criteria, options)
    }

    fn unserialize(&self, records: Vec<RawRecord>, mapper: &Mapper) -> PersistResult<Vec<Entity>> {
        (**self).unserialize(records, mapper)
    }

    fn insert(&self, class: &ClassName, attributes: Attributes) -> Result<RecordId, DataSourceError> {
        (**self).insert(class, attributes)
    }

    fn update(
        &self,
        class: &ClassName,
        id: &RecordId,
        attributes: Attributes,
    ) -> Result<(), DataSourceError> {
        (**self).update(class, id, attributes)
    }

    fn increment(
        &self,
        class: &ClassName,
        id: &RecordId,
        attribute: &str,
        delta: i64,
    ) -> Result<(), DataSourceError> {
        (**self).increment(class, id, attribute, delta)
    }

    fn delete(&self, class: &ClassName, id: &RecordId) -> Result<(), DataSourceError> {
        (**self).delete(class, id)
    }
}
