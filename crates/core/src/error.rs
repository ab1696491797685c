//! Persistence error model.

use thiserror::Error;

use crate::id::{ClassName, RecordId};

/// Result type used across the mapper layer.
pub type PersistResult<T> = Result<T, PersistError>;

/// Failure reported by a data source primitive.
///
/// The mapper never retries these; they surface to the caller wrapped in
/// [`PersistError::Persistence`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataSourceError {
    /// The addressed record does not exist in the store.
    #[error("record not found: {class}#{id}")]
    NotFound { class: ClassName, id: RecordId },

    /// The store refused the write (constraint violation, bad operand, ...).
    #[error("write rejected: {0}")]
    Rejected(String),

    /// The store could not be reached.
    #[error("data source unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be interpreted.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl DataSourceError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }
}

/// Mapper-level error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PersistError {
    /// No record matches the requested id.
    #[error("{class} not found: {id}")]
    NotFound { class: ClassName, id: RecordId },

    /// The data source rejected an operation. Propagated unchanged.
    #[error("persistence failure: {0}")]
    Persistence(#[from] DataSourceError),

    /// An operation that needs a persisted entity got one without an id.
    #[error("cannot {operation} {class}: entity has never been inserted")]
    PrecursorMissing {
        class: ClassName,
        operation: &'static str,
    },

    /// Insert called on an entity that already carries an id.
    #[error("{class} already persisted as {id}")]
    AlreadyPersisted { class: ClassName, id: RecordId },

    /// Unsaved entities reference each other (or themselves), so none of
    /// them can be inserted first.
    #[error("cannot insert {class}: unsaved entities reference each other in a cycle")]
    CyclicReference { class: ClassName },

    /// No mapping registered for a class.
    #[error("no mapper registered for class {0}")]
    UnknownClass(ClassName),

    /// An entity was handed to a mapper for another class.
    #[error("class mismatch: mapper handles {expected}, entity is {actual}")]
    ClassMismatch {
        expected: ClassName,
        actual: ClassName,
    },

    /// A numeric delta was applied to a non-numeric attribute.
    #[error("attribute {attribute} is not numeric")]
    NotNumeric { attribute: String },

    /// An identifier failed validation.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl PersistError {
    pub fn not_found(class: &ClassName, id: &RecordId) -> Self {
        Self::NotFound {
            class: class.clone(),
            id: id.clone(),
        }
    }

    pub fn precursor_missing(class: &ClassName, operation: &'static str) -> Self {
        Self::PrecursorMissing {
            class: class.clone(),
            operation,
        }
    }

    pub fn not_numeric(attribute: impl Into<String>) -> Self {
        Self::NotNumeric {
            attribute: attribute.into(),
        }
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
