//! `docmap-core`: building blocks shared by the mapper and its data sources.
//!
//! This crate contains **no storage logic**: identifiers, attribute values, the
//! entity handle, references and the error model.

pub mod entity;
pub mod error;
pub mod id;
pub mod reference;
pub mod value;

pub use entity::Entity;
pub use error::{DataSourceError, PersistError, PersistResult};
pub use id::{ClassName, RecordId};
pub use reference::Reference;
pub use value::{attributes_from_json, Attributes, Value};
