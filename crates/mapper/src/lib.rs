//! `docmap-mapper`: the persistence core of the document mapper.
//!
//! A [`Mapper`] turns [`Entity`](docmap_core::Entity) handles into partial
//! updates against a pluggable [`DataSource`], and turns raw records back into
//! entities through a lazy [`Retrieval`] that deduplicates instances via an
//! [`IdentityMap`].
//!
//! Flow of a typical request:
//!
//! 1. obtain a mapper from a [`MapperRegistry`] (`registry.mapper_for(&class)`)
//! 2. `insert` / `find` stamp an id and capture an attribute snapshot
//! 3. `save` diffs the entity against its snapshot and sends only the changes
//! 4. references to other entities are stored as [`Reference`](docmap_core::Reference)s
//!    and resolved through the registry on demand

pub mod config;
pub mod data_source;
pub mod dirty;
pub mod identity_map;
pub mod mapper;
pub mod mapping;
pub mod query;
pub mod registry;
pub mod retrieval;
pub mod serializer;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigError, MapperConfig};
pub use data_source::{DataSource, RawRecord, RetrieveOptions, SortDirection};
pub use dirty::DirtyTracker;
pub use identity_map::IdentityMap;
pub use mapper::Mapper;
pub use mapping::{AttributeMapping, ClassMapping};
pub use query::{Condition, Operator, Query};
pub use registry::{MapperRegistry, Registry};
pub use retrieval::Retrieval;
