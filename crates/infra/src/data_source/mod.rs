//! Data source implementations.
//!
//! The mapper only depends on the `DataSource` trait from `docmap-mapper`;
//! this module provides concrete stores behind it.

pub mod in_memory;

pub use in_memory::{DataSourceStats, InMemoryDataSource};
