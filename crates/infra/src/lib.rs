//! Infrastructure layer: data source adapters behind the mapper's `DataSource` seam.

pub mod data_source;

#[cfg(test)]
mod integration_tests;

pub use data_source::{DataSourceStats, InMemoryDataSource};
