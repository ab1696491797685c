//! Class to mapper lookup.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use docmap_core::{ClassName, PersistError, PersistResult};

use crate::config::MapperConfig;
use crate::data_source::DataSource;
use crate::identity_map::IdentityMap;
use crate::mapper::Mapper;
use crate::mapping::ClassMapping;

/// Capability to obtain a mapper for a class.
///
/// Used to resolve references and to insert referenced entities that were
/// never saved. Injected into each mapper; tests substitute their own.
pub trait MapperRegistry: Send + Sync {
    fn mapper_for(&self, class: &ClassName) -> PersistResult<Mapper>;
}

impl<R> MapperRegistry for Arc<R>
where
    R: MapperRegistry + ?Sized,
{
    fn mapper_for(&self, class: &ClassName) -> PersistResult<Mapper> {
        (**self).mapper_for(class)
    }
}

struct RegistryInner {
    data_source: Arc<dyn DataSource>,
    mappings: RwLock<HashMap<ClassName, Arc<ClassMapping>>>,
    config: MapperConfig,
}

/// Registry over one data source.
///
/// Every `mapper_for` call builds a fresh mapper with its own snapshots and
/// (unless disabled in [`MapperConfig`]) its own identity map. Cloning the
/// registry is cheap and shares the registered mappings.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    pub fn new(data_source: Arc<dyn DataSource>) -> Self {
        Self::with_config(data_source, MapperConfig::default())
    }

    pub fn with_config(data_source: Arc<dyn DataSource>, config: MapperConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                data_source,
                mappings: RwLock::new(HashMap::new()),
                config,
            }),
        }
    }

    /// Register (or replace) the mapping for its class.
    pub fn register(&self, mapping: ClassMapping) -> &Self {
        let mut mappings = self
            .inner
            .mappings
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        mappings.insert(mapping.class().clone(), Arc::new(mapping));
        self
    }

    pub fn mapping_for(&self, class: &ClassName) -> Option<Arc<ClassMapping>> {
        let mappings = self
            .inner
            .mappings
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        mappings.get(class).cloned()
    }

    pub fn config(&self) -> &MapperConfig {
        &self.inner.config
    }

    /// Mapper for `class` bound to a caller-owned identity map, e.g. one per
    /// request shared across classes.
    pub fn scoped_mapper_for(
        &self,
        class: &ClassName,
        identity_map: Arc<IdentityMap>,
    ) -> PersistResult<Mapper> {
        Ok(self.mapper_for(class)?.with_identity_map(identity_map))
    }
}

impl MapperRegistry for Registry {
    fn mapper_for(&self, class: &ClassName) -> PersistResult<Mapper> {
        let mapping = self
            .mapping_for(class)
            .ok_or_else(|| PersistError::UnknownClass(class.clone()))?;
        Ok(Mapper::new(
            mapping,
            self.inner.data_source.clone(),
            Arc::new(self.clone()),
        )
        .with_config(self.inner.config.clone()))
    }
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mappings = self
            .inner
            .mappings
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Registry")
            .field("classes", &mappings.keys().collect::<Vec<_>>())
            .field("config", &self.inner.config)
            .finish()
    }
}
