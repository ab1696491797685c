//! Mapper configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Env var overriding [`MapperConfig::default_per_page`].
pub const PER_PAGE_ENV: &str = "DOCMAP_PER_PAGE";
/// Env var overriding [`MapperConfig::identity_map`] (`true`/`false`).
pub const IDENTITY_MAP_ENV: &str = "DOCMAP_IDENTITY_MAP";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid mapper config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Settings shared by every mapper a registry hands out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Page size used by `Retrieval::page` until `per_page` overrides it.
    pub default_per_page: usize,
    /// Give each mapper its own identity map.
    pub identity_map: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            default_per_page: 20,
            identity_map: true,
        }
    }
}

impl MapperConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()
    }

    /// Defaults, overridden by `DOCMAP_PER_PAGE` / `DOCMAP_IDENTITY_MAP`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(PER_PAGE_ENV) {
            config.default_per_page = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: PER_PAGE_ENV,
                value: raw.clone(),
            })?;
        }

        if let Some(raw) = lookup(IDENTITY_MAP_ENV) {
            config.identity_map = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: IDENTITY_MAP_ENV,
                        value: raw,
                    });
                }
            };
        }

        config.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.default_per_page == 0 {
            return Err(ConfigError::Invalid {
                key: "default_per_page",
                value: "0".to_string(),
            });
        }
        Ok(self)
    }
}
