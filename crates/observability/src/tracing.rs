//! Tracing/logging initialization.
//!
//! The mapper emits `debug` events for skipped saves and identity-map hits,
//! `info` for writes and `warn` for rejected writes. Fields are `class`, `id`
//! and, for saves, the changed `attributes`.

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Explicit filter directive. `None` falls back to `RUST_LOG`, then `info`.
    pub filter: Option<String>,
    /// JSON lines when true, human-readable output otherwise.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            filter: None,
            json: true,
        }
    }
}

impl ObservabilityConfig {
    fn env_filter(&self) -> EnvFilter {
        match &self.filter {
            Some(directive) => {
                EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
            }
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        }
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    init_with(&ObservabilityConfig::default());
}

/// Install a global subscriber built from `config`.
///
/// Returns false when a subscriber was already installed.
pub fn init_with(config: &ObservabilityConfig) -> bool {
    let filter = config.env_filter();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_logs_json() {
        let config = ObservabilityConfig::default();
        assert!(config.json);
        assert!(config.filter.is_none());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ObservabilityConfig =
            serde_json::from_str(r#"{"filter": "docmap_mapper=debug"}"#).unwrap();
        assert_eq!(config.filter.as_deref(), Some("docmap_mapper=debug"));
        assert!(config.json);
    }

    #[test]
    fn second_init_is_a_no_op() {
        init();
        assert!(!init_with(&ObservabilityConfig::default()));
    }
}
