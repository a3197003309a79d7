use std::env;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const BACKEND_VAR: &str = "TBRIDGE_BACKEND";
pub const MAX_HANDLES_VAR: &str = "TBRIDGE_MAX_HANDLES";
pub const LOG_VAR: &str = "TBRIDGE_LOG";

/// Backend used when neither the caller nor the environment names one.
pub const DEFAULT_BACKEND: &str = "cpu";

static FROM_ENV: OnceLock<BridgeConfig> = OnceLock::new();

/// Engine configuration shared by every boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub backend: Option<String>,
    pub max_handles: Option<usize>,
}

impl BridgeConfig {
    /// Configuration read from the process environment, cached after the first call.
    pub fn from_env() -> &'static BridgeConfig {
        FROM_ENV.get_or_init(|| Self::from_vars(|name| env::var(name).ok()))
    }

    /// Builds a configuration from an arbitrary variable lookup.
    ///
    /// Blank values count as unset; an unparsable handle limit is ignored with a warning.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let max_handles = read(MAX_HANDLES_VAR).and_then(|raw| match raw.parse::<usize>() {
            Ok(limit) => Some(limit),
            Err(err) => {
                tracing::warn!(value = %raw, error = %err, "ignoring {MAX_HANDLES_VAR}");
                None
            }
        });
        BridgeConfig {
            backend: read(BACKEND_VAR),
            max_handles,
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("failed to parse bridge configuration")
    }

    pub fn with_backend(mut self, name: impl Into<String>) -> Self {
        self.backend = Some(name.into());
        self
    }

    pub fn with_max_handles(mut self, limit: usize) -> Self {
        self.max_handles = Some(limit);
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.as_deref().unwrap_or(DEFAULT_BACKEND)
    }
}

/// Tracing filter directive from `TBRIDGE_LOG`, falling back to `RUST_LOG`.
pub fn log_directive() -> Option<String> {
    [LOG_VAR, "RUST_LOG"]
        .iter()
        .filter_map(|name| env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_to_cpu_without_limit() {
        let config = BridgeConfig::from_vars(lookup(&[]));
        assert_eq!(config.backend_name(), "cpu");
        assert_eq!(config.max_handles, None);
    }

    #[test]
    fn reads_backend_and_limit() {
        let config = BridgeConfig::from_vars(lookup(&[
            (BACKEND_VAR, " torch "),
            (MAX_HANDLES_VAR, "64"),
        ]));
        assert_eq!(config.backend_name(), "torch");
        assert_eq!(config.max_handles, Some(64));
    }

    #[test]
    fn bad_limit_is_ignored() {
        let config = BridgeConfig::from_vars(lookup(&[(MAX_HANDLES_VAR, "lots")]));
        assert_eq!(config.max_handles, None);
    }

    #[test]
    fn parses_json_and_rejects_unknown_fields() {
        let config = BridgeConfig::from_json(r#"{"backend": "cpu-ref", "max_handles": 8}"#).unwrap();
        assert_eq!(config, BridgeConfig::default().with_backend("cpu-ref").with_max_handles(8));
        assert!(BridgeConfig::from_json(r#"{"threads": 4}"#).is_err());
    }
}
