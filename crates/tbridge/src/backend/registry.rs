//! Runtime backend registry for engine selection by name.
//!
//! Managed boundaries never name a concrete backend type. Backend crates register a
//! constructor under one or more names, and boundaries build engines through
//! [`create_engine`] using the name from the caller or from [`BridgeConfig`].

use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

use super::spec::TensorBackend;
use crate::bridge::{CreationOps, TensorBridge};
use crate::env::BridgeConfig;

/// Factory producing a fresh engine, with its own handle registry, per call.
pub type EngineConstructor = Box<dyn Fn(&BridgeConfig) -> Box<dyn CreationOps> + Send + Sync>;

/// Global registry mapping backend names to engine constructors.
struct BackendRegistry {
    backends: RwLock<HashMap<String, EngineConstructor>>,
}

impl BackendRegistry {
    fn new() -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, name: String, constructor: EngineConstructor) {
        self.backends
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, constructor);
    }

    fn create(&self, name: &str, config: &BridgeConfig) -> Option<Box<dyn CreationOps>> {
        let registry = self.backends.read().unwrap_or_else(PoisonError::into_inner);
        let constructor = registry.get(name)?;
        Some(constructor(config))
    }

    fn list_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn has_backend(&self, name: &str) -> bool {
        self.backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

static GLOBAL_REGISTRY: OnceLock<BackendRegistry> = OnceLock::new();

fn global_registry() -> &'static BackendRegistry {
    GLOBAL_REGISTRY.get_or_init(BackendRegistry::new)
}

/// Registers an engine constructor by name, replacing any earlier registration.
pub fn register_backend<F>(name: impl Into<String>, constructor: F)
where
    F: Fn(&BridgeConfig) -> Box<dyn CreationOps> + Send + Sync + 'static,
{
    let name = name.into();
    tracing::debug!(backend = %name, "registered tensor backend");
    global_registry().register(name, Box::new(constructor));
}

/// Registers a concrete [`TensorBackend`], wrapping each instance in a [`TensorBridge`].
pub fn register_tensor_backend<B, F>(name: impl Into<String>, constructor: F)
where
    B: TensorBackend + 'static,
    F: Fn() -> B + Send + Sync + 'static,
{
    register_backend(name, move |config| {
        Box::new(TensorBridge::with_config(constructor(), config))
    });
}

/// Creates an engine by name; `None` if nothing is registered under `name`.
pub fn create_engine(name: &str, config: &BridgeConfig) -> Option<Box<dyn CreationOps>> {
    global_registry().create(name, config)
}

/// Registered backend names, sorted.
pub fn list_backends() -> Vec<String> {
    global_registry().list_backends()
}

pub fn has_backend(name: &str) -> bool {
    global_registry().has_backend(name)
}
