//! Plugin-kind → initializer table used at config-load time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::handler::error::{HandlerError, Result};
use crate::handler::registry::SharedPluginRegistry;
use crate::handler::Plugin;

/// A plugin initializer: `(tag, args, registry)` → running plugin.
///
/// Routers capture the registry handle so they can resolve tags at
/// execution time; plugins that never look anything up ignore it.
pub type PluginInit =
    fn(&str, serde_yaml::Value, &SharedPluginRegistry) -> Result<Arc<dyn Plugin>>;

/// Table of plugin initializers, keyed by the kind string used in config.
///
/// An explicit handle rather than a process global: tests build their own
/// tables, and the binary injects one when it loads a config.
pub struct PluginFactory {
    inits: HashMap<String, PluginInit>,
}

impl PluginFactory {
    /// An empty table.
    pub fn new() -> Self {
        Self { inits: HashMap::new() }
    }

    /// The table with every built-in kind preinstalled.
    pub fn with_defaults() -> Self {
        let mut factory = Self::new();
        factory.register_kind(crate::sequence::KIND, crate::sequence::init);
        factory.register_kind(crate::pipeline::KIND, crate::pipeline::init);
        factory.register_kind(crate::forward::KIND, crate::forward::init);
        factory
    }

    /// Register an initializer for `kind`, replacing any earlier one.
    pub fn register_kind(&mut self, kind: &str, init: PluginInit) {
        self.inits.insert(kind.to_string(), init);
    }

    pub fn contains_kind(&self, kind: &str) -> bool {
        self.inits.contains_key(kind)
    }

    /// Initialize a plugin of `kind` with the given tag and args.
    pub fn init(
        &self,
        kind: &str,
        tag: &str,
        args: serde_yaml::Value,
        registry: &SharedPluginRegistry,
    ) -> Result<Arc<dyn Plugin>> {
        let init = self.inits.get(kind).ok_or_else(|| {
            HandlerError::invalid_args(tag, format!("unknown plugin kind '{kind}'"))
        })?;
        init(tag, args, registry)
    }
}

impl Default for PluginFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for PluginFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<&String> = self.inits.keys().collect();
        f.debug_struct("PluginFactory").field("kinds", &kinds).finish()
    }
}

/// Decode plugin args from the raw config value.
///
/// Decoding is weak in the sense the initializer contract asks for: a null
/// or missing document decodes to the default, unknown keys are ignored,
/// and scalars coerce between string, number and bool (a quoted
/// `timeout: "5"` still decodes).
pub fn decode_args<T>(tag: &str, args: serde_yaml::Value) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if matches!(args, serde_yaml::Value::Null) {
        return Ok(T::default());
    }
    crate::handler::weak::from_value(args)
        .map_err(|e| HandlerError::invalid_args(tag, e.to_string()))
}
