//! # dnspipe Router Config
//!
//! Declarative router configuration: a list of plugin declarations plus the
//! entry tag a listener hands queries to. File handling lives with the
//! caller; this module consumes an already-parsed document.

use serde::Deserialize;

use crate::handler::error::Result;
use crate::handler::{PluginFactory, SharedPluginRegistry};

/// The top-level router document.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub plugins: Vec<PluginConfig>,
    /// Tag of the executable queries enter through.
    pub entry: Option<String>,
}

/// One plugin declaration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub tag: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub args: serde_yaml::Value,
}

/// Initialize every declared plugin through `factory` and register it.
///
/// Declaration order does not matter: routers resolve the tags they
/// reference at execution time, not here.
pub async fn build_registry(
    config: &RouterConfig,
    factory: &PluginFactory,
) -> Result<SharedPluginRegistry> {
    let registry = SharedPluginRegistry::new();
    for declared in &config.plugins {
        let plugin = factory.init(&declared.kind, &declared.tag, declared.args.clone(), &registry)?;
        registry.register(plugin).await?;
    }
    Ok(registry)
}
