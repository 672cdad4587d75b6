//! Tag → plugin registry with capability-checked lookups.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::handler::context::QueryContext;
use crate::handler::error::{Capability, HandlerError, Result};
use crate::handler::{Executable, Plugin};

/// The reserved no-op tag sequences jump to when they are done.
pub const END_TAG: &str = "_end";

/// Registry mapping plugin tags to running instances.
///
/// Plugins register at program initialization and at config-load time; after
/// that the set only changes through [`SharedPluginRegistry::replace_all`].
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    /// Create a registry with the [`END_TAG`] sentinel preinstalled.
    pub fn new() -> Self {
        let mut plugins: HashMap<String, Arc<dyn Plugin>> = HashMap::new();
        plugins.insert(END_TAG.to_string(), Arc::new(EndSentinel));
        Self { plugins }
    }

    /// Insert a plugin under its tag. Re-registering the same instance is a
    /// no-op; a different instance under an occupied tag is refused.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let tag = plugin.tag().to_string();
        if let Some(existing) = self.plugins.get(&tag) {
            if Arc::ptr_eq(existing, &plugin) {
                return Ok(());
            }
            return Err(HandlerError::invalid_args(
                tag,
                "tag already registered by a different plugin instance",
            ));
        }
        self.plugins.insert(tag, plugin);
        Ok(())
    }

    pub fn get(&self, tag: &str) -> Result<Arc<dyn Plugin>> {
        self.plugins
            .get(tag)
            .cloned()
            .ok_or_else(|| HandlerError::NotFound { tag: tag.to_string() })
    }

    /// Look up `tag` and verify the matcher capability up front, so the
    /// failure surfaces at resolution rather than deep inside execution.
    pub fn get_matcher(&self, tag: &str) -> Result<MatcherHandle> {
        let plugin = self.get(tag)?;
        if plugin.as_matcher().is_none() {
            return Err(HandlerError::CapabilityMissing {
                tag: tag.to_string(),
                capability: Capability::Matcher,
            });
        }
        Ok(MatcherHandle(plugin))
    }

    /// Look up `tag` and verify the executable capability up front.
    pub fn get_executable(&self, tag: &str) -> Result<ExecutableHandle> {
        let plugin = self.get(tag)?;
        if plugin.as_executable().is_none() {
            return Err(HandlerError::CapabilityMissing {
                tag: tag.to_string(),
                capability: Capability::Executable,
            });
        }
        Ok(ExecutableHandle(plugin))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.plugins.contains_key(tag)
    }

    pub fn tags(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<&String> = self.plugins.keys().collect();
        f.debug_struct("PluginRegistry").field("plugins", &tags).finish()
    }
}

/// Thread-safe registry handle: many concurrent readers after the config
/// load phase, whole-set swap under reload.
#[derive(Clone)]
pub struct SharedPluginRegistry {
    inner: Arc<RwLock<PluginRegistry>>,
}

impl SharedPluginRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(PluginRegistry::new())),
        }
    }

    pub async fn register(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        self.inner.write().await.register(plugin)
    }

    pub async fn get(&self, tag: &str) -> Result<Arc<dyn Plugin>> {
        self.inner.read().await.get(tag)
    }

    pub async fn get_matcher(&self, tag: &str) -> Result<MatcherHandle> {
        self.inner.read().await.get_matcher(tag)
    }

    pub async fn get_executable(&self, tag: &str) -> Result<ExecutableHandle> {
        self.inner.read().await.get_executable(tag)
    }

    pub async fn contains(&self, tag: &str) -> bool {
        self.inner.read().await.contains(tag)
    }

    pub async fn tags(&self) -> Vec<String> {
        self.inner.read().await.tags()
    }

    /// Atomically replace the plugin set, as a config reload does. The
    /// [`END_TAG`] sentinel survives the swap.
    pub async fn replace_all(&self, mut next: PluginRegistry) {
        if !next.contains(END_TAG) {
            next.plugins.insert(END_TAG.to_string(), Arc::new(EndSentinel));
        }
        *self.inner.write().await = next;
    }
}

impl Default for SharedPluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SharedPluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedPluginRegistry").finish_non_exhaustive()
    }
}

/// Capability-checked handle to a registered matcher.
pub struct MatcherHandle(Arc<dyn Plugin>);

impl fmt::Debug for MatcherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MatcherHandle").field(&self.0.tag()).finish()
    }
}

impl MatcherHandle {
    pub fn tag(&self) -> &str {
        self.0.tag()
    }

    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.0
    }

    pub async fn is_match(
        &self,
        token: &CancellationToken,
        qctx: &mut QueryContext,
    ) -> Result<bool> {
        match self.0.as_matcher() {
            Some(m) => m.is_match(token, qctx).await,
            None => Err(HandlerError::CapabilityMissing {
                tag: self.0.tag().to_string(),
                capability: Capability::Matcher,
            }),
        }
    }
}

/// Capability-checked handle to a registered executable.
pub struct ExecutableHandle(Arc<dyn Plugin>);

impl fmt::Debug for ExecutableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExecutableHandle").field(&self.0.tag()).finish()
    }
}

impl ExecutableHandle {
    pub fn tag(&self) -> &str {
        self.0.tag()
    }

    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.0
    }

    pub async fn execute(&self, token: &CancellationToken, qctx: &mut QueryContext) -> Result<()> {
        match self.0.as_executable() {
            Some(e) => e.execute(token, qctx).await,
            None => Err(HandlerError::CapabilityMissing {
                tag: self.0.tag().to_string(),
                capability: Capability::Executable,
            }),
        }
    }
}

/// The `_end` sentinel: always registered, always a no-op.
struct EndSentinel;

impl Plugin for EndSentinel {
    fn tag(&self) -> &str {
        END_TAG
    }

    fn kind(&self) -> &'static str {
        "end"
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl Executable for EndSentinel {
    async fn execute(&self, _token: &CancellationToken, _qctx: &mut QueryContext) -> Result<()> {
        Ok(())
    }
}
