//! Pipe context: the continuation handle pipeline plugins see.

use log::debug;
use tokio_util::sync::CancellationToken;

use crate::handler::context::QueryContext;
use crate::handler::error::{HandlerError, Result};
use crate::handler::registry::SharedPluginRegistry;

/// Walks an ordered tag list, giving each plugin a view of the plugins
/// after it.
///
/// Plain executables run in order. A plugin carrying the piped capability
/// instead receives this context and decides when to run the rest of the
/// pipe via [`exec_next`](PipeContext::exec_next), which is what lets it
/// wrap the tail middleware-style (run the suffix, then post-process the
/// response it produced).
pub struct PipeContext {
    tags: Vec<String>,
    next: usize,
    registry: SharedPluginRegistry,
}

impl PipeContext {
    pub fn new(tags: Vec<String>, registry: SharedPluginRegistry) -> Self {
        Self { tags, next: 0, registry }
    }

    /// The tags not yet executed.
    pub fn remaining(&self) -> &[String] {
        &self.tags[self.next.min(self.tags.len())..]
    }

    /// Execute the remaining plugins in order. Returns once the pipe is
    /// exhausted or a piped plugin has taken over the tail.
    pub async fn exec_next(
        &mut self,
        token: &CancellationToken,
        qctx: &mut QueryContext,
    ) -> Result<()> {
        while self.next < self.tags.len() {
            if token.is_cancelled() {
                return Err(HandlerError::Cancelled);
            }
            let tag = self.tags[self.next].clone();
            self.next += 1;

            let handle = self.registry.get_executable(&tag).await?;
            debug!("{qctx}: exec plugin {tag}");
            if let Some(piped) = handle.plugin().as_piped() {
                // The plugin drives the rest of the pipe itself.
                return piped.execute_piped(token, qctx, self).await;
            }
            handle.execute(token, qctx).await?;
        }
        Ok(())
    }
}
