//! # dnspipe Pipeline Router
//!
//! The chain-style alternative to [`sequence`](crate::sequence): a fixed,
//! ordered tag list with no branching and no goto. Each plugin sees the
//! remaining suffix through a [`PipeContext`], and a plugin carrying the
//! piped capability may take over the tail to act as middleware.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::handler::error::{HandlerError, Result};
use crate::handler::{
    decode_args, Executable, PipeContext, Plugin, QueryContext, SharedPluginRegistry,
};

/// The plugin kind string for pipelines.
pub const KIND: &str = "pipeline";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PipelineArgs {
    pub pipe: Vec<String>,
}

/// Initializer registered under [`KIND`].
pub fn init(
    tag: &str,
    args: serde_yaml::Value,
    registry: &SharedPluginRegistry,
) -> Result<Arc<dyn Plugin>> {
    let args: PipelineArgs = decode_args(tag, args)?;
    if args.pipe.is_empty() {
        return Err(HandlerError::invalid_args(tag, "empty pipeline"));
    }
    Ok(Arc::new(PipelineRouter::new(tag, args.pipe, registry.clone())))
}

pub struct PipelineRouter {
    tag: String,
    pipe: Vec<String>,
    registry: SharedPluginRegistry,
}

impl PipelineRouter {
    pub fn new(tag: &str, pipe: Vec<String>, registry: SharedPluginRegistry) -> Self {
        Self { tag: tag.to_string(), pipe, registry }
    }

    pub fn pipe(&self) -> &[String] {
        &self.pipe
    }
}

impl Plugin for PipelineRouter {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl Executable for PipelineRouter {
    async fn execute(&self, token: &CancellationToken, qctx: &mut QueryContext) -> Result<()> {
        let mut pipe = PipeContext::new(self.pipe.clone(), self.registry.clone());
        pipe.exec_next(token, qctx)
            .await
            .map_err(|e| HandlerError::wrap(self.tag.as_str(), e))
    }
}

#[cfg(test)]
mod tests;
