//! # dnspipe Handler
//!
//! The plugin contracts and the infrastructure every router builds on.
//!
//! - **[`Plugin`]**: a named, registered processing unit. A plugin declares
//!   its capabilities by overriding the `as_*` accessors; the same instance
//!   may be both a matcher and an executable.
//! - **[`Matcher`]** / **[`Executable`]**: the two capability contracts. A
//!   matcher is a predicate over a query context; an executable mutates the
//!   context, typically by setting the response.
//! - **[`PipedExecutable`]**: the middleware-flavored variant used by the
//!   pipeline router, which hands the plugin the remaining pipe suffix.
//! - **[`QueryContext`](context::QueryContext)**: the per-query envelope.
//! - **[`PluginRegistry`](registry::PluginRegistry)**: tag → plugin, with
//!   capability-checked lookups and the `_end` sentinel preinstalled.
//! - **[`PluginFactory`](factory::PluginFactory)**: plugin-kind → initializer
//!   table used at config-load time.

pub mod context;
pub mod error;
pub mod factory;
pub mod pipe;
pub mod registry;
pub(crate) mod weak;

#[cfg(test)]
mod tests;

use std::any::Any;
use std::fmt;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use error::Result;

pub use context::QueryContext;
pub use error::{Capability, HandlerError};
pub use factory::{decode_args, PluginFactory, PluginInit};
pub use pipe::PipeContext;
pub use registry::{ExecutableHandle, MatcherHandle, PluginRegistry, SharedPluginRegistry};

/// A named, registered processing unit.
///
/// Capability accessors default to `None`; implementations that carry a
/// capability override the accessor to return `Some(self)`.
pub trait Plugin: Send + Sync {
    /// The unique tag this plugin is registered under.
    fn tag(&self) -> &str;

    /// The plugin kind, as used in configuration (`"sequence"`, `"forward"`, ...).
    fn kind(&self) -> &'static str;

    fn as_matcher(&self) -> Option<&dyn Matcher> {
        None
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        None
    }

    fn as_piped(&self) -> Option<&dyn PipedExecutable> {
        None
    }

    /// Concrete-type escape hatch; routers use it to keep goto transfers
    /// between sequences on one loop instead of the call stack.
    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("dyn Plugin").field(&self.tag()).finish()
    }
}

/// A pure predicate over a query context.
///
/// Matchers may read the context (and its scratch map) but must not set the
/// response unless they also carry the executable capability.
#[async_trait]
pub trait Matcher: Send + Sync {
    async fn is_match(&self, token: &CancellationToken, qctx: &mut QueryContext) -> Result<bool>;
}

/// A side-effecting transformer of a query context.
#[async_trait]
pub trait Executable: Send + Sync {
    async fn execute(&self, token: &CancellationToken, qctx: &mut QueryContext) -> Result<()>;
}

/// An executable that participates in a pipeline as middleware: it receives
/// the [`PipeContext`] holding the plugins after it and decides when (and
/// whether) to run them via [`PipeContext::exec_next`].
#[async_trait]
pub trait PipedExecutable: Send + Sync {
    async fn execute_piped(
        &self,
        token: &CancellationToken,
        qctx: &mut QueryContext,
        pipe: &mut PipeContext,
    ) -> Result<()>;
}
