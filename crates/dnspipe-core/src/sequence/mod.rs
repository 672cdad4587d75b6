//! # dnspipe Sequence Router
//!
//! The structured DSL evaluator at the heart of the router: a sequence walks
//! its parsed nodes against one query context, evaluating if-block
//! predicates through registered matchers and invoking executables by tag.
//!
//! `goto` is a transfer, not a call: once a node emits a goto tag, the
//! sequence resolves it as an executable and control never returns here.
//! Transfers between sequences stay on one loop rather than the call stack,
//! and the chain is capped so a cycle in the configured graph terminates
//! with an error instead of spinning.

pub mod parse;

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::handler::error::{HandlerError, Result};
use crate::handler::{
    decode_args, Executable, Plugin, QueryContext, SharedPluginRegistry,
};

pub use parse::{Condition, IfBlock, Node};

/// The plugin kind string for sequences.
pub const KIND: &str = "sequence";

/// Upper bound on goto transfers for a single query.
const MAX_TRANSFER_HOPS: usize = 64;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SequenceArgs {
    pub exec: Vec<serde_yaml::Value>,
    pub next: Option<String>,
}

/// Initializer registered under [`KIND`].
pub fn init(
    tag: &str,
    args: serde_yaml::Value,
    registry: &SharedPluginRegistry,
) -> Result<Arc<dyn Plugin>> {
    let args: SequenceArgs = decode_args(tag, args)?;
    if args.exec.is_empty() {
        return Err(HandlerError::invalid_args(tag, "empty exec sequence"));
    }
    let nodes = parse::parse_nodes(tag, &args.exec)?;
    Ok(Arc::new(SequenceRouter::new(tag, nodes, args.next, registry.clone())))
}

/// A configured sequence of executable nodes.
pub struct SequenceRouter {
    tag: String,
    nodes: Vec<Node>,
    next: Option<String>,
    registry: SharedPluginRegistry,
}

impl SequenceRouter {
    pub fn new(
        tag: &str,
        nodes: Vec<Node>,
        next: Option<String>,
        registry: SharedPluginRegistry,
    ) -> Self {
        Self { tag: tag.to_string(), nodes, next, registry }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Walk own nodes, then follow goto transfers until some target
    /// finishes cleanly. Errors come back unattributed; `execute` adds this
    /// sequence's tag.
    async fn run(&self, token: &CancellationToken, qctx: &mut QueryContext) -> Result<()> {
        let mut pending = self.step(token, qctx).await?;
        let mut hops = 0usize;
        while let Some(goto) = pending.take() {
            hops += 1;
            if hops > MAX_TRANSFER_HOPS {
                return Err(HandlerError::TransferLimit { tag: self.tag.clone() });
            }

            let handle = self.registry.get_executable(&goto).await?;
            debug!("{qctx}: goto plugin {goto}");
            match handle.plugin().as_any().downcast_ref::<SequenceRouter>() {
                // Sequence-to-sequence transfers loop here instead of
                // stacking; a goto never returns to its origin.
                Some(seq) => {
                    pending = seq
                        .step(token, qctx)
                        .await
                        .map_err(|e| HandlerError::wrap(seq.tag.as_str(), e))?;
                }
                None => return handle.execute(token, qctx).await,
            }
        }
        Ok(())
    }

    /// One full walk of this sequence's nodes, yielding the outbound
    /// transfer tag if any. A clean walk falls through to the configured
    /// `next` tag.
    async fn step(
        &self,
        token: &CancellationToken,
        qctx: &mut QueryContext,
    ) -> Result<Option<String>> {
        let goto = self.walk(token, qctx, &self.nodes).await?;
        Ok(goto.or_else(|| self.next.clone()))
    }

    /// Walk `nodes` in program order, polling the cancellation token
    /// between nodes. Returns the first goto emitted, which short-circuits
    /// the rest of the walk.
    fn walk<'a>(
        &'a self,
        token: &'a CancellationToken,
        qctx: &'a mut QueryContext,
        nodes: &'a [Node],
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + 'a>> {
        Box::pin(async move {
            for node in nodes {
                if token.is_cancelled() {
                    return Err(HandlerError::Cancelled);
                }
                match node {
                    Node::Plugin(tag) => {
                        let handle = self.registry.get_executable(tag).await?;
                        debug!("{qctx}: exec plugin {tag}");
                        handle.execute(token, qctx).await?;
                    }
                    Node::If(block) => {
                        if let Some(goto) = self.exec_block(token, qctx, block).await? {
                            return Ok(Some(goto));
                        }
                    }
                }
            }
            Ok(None)
        })
    }

    /// Evaluate an if-block. Predicates are ORed left-to-right: the first
    /// matcher whose (possibly negated) result is true wins and the body
    /// runs. An empty predicate list always runs the body.
    async fn exec_block(
        &self,
        token: &CancellationToken,
        qctx: &mut QueryContext,
        block: &IfBlock,
    ) -> Result<Option<String>> {
        let mut hit = true;
        for cond in &block.conditions {
            let matcher = self.registry.get_matcher(&cond.tag).await?;
            let matched = matcher.is_match(token, qctx).await?;
            debug!("{qctx}: exec matcher plugin {}, returned: {matched}", cond.tag);
            hit = matched != cond.negated;
            if hit {
                break;
            }
        }
        if !hit {
            return Ok(None);
        }

        let goto = self.walk(token, qctx, &block.body).await?;
        if goto.is_some() {
            return Ok(goto);
        }
        Ok(block.goto.clone())
    }
}

impl Plugin for SequenceRouter {
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
impl Executable for SequenceRouter {
    async fn execute(&self, token: &CancellationToken, qctx: &mut QueryContext) -> Result<()> {
        self.run(token, qctx)
            .await
            .map_err(|e| HandlerError::wrap(self.tag.as_str(), e))
    }
}

#[cfg(test)]
mod tests;
