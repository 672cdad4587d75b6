//! # dnspipe Forward Plugin
//!
//! Carries the upstream exchange for a query: every configured upstream is
//! raced in parallel and the first reply wins. With `deduplicate` on,
//! fingerprint-identical queries share a single in-flight exchange.
//!
//! Failures never escape this plugin. An upstream problem is answered with
//! a synthesized SERVFAIL so a transient outage degrades the response
//! instead of poisoning the client's transport.

pub mod error;
mod singleflight;
pub mod upstream;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use hickory_proto::op::Message;
use log::{debug, warn};
use serde::Deserialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::handler::error::{HandlerError, Result};
use crate::handler::{decode_args, Executable, Plugin, QueryContext, SharedPluginRegistry};
use crate::utils::{message_key, servfail_reply};

use error::ExchangeError;
use singleflight::SingleFlight;
use upstream::{Exchanger, Upstream, UpstreamEntry};

/// The plugin kind string for forwarders.
pub const KIND: &str = "forward";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ForwardArgs {
    pub upstream: Vec<UpstreamEntry>,
    /// Seconds; 0 means the 10s default.
    pub timeout: u64,
    pub insecure_skip_verify: bool,
    pub bootstrap: Vec<String>,
    pub deduplicate: bool,
}

/// Initializer registered under [`KIND`].
pub fn init(
    tag: &str,
    args: serde_yaml::Value,
    _registry: &SharedPluginRegistry,
) -> Result<Arc<dyn Plugin>> {
    let args: ForwardArgs = decode_args(tag, args)?;
    if args.upstream.is_empty() {
        return Err(HandlerError::invalid_args(tag, "no upstream is configured"));
    }

    let mut upstreams: Vec<Arc<dyn Exchanger>> = Vec::with_capacity(args.upstream.len());
    for entry in &args.upstream {
        if entry.addr.is_empty() {
            return Err(HandlerError::invalid_args(tag, "missing upstream address"));
        }
        upstreams.push(Arc::new(Upstream::build(tag, entry, &args)?));
    }

    Ok(Arc::new(Forwarder::new(tag, upstreams, args.deduplicate)))
}

pub struct Forwarder {
    tag: String,
    upstreams: Vec<Arc<dyn Exchanger>>,
    deduplicate: bool,
    inflight: SingleFlight,
}

impl Forwarder {
    pub(crate) fn new(tag: &str, upstreams: Vec<Arc<dyn Exchanger>>, deduplicate: bool) -> Self {
        Self {
            tag: tag.to_string(),
            upstreams,
            deduplicate,
            inflight: SingleFlight::new(),
        }
    }

    /// Issue `query` to every upstream concurrently; first reply wins and
    /// the rest are cancelled. If all fail, the last failure is returned.
    async fn race(&self, query: &Message) -> std::result::Result<Message, ExchangeError> {
        let mut exchanges = JoinSet::new();
        for upstream in &self.upstreams {
            let upstream = Arc::clone(upstream);
            let query = query.clone();
            exchanges.spawn(async move {
                let result = upstream.exchange(&query).await;
                if let Err(err) = &result {
                    debug!("upstream {} failed: {err}", upstream.name());
                }
                result
            });
        }

        let mut last_err = None;
        while let Some(joined) = exchanges.join_next().await {
            match joined {
                Ok(Ok(reply)) => {
                    exchanges.abort_all();
                    return Ok(reply);
                }
                Ok(Err(err)) => last_err = Some(err),
                Err(join_err) => last_err = Some(ExchangeError::Join(join_err)),
            }
        }
        Err(last_err.unwrap_or(ExchangeError::NoReply))
    }

    async fn exchange(&self, query: &Message) -> std::result::Result<Message, ExchangeError> {
        if !self.deduplicate {
            return self.race(query).await;
        }

        let key = message_key(query)?;
        let (outcome, shared) = self.inflight.run(key, || self.race(query)).await;
        match outcome {
            Ok(reply) => {
                // The published reply is aliased by every waiter; take an
                // owned copy before touching the id.
                let mut reply = Arc::try_unwrap(reply).unwrap_or_else(|arc| (*arc).clone());
                if shared {
                    reply.set_id(query.id());
                }
                Ok(reply)
            }
            Err(err) => Err(ExchangeError::from(err)),
        }
    }
}

impl Plugin for Forwarder {
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
impl Executable for Forwarder {
    /// Forward the context's query and set the reply as its response.
    ///
    /// Always returns success at this interface: upstream failures are
    /// visible in the response (SERVFAIL), not as a plugin error.
    async fn execute(&self, token: &CancellationToken, qctx: &mut QueryContext) -> Result<()> {
        if qctx.query().queries().is_empty() {
            return Ok(());
        }

        let exchanged = tokio::select! {
            result = self.exchange(qctx.query()) => result,
            _ = token.cancelled() => Err(ExchangeError::Cancelled),
        };

        match exchanged {
            Ok(reply) => qctx.set_response(reply),
            Err(err) => {
                warn!("{qctx}: upstream failed: {err}");
                qctx.set_response(servfail_reply(qctx.query()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
