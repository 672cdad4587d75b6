//! Exchange failures, confined to the forward plugin.
//!
//! Nothing in here escapes [`Forwarder::execute`](super::Forwarder): every
//! variant ends up as a SERVFAIL response plus a log line.

use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Proto(#[from] hickory_proto::error::ProtoError),

    #[error("upstream timed out")]
    Timeout,

    #[error("http exchange failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bootstrap resolution failed: {0}")]
    Resolve(#[from] hickory_resolver::error::ResolveError),

    #[error("no address known for upstream host '{0}'")]
    NoAddress(String),

    #[error("invalid TLS server name '{0}'")]
    ServerName(String),

    #[error("no upstream produced a reply")]
    NoReply,

    #[error("deduplicated exchange was abandoned by its initiator")]
    Interrupted,

    #[error("query cancelled")]
    Cancelled,

    #[error("exchange task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Shared(Arc<ExchangeError>),
}

impl From<Arc<ExchangeError>> for ExchangeError {
    fn from(err: Arc<ExchangeError>) -> Self {
        ExchangeError::Shared(err)
    }
}
