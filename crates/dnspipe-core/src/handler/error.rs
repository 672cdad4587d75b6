//! # dnspipe Handler Errors
//!
//! Defines [`HandlerError`], the failure vocabulary shared by the registry,
//! the routers and every plugin contract.
//!
//! Errors surface up the executor unchanged, accreting plugin tags through
//! [`HandlerError::Plugin`] as they cross sequence boundaries. Cancellation
//! is deliberately exempt from wrapping so callers can always distinguish
//! "the query was abandoned" from "a plugin misbehaved".

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A plugin initializer rejected its configuration.
    #[error("invalid args for plugin '{tag}': {message}")]
    InvalidArgs { tag: String, message: String },

    /// No plugin is registered under the requested tag.
    #[error("plugin not found: '{tag}'")]
    NotFound { tag: String },

    /// The tag resolved, but the plugin lacks the requested capability.
    #[error("plugin '{tag}' is not {capability}")]
    CapabilityMissing { tag: String, capability: Capability },

    /// A matcher or executable failed; carries the tag of the plugin that
    /// originated the failure.
    #[error("plugin '{tag}' failed: {source}")]
    Plugin {
        tag: String,
        #[source]
        source: Box<HandlerError>,
    },

    /// The ambient cancellation token fired.
    #[error("query cancelled")]
    Cancelled,

    /// A goto chain exceeded the transfer cap, which is how runaway cycles
    /// in the configured graph surface at runtime.
    #[error("plugin '{tag}' exceeded the goto transfer limit")]
    TransferLimit { tag: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Proto(#[from] hickory_proto::error::ProtoError),

    #[error("{0}")]
    Other(String),
}

impl HandlerError {
    /// Attribute `err` to the plugin `tag`. Cancellation passes through
    /// untouched; everything else is wrapped so operators can trace a
    /// failure back through the routers that carried it.
    pub fn wrap(tag: impl Into<String>, err: HandlerError) -> HandlerError {
        match err {
            HandlerError::Cancelled => HandlerError::Cancelled,
            other => HandlerError::Plugin {
                tag: tag.into(),
                source: Box::new(other),
            },
        }
    }

    /// Shorthand for an [`HandlerError::InvalidArgs`] with a formatted message.
    pub fn invalid_args(tag: impl Into<String>, message: impl Into<String>) -> HandlerError {
        HandlerError::InvalidArgs {
            tag: tag.into(),
            message: message.into(),
        }
    }
}

/// The capabilities a plugin may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Matcher,
    Executable,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Matcher => write!(f, "a matcher"),
            Capability::Executable => write!(f, "executable"),
        }
    }
}

/// Shorthand for Result with [`HandlerError`].
pub type Result<T> = std::result::Result<T, HandlerError>;
