//! # dnspipe Core
//!
//! The core of the dnspipe DNS router: a per-query plugin pipeline engine
//! and the forwarding machinery it drives.
//!
//! A listener builds a [`QueryContext`](handler::QueryContext) for each
//! inbound DNS message and hands it to a named entry plugin resolved through
//! the [`SharedPluginRegistry`](handler::SharedPluginRegistry). The entry is
//! usually a [`sequence`] router, which walks a configured tree of plugin
//! invocations and conditional blocks, transferring control between
//! registered executables via `goto` tags. Somewhere along the way an
//! executable (typically [`forward`]) sets the response on the context, and
//! unwinding hands it back to the listener.
//!
//! Concrete listeners, caches and matcher collections live outside this
//! crate; the contracts they implement are in [`handler`].

pub mod config;
pub mod forward;
pub mod handler;
pub mod pipeline;
pub mod sequence;
pub mod utils;

pub use handler::error::HandlerError;
pub use handler::{
    Executable, Matcher, PipedExecutable, Plugin, PluginFactory, QueryContext,
    SharedPluginRegistry,
};
