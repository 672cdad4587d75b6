//! Message-level utilities shared by the forwarding core and listeners.

pub mod key;

pub use key::{message_key, servfail_reply};
