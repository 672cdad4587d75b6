//! Per-query context: the mutable envelope a query travels in.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use hickory_proto::op::Message;

/// Process-wide sequence for log correlation ids.
static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

/// The per-query envelope carrying the request, the response once some
/// executable has produced one, and scratch state plugins share within a
/// single query.
///
/// A context is hand-off style: it is owned by exactly one executor at a
/// time and carries no internal synchronization. The query message is always
/// present; its transaction id is preserved end-to-end, so a response
/// delivered to the client answers with the id the client sent.
pub struct QueryContext {
    query: Message,
    response: Option<Message>,
    from: Option<SocketAddr>,
    id: u64,
    scratch: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl QueryContext {
    /// Wrap an inbound query. Assigns a fresh correlation id.
    pub fn new(query: Message) -> Self {
        Self {
            query,
            response: None,
            from: None,
            id: NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed),
            scratch: HashMap::new(),
        }
    }

    /// Wrap an inbound query together with its source address, which
    /// matchers may inspect.
    pub fn with_from(query: Message, from: SocketAddr) -> Self {
        let mut ctx = Self::new(query);
        ctx.from = Some(from);
        ctx
    }

    pub fn query(&self) -> &Message {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut Message {
        &mut self.query
    }

    pub fn response(&self) -> Option<&Message> {
        self.response.as_ref()
    }

    /// Install the outbound response, replacing any earlier one.
    pub fn set_response(&mut self, response: Message) {
        self.response = Some(response);
    }

    pub fn take_response(&mut self) -> Option<Message> {
        self.response.take()
    }

    pub fn from(&self) -> Option<SocketAddr> {
        self.from
    }

    /// The process-wide correlation id, distinct from the 16-bit DNS
    /// transaction id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stash a value for another plugin handling the same query.
    pub fn set_data<T: 'static + Send + Sync>(&mut self, key: &str, value: T) {
        self.scratch.insert(key.to_string(), Box::new(value));
    }

    pub fn get_data<T: 'static + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.scratch.get(key).and_then(|data| data.downcast_ref::<T>())
    }

    pub fn get_data_mut<T: 'static + Send + Sync>(&mut self, key: &str) -> Option<&mut T> {
        self.scratch.get_mut(key).and_then(|data| data.downcast_mut::<T>())
    }
}

impl fmt::Display for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query {} from ", self.id)?;
        match self.from {
            Some(addr) => write!(f, "{}", addr)?,
            None => write!(f, "unknown")?,
        }
        match self.query.queries().first() {
            Some(q) => write!(f, ": {} {}", q.name(), q.query_type()),
            None => write!(f, ": (no question)"),
        }
    }
}
