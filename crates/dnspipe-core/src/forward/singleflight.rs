//! At-most-one in-flight exchange per message fingerprint.
//!
//! This is coordination, not caching: the key is released the moment its
//! flight completes (or is abandoned), so an identical query arriving after
//! completion issues a fresh exchange.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use hickory_proto::op::Message;
use tokio::sync::watch;

use super::error::ExchangeError;

/// The shared result of one flight. Replies are published behind `Arc` and
/// must be treated as immutable; callers clone before touching the id.
pub(crate) type Outcome = Result<Arc<Message>, Arc<ExchangeError>>;

pub(crate) struct SingleFlight {
    inflight: Mutex<HashMap<Vec<u8>, watch::Receiver<Option<Outcome>>>>,
}

enum Role {
    Leader(watch::Sender<Option<Outcome>>),
    Follower(watch::Receiver<Option<Outcome>>),
}

impl SingleFlight {
    pub fn new() -> Self {
        Self { inflight: Mutex::new(HashMap::new()) }
    }

    /// Run `work` under `key`. The first caller for a key becomes the
    /// leader and actually runs the future; concurrent callers with the
    /// same key wait and share the leader's outcome. The returned flag is
    /// true when the outcome came from another caller's flight.
    pub async fn run<F, Fut>(&self, key: Vec<u8>, work: F) -> (Outcome, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Message, ExchangeError>>,
    {
        let role = {
            let mut inflight = self.lock();
            match inflight.get(&key) {
                Some(rx) => Role::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(key.clone(), rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Leader(tx) => {
                // The guard evicts the key even if this future is dropped
                // mid-exchange, so followers never latch onto a dead flight.
                let mut guard = FlightGuard { flights: self, key: Some(key) };
                let outcome: Outcome = match work().await {
                    Ok(reply) => Ok(Arc::new(reply)),
                    Err(err) => Err(Arc::new(err)),
                };
                guard.release();
                let _ = tx.send(Some(outcome.clone()));
                (outcome, false)
            }
            Role::Follower(mut rx) => loop {
                if let Some(outcome) = rx.borrow_and_update().clone() {
                    return (outcome, true);
                }
                if rx.changed().await.is_err() {
                    return (Err(Arc::new(ExchangeError::Interrupted)), true);
                }
            },
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Vec<u8>, watch::Receiver<Option<Outcome>>>> {
        self.inflight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct FlightGuard<'a> {
    flights: &'a SingleFlight,
    key: Option<Vec<u8>>,
}

impl FlightGuard<'_> {
    /// Drop the key ahead of publication; later identical queries start
    /// their own flight.
    fn release(&mut self) {
        if let Some(key) = self.key.take() {
            self.flights.lock().remove(&key);
        }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
