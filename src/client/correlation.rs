//! Matches responses to the requests that are waiting for them

use crate::error::{Error, Result};
use crate::protocol::{Message, MessageKey};
use std::collections::{HashMap, HashSet};
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Completion side of a pending request
pub type Waiter = oneshot::Sender<Result<Message>>;

#[derive(Debug)]
enum Slot {
    Waiting(Waiter),
    Arrived(Message),
}

/// Pending request table.
///
/// Each key holds either a registered waiter or an early response, never
/// both. Whichever side arrives second completes the pair and removes the
/// entry. Keys whose waiter gave up are remembered until their late reply
/// shows up, so that reply is dropped instead of held forever.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    slots: HashMap<MessageKey, Slot>,
    expired: HashSet<MessageKey>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `waiter` for `key`, completing it at once if the response
    /// is already here
    pub fn await_response(&mut self, key: MessageKey, waiter: Waiter) {
        match self.slots.remove(&key) {
            Some(Slot::Arrived(message)) => {
                trace!("Response {} was waiting for its request", key);
                complete(key, waiter, Ok(message));
            }
            Some(Slot::Waiting(previous)) => {
                // Message ids never repeat while an entry is live
                debug!("Replacing waiter already registered for {}", key);
                drop(previous);
                self.slots.insert(key, Slot::Waiting(waiter));
            }
            None => {
                self.slots.insert(key, Slot::Waiting(waiter));
            }
        }
    }

    /// Hand a decoded response to its waiter, or hold it until one registers
    pub fn deliver(&mut self, message: Message) {
        let key = message.key();
        if self.expired.remove(&key) {
            debug!("Dropping late {:?} response {}", message.command(), key);
            return;
        }
        match self.slots.remove(&key) {
            Some(Slot::Waiting(waiter)) => complete(key, waiter, Ok(message)),
            Some(Slot::Arrived(previous)) => {
                debug!(
                    "Duplicate response for {} ({:?}), keeping the latest",
                    key,
                    previous.command()
                );
                self.slots.insert(key, Slot::Arrived(message));
            }
            None => {
                trace!("Response {} arrived before its waiter", key);
                self.slots.insert(key, Slot::Arrived(message));
            }
        }
    }

    /// Forget `key`, returning whether anything was stored under it
    pub fn evict(&mut self, key: MessageKey) -> bool {
        self.slots.remove(&key).is_some()
    }

    /// Give up on the waiter for `key`; a reply arriving later is discarded
    pub fn expire(&mut self, key: MessageKey) {
        if let Some(Slot::Waiting(_)) = self.slots.remove(&key) {
            self.expired.insert(key);
        }
    }

    /// Timed-out requests whose reply has not arrived
    pub fn expired(&self) -> usize {
        self.expired.len()
    }

    /// Resolve every waiter with a transport error and drop early responses
    pub fn fail_all(&mut self, reason: &Error) {
        let pending = self.slots.len();
        self.expired.clear();
        for (key, slot) in self.slots.drain() {
            if let Slot::Waiting(waiter) = slot {
                complete(key, waiter, Err(transport_error(reason)));
            }
        }
        if pending > 0 {
            debug!("Failed {} pending entries: {}", pending, reason);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn complete(key: MessageKey, waiter: Waiter, outcome: Result<Message>) {
    if waiter.send(outcome).is_err() {
        trace!("Request {} was abandoned before its response", key);
    }
}

/// Per-waiter copy of the error that ended the connection
fn transport_error(reason: &Error) -> Error {
    match reason {
        Error::ConnectionClosed => Error::ConnectionClosed,
        other => Error::ConnectionError(other.to_string()),
    }
}
