//! Typing presence tracking
//!
//! Each identity is either idle or typing. A typing entry owns a timer task
//! that reports expiry back over an internal channel; every `start` replaces
//! the timer, and each timer carries a generation so an expiry that raced
//! with a refresh or a stop is discarded.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::types::Identity;

/// Fired by a timer task when a typing window elapses
#[derive(Debug)]
struct Expiry {
    identity: Identity,
    generation: u64,
}

/// Typing entry for one identity
#[derive(Debug)]
struct TypingEntry {
    generation: u64,
    timer: JoinHandle<()>,
}

/// Per-identity typing state machine with debounced expiry
#[derive(Debug)]
pub struct PresenceTracker {
    timeout: Duration,
    typing: HashMap<Identity, TypingEntry>,
    next_generation: u64,
    expiry_tx: mpsc::UnboundedSender<Expiry>,
    expiry_rx: mpsc::UnboundedReceiver<Expiry>,
}

impl PresenceTracker {
    /// Create a tracker whose typing state expires after `timeout` without refresh
    pub fn new(timeout: Duration) -> Self {
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        Self {
            timeout,
            typing: HashMap::new(),
            next_generation: 0,
            expiry_tx,
            expiry_rx,
        }
    }

    /// Mark `identity` as typing
    ///
    /// Returns true on the idle -> typing transition. A repeated start only
    /// resets the expiry timer and returns false.
    pub fn start(&mut self, identity: &Identity) -> bool {
        let generation = self.next_generation;
        self.next_generation += 1;
        let timer = self.spawn_timer(identity.clone(), generation);

        match self.typing.get_mut(identity) {
            Some(entry) => {
                entry.timer.abort();
                entry.timer = timer;
                entry.generation = generation;
                false
            }
            None => {
                self.typing
                    .insert(identity.clone(), TypingEntry { generation, timer });
                true
            }
        }
    }

    /// Mark `identity` as idle
    ///
    /// Returns true on the typing -> idle transition.
    pub fn stop(&mut self, identity: &Identity) -> bool {
        match self.typing.remove(identity) {
            Some(entry) => {
                entry.timer.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_typing(&self, identity: &Identity) -> bool {
        self.typing.contains_key(identity)
    }

    /// Identities currently typing, never including `excluding`
    pub fn active_others(&self, excluding: &Identity) -> BTreeSet<Identity> {
        self.typing
            .keys()
            .filter(|id| *id != excluding)
            .cloned()
            .collect()
    }

    /// Wait for the next typing window to elapse
    ///
    /// The identity is already idle when this returns. Cancel safe.
    pub async fn next_expired(&mut self) -> Option<Identity> {
        loop {
            let expiry = self.expiry_rx.recv().await?;
            let current = self
                .typing
                .get(&expiry.identity)
                .is_some_and(|entry| entry.generation == expiry.generation);
            if current {
                self.typing.remove(&expiry.identity);
                return Some(expiry.identity);
            }
            debug!("Discarding stale typing expiry for '{}'", expiry.identity);
        }
    }

    /// Cancel every timer and forget all typing state
    pub fn clear(&mut self) {
        for (_, entry) in self.typing.drain() {
            entry.timer.abort();
        }
    }

    fn spawn_timer(&self, identity: Identity, generation: u64) -> JoinHandle<()> {
        let expiry_tx = self.expiry_tx.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = expiry_tx.send(Expiry {
                identity,
                generation,
            });
        })
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        self.clear();
    }
}
