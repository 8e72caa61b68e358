//! Broadcast fan-out
//!
//! A hub is built from a registry snapshot, so delivery never touches shared
//! state. Each recipient is pushed with `try_send`; one slow or closed
//! connection cannot hold up or fail delivery to the rest.

use tracing::{debug, warn};

use crate::client::Client;
use crate::error::DeliveryFailure;
use crate::message::ServerMessage;
use crate::types::{ClientId, Identity};

/// Outcome of one broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
    /// Recipients whose outbound buffer was full
    pub stalled: Vec<ClientId>,
}

/// Fan-out over a fixed set of recipients
#[derive(Debug)]
pub struct BroadcastHub {
    recipients: Vec<Client>,
}

impl BroadcastHub {
    pub fn new(recipients: Vec<Client>) -> Self {
        Self { recipients }
    }

    /// Deliver to every recipient, the sender included
    pub fn broadcast_all(&self, msg: &ServerMessage) -> Delivery {
        self.deliver(msg, |_| true)
    }

    /// Deliver to every recipient not bound to `excluding`
    pub fn broadcast_others(&self, msg: &ServerMessage, excluding: &Identity) -> Delivery {
        self.deliver(msg, |client| &client.identity != excluding)
    }

    fn deliver(&self, msg: &ServerMessage, include: impl Fn(&Client) -> bool) -> Delivery {
        let mut report = Delivery::default();
        for client in self.recipients.iter().filter(|c| include(*c)) {
            match client.try_deliver(msg.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        "Failed to deliver to {} ('{}'): {}",
                        client.id, client.identity, e
                    );
                    report.failed += 1;
                    if e == DeliveryFailure::Backpressure {
                        report.stalled.push(client.id);
                    }
                }
            }
        }
        debug!(
            "Broadcast delivered to {}, failed for {}",
            report.delivered, report.failed
        );
        report
    }
}
