//! Client struct definition
//!
//! Represents an authenticated connection with its identity and
//! outbound communication channel.

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::DeliveryFailure;
use crate::message::ServerMessage;
use crate::types::{ClientId, Identity};

/// Connected client information
///
/// Cloning is cheap: the clone shares the same outbound channel.
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique identifier for this connection
    pub id: ClientId,
    /// Authenticated username, fixed for the connection's lifetime
    pub identity: Identity,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
}

impl Client {
    /// Create a new client with the given ID, identity and sender channel
    pub fn new(id: ClientId, identity: Identity, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            identity,
            sender,
        }
    }

    /// Push a message to this client without waiting
    ///
    /// Fails if the channel is closed (client disconnected) or full
    /// (client not keeping up).
    pub fn try_deliver(&self, msg: ServerMessage) -> Result<(), DeliveryFailure> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryFailure::Backpressure,
            TrySendError::Closed(_) => DeliveryFailure::ChannelClosed,
        })
    }
}
