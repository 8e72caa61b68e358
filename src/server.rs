//! ChatServer Actor implementation
//!
//! The session coordinator: a single task that owns the connection registry,
//! the message history and the typing presence tracker. Handlers talk to it
//! through an mpsc command channel, so all shared state is mutated in one
//! place and in one order.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::{DeliveryFailure, ValidationFailure};
use crate::history::HistoryStore;
use crate::hub::{BroadcastHub, Delivery};
use crate::message::{ChatMessage, ServerMessage};
use crate::presence::PresenceTracker;
use crate::registry::ConnectionRegistry;
use crate::types::{ClientId, Identity};

/// Commands sent from handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Authenticated client connected
    Connect {
        client_id: ClientId,
        identity: Identity,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Client disconnected
    Disconnect { client_id: ClientId },
    /// Send a chat message
    SendMessage { client_id: ClientId, text: String },
    /// Client started typing
    Typing { client_id: ClientId },
    /// Client stopped typing
    StopTyping { client_id: ClientId },
    /// Client sent input that could not be decoded
    Reject {
        client_id: ClientId,
        failure: ValidationFailure,
    },
    /// Stop the actor and close every connection
    Shutdown,
}

/// The main ChatServer actor
///
/// Processes commands from client handlers and typing expiries from the
/// presence tracker. Broadcasts never wait on a recipient.
pub struct ChatServer {
    /// All authenticated connections
    registry: ConnectionRegistry,
    /// Messages replayed to new joiners
    history: HistoryStore,
    /// Who is typing
    presence: PresenceTracker,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(
        receiver: mpsc::Receiver<ServerCommand>,
        typing_timeout: Duration,
        history_limit: Option<usize>,
    ) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            history: HistoryStore::new(history_limit),
            presence: PresenceTracker::new(typing_timeout),
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Runs until a `Shutdown` command arrives or all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(ServerCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(identity) = self.presence.next_expired() => {
                    self.handle_typing_expired(identity);
                }
            }
        }

        self.presence.clear();
        self.registry.clear();
        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect {
                client_id,
                identity,
                sender,
            } => self.handle_connect(client_id, identity, sender),
            ServerCommand::Disconnect { client_id } => self.handle_disconnect(client_id),
            ServerCommand::SendMessage { client_id, text } => {
                self.handle_send_message(client_id, text)
            }
            ServerCommand::Typing { client_id } => self.handle_typing(client_id),
            ServerCommand::StopTyping { client_id } => self.handle_stop_typing(client_id),
            ServerCommand::Reject { client_id, failure } => self.handle_reject(client_id, failure),
            ServerCommand::Shutdown => {}
        }
    }

    /// Register the connection and replay history to it alone
    fn handle_connect(
        &mut self,
        client_id: ClientId,
        identity: Identity,
        sender: mpsc::Sender<ServerMessage>,
    ) {
        let client = Client::new(client_id, identity.clone(), sender);
        let replay = ServerMessage::MessageHistory {
            history: self.history.replay(),
            sender: identity.clone(),
            typing: self.presence.active_others(&identity).into_iter().collect(),
        };
        self.registry.add(client.clone());
        if let Err(e) = client.try_deliver(replay) {
            warn!("Failed to replay history to {}: {}", client_id, e);
        }

        info!("User '{}' connected as {}", identity, client_id);
        debug!(
            "Total connections: {}, connections for '{}': {}",
            self.registry.len(),
            identity,
            self.registry.connection_count(&identity)
        );
    }

    /// Handle client disconnection
    ///
    /// Typing state is left to expire on its own timer.
    fn handle_disconnect(&mut self, client_id: ClientId) {
        match self.registry.remove(&client_id) {
            Some(client) => info!("User '{}' disconnected ({})", client.identity, client_id),
            None => debug!("Disconnect for unknown client {}", client_id),
        }
        debug!("Total connections: {}", self.registry.len());
    }

    /// Handle chat message
    fn handle_send_message(&mut self, client_id: ClientId, text: String) {
        let Some(client) = self.registry.get(&client_id) else {
            return;
        };
        let identity = client.identity.clone();

        let message = match ChatMessage::new(&text, identity.clone(), Utc::now()) {
            Ok(message) => message,
            Err(e) => {
                debug!("Rejected message from '{}': {}", identity, e);
                self.reply(client_id, e.into());
                return;
            }
        };

        // Sending ends typing
        if self.presence.stop(&identity) {
            let report = self
                .hub()
                .broadcast_others(&ServerMessage::StopTyping { sender: identity.clone() }, &identity);
            self.drop_stalled(report);
        }

        debug!("{}: {}", identity, message.text);
        self.history.append(message.clone());
        let report = self.hub().broadcast_all(&ServerMessage::ReceiveMessage(message));
        self.drop_stalled(report);
    }

    /// Handle typing indicator start
    fn handle_typing(&mut self, client_id: ClientId) {
        let Some(identity) = self.identity_of(client_id) else {
            return;
        };

        // Already typing? Timer refreshed, nothing to announce
        if !self.presence.start(&identity) {
            return;
        }

        debug!("'{}' started typing", identity);
        let report = self
            .hub()
            .broadcast_others(&ServerMessage::Typing { sender: identity.clone() }, &identity);
        self.drop_stalled(report);
    }

    /// Handle typing indicator stop
    fn handle_stop_typing(&mut self, client_id: ClientId) {
        let Some(identity) = self.identity_of(client_id) else {
            return;
        };

        // Not typing? Skip
        if !self.presence.stop(&identity) {
            return;
        }

        debug!("'{}' stopped typing", identity);
        let report = self
            .hub()
            .broadcast_others(&ServerMessage::StopTyping { sender: identity.clone() }, &identity);
        self.drop_stalled(report);
    }

    /// Report rejected input to its sender only
    fn handle_reject(&mut self, client_id: ClientId, failure: ValidationFailure) {
        self.reply(client_id, failure.into());
    }

    /// Announce a typing window that elapsed without refresh
    fn handle_typing_expired(&mut self, identity: Identity) {
        debug!("Typing expired for '{}'", identity);
        let report = self
            .hub()
            .broadcast_others(&ServerMessage::StopTyping { sender: identity.clone() }, &identity);
        self.drop_stalled(report);
    }

    /// Send to one connection, dropping it if its buffer is full
    fn reply(&mut self, client_id: ClientId, msg: ServerMessage) {
        let Some(client) = self.registry.get(&client_id) else {
            return;
        };
        match client.try_deliver(msg) {
            Ok(()) => {}
            Err(DeliveryFailure::Backpressure) => {
                warn!("Client {} is not keeping up, dropping", client_id);
                self.registry.remove(&client_id);
            }
            Err(e) => warn!("Failed to reply to {}: {}", client_id, e),
        }
    }

    /// Remove connections that could not take a broadcast
    ///
    /// Dropping the registry entry closes the outbound channel, so the writer
    /// flushes what it already holds and then closes the socket. The client
    /// gets the full history again when it reconnects.
    fn drop_stalled(&mut self, report: Delivery) {
        for client_id in report.stalled {
            if let Some(client) = self.registry.remove(&client_id) {
                warn!(
                    "Client {} ('{}') is not keeping up, dropping",
                    client_id, client.identity
                );
            }
        }
    }

    /// Helper: Get the identity bound to a connection
    fn identity_of(&self, client_id: ClientId) -> Option<Identity> {
        self.registry.get(&client_id).map(|c| c.identity.clone())
    }

    /// Helper: Hub over a snapshot of the current connections
    fn hub(&self) -> BroadcastHub {
        BroadcastHub::new(self.registry.all())
    }
}
