//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, token
//! authentication, message parsing, heartbeat and bidirectional
//! communication with the ChatServer.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::auth::TokenVerifier;
use crate::error::{AppError, ValidationFailure};
use crate::message::{ClientMessage, ServerMessage};
use crate::server::ServerCommand;
use crate::types::ClientId;

/// Outbound buffer per connection
const CLIENT_BUFFER_SIZE: usize = 32;

/// Heartbeat settings for one connection
#[derive(Debug, Clone, Copy)]
pub struct Heartbeat {
    /// Interval between pings
    pub interval: Duration,
    /// Silence after which the connection is considered dead
    pub idle_limit: Duration,
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, authenticates the token presented with
/// it, then sets up bidirectional communication and manages the connection
/// lifecycle. A connection that fails authentication receives `authError`
/// and is closed without ever reaching the ChatServer.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
    verifier: Arc<TokenVerifier>,
    heartbeat: Heartbeat,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake, capturing the token
    let mut token = None;
    let mut ws_stream = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            token = extract_token(req);
            Ok(resp)
        },
    )
    .await?;

    let identity = match verifier.verify(token.as_deref()) {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Rejected connection from {}: {}", peer_addr, e);
            let json = serde_json::to_string(&ServerMessage::AuthError)?;
            ws_stream.send(Message::Text(json.into())).await?;
            let _ = ws_stream.close(None).await;
            return Ok(());
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Generate client ID
    let client_id = ClientId::new();
    info!("'{}' connected as {} from {}", identity, client_id, peer_addr);

    // Create channel for server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(CLIENT_BUFFER_SIZE);

    // Register with ChatServer; it replays history on this channel
    if cmd_tx
        .send(ServerCommand::Connect {
            client_id,
            identity,
            sender: msg_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register client {} - server closed", client_id);
        return Err(AppError::ChannelSend);
    }

    // Clone cmd_tx for read task
    let cmd_tx_read = cmd_tx.clone();

    // Spawn read task (WebSocket -> ServerCommand)
    let mut read_task = tokio::spawn(async move {
        loop {
            let msg_result = match timeout(heartbeat.idle_limit, ws_receiver.next()).await {
                Ok(Some(msg_result)) => msg_result,
                Ok(None) => break,
                Err(_) => {
                    warn!("Client {} missed heartbeat, dropping", client_id);
                    break;
                }
            };

            match msg_result {
                Ok(Message::Text(text)) => {
                    let cmd = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => client_message_to_command(client_id, client_msg),
                        Err(e) => {
                            warn!("Invalid JSON from {}: {}", client_id, e);
                            ServerCommand::Reject {
                                client_id,
                                failure: ValidationFailure::Malformed(e.to_string()),
                            }
                        }
                    };
                    if cmd_tx_read.send(cmd).await.is_err() {
                        debug!("Server closed, ending read task for {}", client_id);
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Client {} sent close frame", client_id);
                    break;
                }
                Ok(Message::Ping(_)) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Ping from {}", client_id);
                }
                Ok(Message::Pong(_)) => {
                    debug!("Pong from {}", client_id);
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", client_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", client_id);
    });

    // Spawn write task (ServerMessage -> WebSocket, plus pings)
    let mut write_task = tokio::spawn(async move {
        let mut pings = interval_at(Instant::now() + heartbeat.interval, heartbeat.interval);
        loop {
            tokio::select! {
                msg = msg_rx.recv() => {
                    let Some(msg) = msg else { break };
                    match serde_json::to_string(&msg) {
                        Ok(json) => {
                            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                                debug!("WebSocket send failed, ending write task");
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            // Continue - don't break on serialization errors
                        }
                    }
                }
                _ = pings.tick() => {
                    if ws_sender.send(Message::Ping(Vec::<u8>::new().into())).await.is_err() {
                        debug!("Ping failed, ending write task");
                        break;
                    }
                }
            }
        }
        debug!("Write task ended for client");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut read_task => {
            debug!("Read task completed for {}", client_id);
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", client_id);
            read_task.abort();
        }
    }

    // Send disconnect command
    let _ = cmd_tx.send(ServerCommand::Disconnect { client_id }).await;

    info!("Client {} disconnected", client_id);

    Ok(())
}

/// Pull the connection token from the `token` query parameter or an
/// `Authorization: Bearer` header
///
/// An empty query value does not hide the header.
fn extract_token(req: &Request) -> Option<String> {
    let from_query = req.uri().query().and_then(|query| {
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, value)| key == "token" && !value.is_empty())
            .map(|(_, value)| value.into_owned())
    });

    from_query.or_else(|| {
        req.headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    })
}

/// Convert a ClientMessage to a ServerCommand
///
/// Identity is never taken from the payload; the command only carries the
/// connection id.
fn client_message_to_command(client_id: ClientId, msg: ClientMessage) -> ServerCommand {
    match msg {
        ClientMessage::SendMessage { text } => ServerCommand::SendMessage { client_id, text },
        ClientMessage::Typing => ServerCommand::Typing { client_id },
        ClientMessage::StopTyping => ServerCommand::StopTyping { client_id },
    }
}
