//! Error types for the chat relay
//!
//! Defines application-level errors plus the three per-connection failure
//! kinds: authentication, validation and delivery.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Fatal either to a single connection (WebSocket, IO) or to startup
/// (Config, Token).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Invalid server configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token signing failed
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// Connection authentication failures
///
/// Always fatal for the connection. The client must reconnect with a
/// fresh credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    /// No token supplied at connect time
    #[error("missing token")]
    Missing,

    /// Bad signature, malformed or expired token, or bad username claim
    #[error("invalid token")]
    Invalid,
}

/// Rejected client input
///
/// Reported back to the sender; the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    /// Message text empty after trimming
    #[error("Message text must not be empty")]
    EmptyText,

    /// Frame could not be decoded as a client message
    #[error("Invalid message format: {0}")]
    Malformed(String),
}

/// Per-recipient delivery errors
///
/// Occurs when pushing to a connection's outbound channel during broadcast.
/// Never propagated to the sender or other recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The outbound buffer is full (slow reader)
    #[error("Outbound buffer full")]
    Backpressure,
}
