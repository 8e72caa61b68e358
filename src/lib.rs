//! Real-time WebSocket Chat Relay Library
//!
//! Authenticated clients connect over WebSocket, receive the message history
//! on join, broadcast messages to every peer, and see who else is typing.
//!
//! # Features
//! - Token (HS256 JWT) authentication at connect time
//! - History replay for new joiners
//! - Broadcast chat messaging with per-recipient failure isolation
//! - Typing indicators with debounced expiry
//! - Ping-based dead connection detection
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning registry, history and presence
//! - Each connection has a `handler` task communicating with the server
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use chat_relay::{serve, Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config {
//!         jwt_secret: "change-me".into(),
//!         ..Config::default()
//!     };
//!     let listener = TcpListener::bind(&config.addr).await.unwrap();
//!     serve(listener, config, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//!     .unwrap();
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod history;
pub mod hub;
pub mod message;
pub mod presence;
pub mod registry;
pub mod serve;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use auth::TokenVerifier;
pub use client::Client;
pub use config::Config;
pub use error::{AppError, AuthFailure, DeliveryFailure, ValidationFailure};
pub use handler::handle_connection;
pub use history::HistoryStore;
pub use hub::BroadcastHub;
pub use message::{ChatMessage, ClientMessage, ErrorCode, ServerMessage};
pub use presence::PresenceTracker;
pub use registry::ConnectionRegistry;
pub use serve::serve;
pub use server::{ChatServer, ServerCommand};
pub use types::{ClientId, Identity};
