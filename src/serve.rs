//! Server bootstrap
//!
//! Builds the server-owned state (token verifier, ChatServer actor) once,
//! runs the accept loop, and tears everything down on shutdown.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::error::AppError;
use crate::handler::{handle_connection, Heartbeat};
use crate::server::{ChatServer, ServerCommand};

/// Channel buffer size for server commands
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Accept connections on `listener` until `shutdown` resolves
///
/// On shutdown the ChatServer actor is stopped, which closes every open
/// connection's outbound channel.
pub async fn serve(
    listener: TcpListener,
    config: Config,
    shutdown: impl Future<Output = ()>,
) -> Result<(), AppError> {
    config.validate()?;

    let verifier = Arc::new(TokenVerifier::new(
        config.jwt_secret.as_bytes(),
        config.token_ttl,
    ));
    let heartbeat = Heartbeat {
        interval: config.ping_interval,
        idle_limit: config.idle_limit(),
    };

    // Create ChatServer actor channel and start
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    let server = ChatServer::new(cmd_rx, config.typing_timeout, config.history_limit);
    let server_task = tokio::spawn(server.run());

    info!("ChatServer actor started");

    tokio::pin!(shutdown);

    // Connection accept loop
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let cmd_tx = cmd_tx.clone();
                    let verifier = Arc::clone(&verifier);

                    // Spawn handler task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, cmd_tx, verifier, heartbeat).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    let _ = cmd_tx.send(ServerCommand::Shutdown).await;
    if let Err(e) = server_task.await {
        error!("ChatServer task failed: {}", e);
    }

    Ok(())
}
