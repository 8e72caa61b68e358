//! WebSocket Chat Relay - Entry Point
//!
//! Parses configuration, then either starts the relay or issues a
//! connection token for local testing.
//!
//! ```not_rust
//! JWT_SECRET=dev cargo run -- --addr 0.0.0.0:8080
//! JWT_SECRET=dev cargo run -- issue-token alice
//! ```

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_relay::config::DEFAULT_ADDR;
use chat_relay::{serve, AppError, Config, Identity, TokenVerifier};

#[derive(Parser, Debug)]
#[command(name = "chat_relay")]
#[command(about = "Real-time WebSocket chat relay", long_about = None)]
struct Cli {
    /// Shared secret used to sign and verify connection tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,

    /// Lifetime of issued tokens in seconds
    #[arg(long, default_value_t = 900)]
    token_ttl_secs: u64,

    #[command(flatten)]
    serve: ServeArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a connection token for a username and exit
    IssueToken {
        /// Username to embed in the token
        username: String,
    },
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind the server to
    #[arg(long, env = "CHAT_RELAY_ADDR", default_value = DEFAULT_ADDR)]
    addr: String,

    /// Typing state expires after this many milliseconds without refresh
    #[arg(long, default_value_t = 3000)]
    typing_timeout_ms: u64,

    /// Keep only the newest N messages (unbounded when omitted)
    #[arg(long)]
    history_limit: Option<usize>,

    /// Seconds between WebSocket pings
    #[arg(long, default_value_t = 10)]
    ping_interval_secs: u64,

    /// Seconds to wait past a ping before dropping a silent connection
    #[arg(long, default_value_t = 5)]
    ping_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    let cli = Cli::parse();
    let token_ttl = Duration::from_secs(cli.token_ttl_secs);

    if let Some(Command::IssueToken { username }) = cli.command {
        let identity = Identity::parse(username)
            .ok_or_else(|| AppError::Config("username must be 1-16 characters".to_string()))?;
        let verifier = TokenVerifier::new(cli.jwt_secret.as_bytes(), token_ttl);
        println!("{}", verifier.issue(&identity)?);
        return Ok(());
    }

    let args = cli.serve;

    let config = Config {
        addr: args.addr,
        jwt_secret: cli.jwt_secret,
        token_ttl,
        typing_timeout: Duration::from_millis(args.typing_timeout_ms),
        history_limit: args.history_limit,
        ping_interval: Duration::from_secs(args.ping_interval_secs),
        ping_timeout: Duration::from_secs(args.ping_timeout_secs),
    };

    // Start TCP listener
    let listener = TcpListener::bind(&config.addr).await?;
    info!("WebSocket Chat Relay listening on {}", config.addr);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    serve(listener, config, shutdown).await?;
    info!("Server stopped");

    Ok(())
}
