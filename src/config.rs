//! Server configuration
//!
//! Plain settings struct; the binary fills it from command line flags and
//! environment variables.

use std::time::Duration;

use crate::error::AppError;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Runtime settings for the relay
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind
    pub addr: String,
    /// Shared HMAC secret for connection tokens
    pub jwt_secret: String,
    /// Lifetime of issued tokens
    pub token_ttl: Duration,
    /// Typing state expires after this long without a refresh
    pub typing_timeout: Duration,
    /// Maximum retained history (None = unbounded)
    pub history_limit: Option<usize>,
    /// Interval between WebSocket pings
    pub ping_interval: Duration,
    /// Extra grace after a missed ping before the connection is dropped
    pub ping_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            jwt_secret: String::new(),
            token_ttl: Duration::from_secs(15 * 60),
            typing_timeout: Duration::from_secs(3),
            history_limit: None,
            ping_interval: Duration::from_secs(10),
            ping_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.jwt_secret.is_empty() {
            return Err(AppError::Config("JWT secret must be set".to_string()));
        }
        if self.typing_timeout.is_zero() {
            return Err(AppError::Config("typing timeout must be positive".to_string()));
        }
        if self.ping_interval.is_zero() {
            return Err(AppError::Config("ping interval must be positive".to_string()));
        }
        Ok(())
    }

    /// How long a connection may stay silent before it is considered dead
    pub fn idle_limit(&self) -> Duration {
        self.ping_interval + self.ping_timeout
    }
}
