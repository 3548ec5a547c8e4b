//! Errors and close reasons of a feed session

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::config::ConfigError;

/// Failures that end a feed session and send the supervisor into backoff.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Transport or protocol failure reported by the websocket layer
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// The connection was not established within the connect timeout
    #[error("connecting to {url} timed out after {timeout:?}")]
    ConnectTimeout { url: String, timeout: Duration },

    /// An outbound request could not be written within the send timeout
    #[error("sending {what} timed out")]
    SendTimeout { what: &'static str },

    /// An outbound request could not be serialized
    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The API key could not be obtained
    #[error("credential unavailable: {0}")]
    Credential(#[from] ConfigError),

    /// The feed refused the API key
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// The feed closed the connection or the stream ended
    #[error("connection closed by peer")]
    ClosedByPeer,

    /// A session task panicked or was aborted
    #[error("session task failed: {0}")]
    TaskFailed(String),
}

/// Session endings that are not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// No frame arrived within the staleness threshold
    Stale { idle: Duration },
    /// The connection reached its maximum age
    ScheduledRefresh { age: Duration },
    /// Cancellation was requested
    Shutdown,
}

impl fmt::Display for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disconnect::Stale { idle } => write!(f, "stale: no data for {idle:?}"),
            Disconnect::ScheduledRefresh { age } => {
                write!(f, "scheduled refresh after {age:?}")
            }
            Disconnect::Shutdown => write!(f, "shutdown"),
        }
    }
}
