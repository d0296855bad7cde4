//! Error types for relaycast-stream operations.

use relaycast::{ConfigError, HubError, ProtocolViolation, RelayError};
use thiserror::Error;

/// Errors that can occur in stream and sink operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreamError {
    /// Invalid relay or hub configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A relay rejected a write.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// A hub rejected an emission.
    #[error(transparent)]
    Hub(#[from] HubError),

    /// The relay's consumer side was already claimed.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    /// The sink has been closed.
    #[error("sink is closed")]
    Closed,
}

impl StreamError {
    /// Returns `true` if this error indicates the sink is permanently unusable.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Relay(err) => err.is_terminal(),
            Self::Hub(err) => err.is_terminal(),
            Self::Protocol(violation) => *violation == ProtocolViolation::AlreadyTerminated,
            Self::Config(_) => false,
        }
    }
}
