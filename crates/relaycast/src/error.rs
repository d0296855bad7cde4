//! Error types for relay and hub operations.

use crate::slot::Cause;
use thiserror::Error;

/// Invalid construction arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A relay needs room for at least one slot.
    #[error("relay capacity must be greater than zero")]
    ZeroCapacity,

    /// A hub needs a quorum of at least one subscriber.
    #[error("hub quorum must be at least one subscriber")]
    ZeroQuorum,

    /// A bounded replay window must keep at least one value.
    #[error("replay window must hold at least one value")]
    ZeroReplay,
}

/// A local contract error, raised immediately at the offending call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// `complete`/`fail` was already delivered, or a value was written after it.
    #[error("stream already terminated")]
    AlreadyTerminated,

    /// The single consumer side of a relay was already claimed.
    #[error("relay is already being drained")]
    AlreadyDraining,

    /// A second producer call was issued while another one is suspended.
    #[error("relay already has a suspended producer")]
    ConcurrentProducer,
}

/// Errors returned by producer-side relay operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The call broke the relay's usage contract.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    /// The consumer went away before observing the terminal slot.
    #[error("relay consumer detached")]
    Detached,
}

impl RelayError {
    /// Returns `true` if this error is a contract violation by the caller.
    #[inline]
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Returns `true` if the relay can never accept another write.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Detached | Self::Protocol(ProtocolViolation::AlreadyTerminated)
        )
    }
}

/// Errors returned by [`BoundedRelay::drain`](crate::BoundedRelay::drain).
#[derive(Debug, Clone, Error)]
pub enum DrainError {
    /// The relay was already being drained.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    /// The producer failed the stream; the cause is passed through untouched.
    #[error("stream failed: {0}")]
    Failed(Cause),
}

impl DrainError {
    /// Returns the producer's failure cause, if this is a propagated failure.
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            Self::Failed(cause) => Some(cause),
            Self::Protocol(_) => None,
        }
    }

    /// Returns `true` if this error is a contract violation by the caller.
    #[inline]
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

/// Errors returned by producer-side hub and subject operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HubError {
    /// The call broke the hub's usage contract.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
}

impl HubError {
    /// Returns `true` if the hub has terminated.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Protocol(ProtocolViolation::AlreadyTerminated))
    }
}
