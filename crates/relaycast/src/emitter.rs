//! Producer-side abstraction shared by relays and hubs.

use crate::error::{HubError, RelayError};
use crate::hub::MulticastHub;
use crate::relay::BoundedRelay;
use crate::slot::Cause;
use crate::subject::{BehaviorSubject, ReplaySubject};
use async_trait::async_trait;

/// Anything a single logical producer can push a stream into.
///
/// Implemented by [`BoundedRelay`] (one consumer), [`MulticastHub`] and the
/// subjects (every registered consumer), so producers and adapters can be
/// written once for all of them.
#[async_trait]
pub trait Emitter<T: Send + 'static>: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Pushes one value, suspending under backpressure.
    async fn emit(&self, value: T) -> Result<(), Self::Error>;

    /// Ends the stream normally.
    async fn complete(&self) -> Result<(), Self::Error>;

    /// Ends the stream with `cause`.
    async fn fail(&self, cause: Cause) -> Result<(), Self::Error>;
}

#[async_trait]
impl<T: Send + 'static> Emitter<T> for BoundedRelay<T> {
    type Error = RelayError;

    async fn emit(&self, value: T) -> Result<(), RelayError> {
        self.next(value).await
    }

    async fn complete(&self) -> Result<(), RelayError> {
        BoundedRelay::complete(self).await
    }

    async fn fail(&self, cause: Cause) -> Result<(), RelayError> {
        BoundedRelay::fail(self, cause).await
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Emitter<T> for MulticastHub<T> {
    type Error = HubError;

    async fn emit(&self, value: T) -> Result<(), HubError> {
        MulticastHub::emit(self, value).await
    }

    async fn complete(&self) -> Result<(), HubError> {
        MulticastHub::complete(self).await
    }

    async fn fail(&self, cause: Cause) -> Result<(), HubError> {
        MulticastHub::fail(self, cause).await
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Emitter<T> for ReplaySubject<T> {
    type Error = HubError;

    async fn emit(&self, value: T) -> Result<(), HubError> {
        ReplaySubject::emit(self, value).await
    }

    async fn complete(&self) -> Result<(), HubError> {
        ReplaySubject::complete(self).await
    }

    async fn fail(&self, cause: Cause) -> Result<(), HubError> {
        ReplaySubject::fail(self, cause).await
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Emitter<T> for BehaviorSubject<T> {
    type Error = HubError;

    async fn emit(&self, value: T) -> Result<(), HubError> {
        BehaviorSubject::emit(self, value).await
    }

    async fn complete(&self) -> Result<(), HubError> {
        BehaviorSubject::complete(self).await
    }

    async fn fail(&self, cause: Cause) -> Result<(), HubError> {
        BehaviorSubject::fail(self, cause).await
    }
}
