//! Async receiver implementing `futures::Stream`.

use crate::error::StreamError;
use crate::invariants::debug_assert_fused;
use futures_core::stream::{FusedStream, Stream};
use pin_project_lite::pin_project;
use relaycast::{BoundedRelay, Cause, ConsumerHandle, MulticastHub, RelayReceiver, SubscriberId};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tracing::trace;

pin_project! {
    /// Stream over the consumer side of a [`BoundedRelay`].
    ///
    /// Yields `Ok(value)` in write order. A failed stream ends with one
    /// `Err(cause)`; a completed one simply ends. Dropping the stream before
    /// it ends detaches the consumer, which unblocks the producer with
    /// [`RelayError::Detached`](relaycast::RelayError::Detached) and, for a
    /// hub subscription, removes the subscriber on the next emission.
    pub struct RelayStream<T> {
        receiver: RelayReceiver<T>,
        subscriber: Option<SubscriberId>,
    }
}

impl<T> RelayStream<T> {
    /// Claims the consumer side of `relay`.
    pub fn new(relay: &BoundedRelay<T>) -> Result<Self, StreamError> {
        Ok(Self::from_receiver(relay.receiver()?))
    }

    /// Wraps an already claimed receiver.
    pub fn from_receiver(receiver: RelayReceiver<T>) -> Self {
        Self {
            receiver,
            subscriber: None,
        }
    }

    /// Registers a new subscriber on `hub` and streams what it receives.
    pub fn subscribe(hub: &MulticastHub<T>) -> Result<Self, StreamError> {
        Self::from_handle(hub.register())
    }

    /// Streams a subscription obtained from a hub or a subject.
    pub fn from_handle(handle: ConsumerHandle<T>) -> Result<Self, StreamError> {
        let receiver = handle.receiver()?;
        trace!(id = %handle.id(), "subscription streaming");
        Ok(Self {
            receiver,
            subscriber: Some(handle.id()),
        })
    }

    /// The subscription backing this stream, if any.
    pub fn subscriber(&self) -> Option<SubscriberId> {
        self.subscriber
    }

    /// Slots written but not yet yielded, the terminal marker included.
    pub fn buffered_count(&self) -> usize {
        self.receiver.len()
    }
}

impl<T> Stream for RelayStream<T> {
    type Item = Result<T, Cause>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let item = ready!(this.receiver.poll_recv(cx));
        debug_assert_fused!(item, this.receiver.is_finished());
        Poll::Ready(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.receiver.is_finished() {
            (0, Some(0))
        } else {
            (0, None)
        }
    }
}

impl<T> FusedStream for RelayStream<T> {
    fn is_terminated(&self) -> bool {
        self.receiver.is_finished()
    }
}

impl<T> std::fmt::Debug for RelayStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayStream")
            .field("receiver", &self.receiver)
            .field("subscriber", &self.subscriber)
            .finish()
    }
}
