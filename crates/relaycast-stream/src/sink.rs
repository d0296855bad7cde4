//! Async sender implementing `futures::Sink`.

use crate::error::StreamError;
use crate::invariants::debug_assert_ready_for_send;
use futures_sink::Sink;
use futures_util::future::BoxFuture;
use pin_project_lite::pin_project;
use relaycast::{BoundedRelay, Emitter, MulticastHub, ReplaySubject};
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tracing::trace;

type InFlight = Option<BoxFuture<'static, Result<(), StreamError>>>;

pin_project! {
    /// Sink over any [`Emitter`].
    ///
    /// Each item becomes one in-flight `emit`. `poll_ready` and `poll_flush`
    /// drive it to completion, so backpressure from the relay (or from the
    /// slowest hub subscriber) surfaces as `Poll::Pending`. `poll_close`
    /// flushes, then completes the stream exactly once.
    ///
    /// # Note
    ///
    /// The sink does not fail the stream on drop. Use
    /// [`emitter`](Self::emitter) to call `fail` explicitly.
    pub struct EmitterSink<E, T> {
        emitter: E,
        in_flight: InFlight,
        closed: bool,
        _item: PhantomData<fn(T)>,
    }
}

/// Sink writing into a single relay.
pub type RelaySink<T> = EmitterSink<BoundedRelay<T>, T>;

/// Sink fanning out through a hub.
pub type HubSink<T> = EmitterSink<MulticastHub<T>, T>;

/// Sink recording into a replay subject.
pub type ReplaySink<T> = EmitterSink<ReplaySubject<T>, T>;

impl<E, T> EmitterSink<E, T> {
    pub fn new(emitter: E) -> Self {
        Self {
            emitter,
            in_flight: None,
            closed: false,
            _item: PhantomData,
        }
    }

    /// The wrapped producer handle.
    pub fn emitter(&self) -> &E {
        &self.emitter
    }

    /// Returns `true` once `poll_close` has started completing the stream.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

fn poll_in_flight(in_flight: &mut InFlight, cx: &mut Context<'_>) -> Poll<Result<(), StreamError>> {
    let Some(fut) = in_flight.as_mut() else {
        return Poll::Ready(Ok(()));
    };
    let res = ready!(fut.as_mut().poll(cx));
    *in_flight = None;
    Poll::Ready(res)
}

impl<E, T> Sink<T> for EmitterSink<E, T>
where
    E: Emitter<T> + Clone + 'static,
    T: Send + 'static,
    StreamError: From<E::Error>,
{
    type Error = StreamError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        if *this.closed {
            return Poll::Ready(Err(StreamError::Closed));
        }
        poll_in_flight(this.in_flight, cx)
    }

    fn start_send(self: Pin<&mut Self>, item: T) -> Result<(), Self::Error> {
        let this = self.project();
        if *this.closed {
            return Err(StreamError::Closed);
        }
        debug_assert_ready_for_send!(this.in_flight);

        let emitter = this.emitter.clone();
        *this.in_flight = Some(Box::pin(async move {
            emitter.emit(item).await.map_err(StreamError::from)
        }));
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        poll_in_flight(self.project().in_flight, cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if !self.closed {
            ready!(self.as_mut().poll_flush(cx))?;

            let this = self.as_mut().project();
            *this.closed = true;
            let emitter = this.emitter.clone();
            *this.in_flight = Some(Box::pin(async move {
                emitter.complete().await.map_err(StreamError::from)
            }));
            trace!("sink closing, completing stream");
        }
        poll_in_flight(self.project().in_flight, cx)
    }
}

impl<E: std::fmt::Debug, T> std::fmt::Debug for EmitterSink<E, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmitterSink")
            .field("emitter", &self.emitter)
            .field("in_flight", &self.in_flight.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}
