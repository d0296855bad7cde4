use crate::config::RelayConfig;
use crate::error::{ConfigError, DrainError, ProtocolViolation, RelayError};
use crate::invariants::{
    debug_assert_bounded_count, debug_assert_open_stream, debug_assert_slot_state,
    debug_assert_waiters_exclusive,
};
use crate::metrics::{MetricsSnapshot, RelayMetrics};
use crate::slot::{Cause, Slot};
use crate::waiter::{wake_all, Ticket, WaiterQueue};
use parking_lot::Mutex;
use std::fmt;
use std::future::poll_fn;
use std::sync::Arc;
use std::task::{ready, Context, Poll, Waker};
use tracing::trace;

// =============================================================================
// SUSPENSION PROTOCOL
// =============================================================================
//
// Ring, counters and both waiter queues live behind one lock. Every operation
// takes the lock, either makes progress or parks its waker, and releases the
// lock before waking anybody.
//
// **Producer (`next` / `complete` / `fail`):**
// 1. Terminated or detached relay: fail fast.
// 2. `count < capacity`: write at `tail`, release one parked consumer.
// 3. Otherwise park on `producers` until a drain frees a slot.
//
// **Consumer (`RelayReceiver`):**
// 1. `count > 0`: take `ring[head]`, release one parked producer.
// 2. Otherwise park on `consumers` until the producer writes.
//
// Producers park only while the ring is full and consumers only while it is
// empty, so at most one of the two queues is non-empty at any time.
//
// A parked future that is dropped removes its ticket. If its ticket had
// already been released, the wakeup is handed to the next waiter of the same
// side when the condition it was waiting for still holds.
//
// =============================================================================

/// Bounded single-producer/single-consumer relay.
///
/// The producer suspends in [`next`](Self::next) while the ring is full; the
/// consumer suspends in [`drain`](Self::drain) while it is empty. Exactly one
/// terminal marker ([`complete`](Self::complete) or [`fail`](Self::fail)) ends
/// the stream and is observed after every value written before it.
///
/// `BoundedRelay` is a cheap handle: clones share the same ring, so the
/// producer and the consumer can each hold one.
pub struct BoundedRelay<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    state: Mutex<RelayState<T>>,
    metrics: RelayMetrics,
    config: RelayConfig,
}

struct RelayState<T> {
    ring: Box<[Option<Slot<T>>]>,
    head: usize,
    tail: usize,
    count: usize,
    /// The terminal slot has been written.
    terminated: bool,
    /// The consumer side has been handed out.
    claimed: bool,
    /// The consumer side went away before reaching the terminal slot.
    detached: bool,
    producers: WaiterQueue,
    consumers: WaiterQueue,
}

fn empty_ring<T>(capacity: usize) -> Box<[Option<Slot<T>>]> {
    (0..capacity).map(|_| None).collect()
}

impl<T> RelayState<T> {
    fn new(capacity: usize) -> Self {
        Self {
            ring: empty_ring(capacity),
            head: 0,
            tail: 0,
            count: 0,
            terminated: false,
            claimed: false,
            detached: false,
            producers: WaiterQueue::new(),
            consumers: WaiterQueue::new(),
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.ring.len()
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    /// Writes at `tail`. The caller has checked that a slot is free.
    fn push(&mut self, slot: Slot<T>) -> Option<Waker> {
        debug_assert_open_stream!(self.terminated);
        let idx = self.tail;
        debug_assert_slot_state!(self.ring[idx], free, idx);

        self.terminated = slot.is_terminal();
        self.ring[idx] = Some(slot);
        self.tail = (idx + 1) % self.capacity();
        self.count += 1;

        debug_assert_bounded_count!(self.count, self.capacity());
        self.consumers.release_one()
    }

    fn pop(&mut self) -> Option<(Slot<T>, Option<Waker>)> {
        if self.count == 0 {
            return None;
        }
        let idx = self.head;
        debug_assert_slot_state!(self.ring[idx], occupied, idx);

        let slot = self.ring[idx].take()?;
        self.head = (idx + 1) % self.capacity();
        self.count -= 1;
        Some((slot, self.producers.release_one()))
    }

    /// Marks the consumer as gone. Returns the buffered slots, to be dropped
    /// outside the lock, and the producers to wake.
    fn detach(&mut self) -> (Box<[Option<Slot<T>>]>, Vec<Waker>) {
        self.detached = true;
        let capacity = self.capacity();
        let ring = std::mem::replace(&mut self.ring, empty_ring(capacity));
        self.head = 0;
        self.tail = 0;
        self.count = 0;
        (ring, self.producers.release_all())
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Producer,
    Consumer,
}

/// Ticket holder for one suspended call; cancels the ticket when dropped.
struct Parked<'a, T> {
    shared: &'a Shared<T>,
    side: Side,
    ticket: Option<Ticket>,
}

impl<'a, T> Parked<'a, T> {
    fn new(shared: &'a Shared<T>, side: Side) -> Self {
        Self {
            shared,
            side,
            ticket: None,
        }
    }
}

impl<T> Drop for Parked<'_, T> {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        let mut state = self.shared.state.lock();
        let handoff = match self.side {
            Side::Producer => {
                if !state.producers.cancel(ticket) && !state.is_full() {
                    state.producers.release_one()
                } else {
                    None
                }
            }
            Side::Consumer => {
                if !state.consumers.cancel(ticket) && state.count > 0 {
                    state.consumers.release_one()
                } else {
                    None
                }
            }
        };
        drop(state);
        wake_all(handoff);
    }
}

impl<T> Shared<T> {
    fn poll_push(
        &self,
        cx: &mut Context<'_>,
        pending: &mut Option<Slot<T>>,
        ticket: &mut Option<Ticket>,
    ) -> Poll<Result<(), RelayError>> {
        let mut state = self.state.lock();

        if state.terminated || state.detached {
            if let Some(t) = ticket.take() {
                state.producers.cancel(t);
            }
            let err = if state.terminated {
                ProtocolViolation::AlreadyTerminated.into()
            } else {
                RelayError::Detached
            };
            return Poll::Ready(Err(err));
        }

        if !state.is_full() {
            if let Some(t) = ticket.take() {
                state.producers.cancel(t);
            }
            let Some(slot) = pending.take() else {
                return Poll::Ready(Ok(()));
            };
            let is_value = !slot.is_terminal();
            let consumer = state.push(slot);
            debug_assert_waiters_exclusive!(state);
            drop(state);

            if is_value && self.config.enable_metrics {
                self.metrics.record_sent();
            }
            wake_all(consumer);
            return Poll::Ready(Ok(()));
        }

        let queued = ticket.is_some_and(|t| state.producers.contains(t));
        if !queued && !state.producers.is_empty() {
            return Poll::Ready(Err(ProtocolViolation::ConcurrentProducer.into()));
        }
        state.producers.park(ticket, cx.waker());
        debug_assert_waiters_exclusive!(state);
        drop(state);

        if !queued {
            trace!(capacity = self.config.capacity, "relay full, producer suspended");
            if self.config.enable_metrics {
                self.metrics.record_producer_suspension();
            }
        }
        Poll::Pending
    }

    fn poll_pop(&self, cx: &mut Context<'_>, ticket: &mut Option<Ticket>) -> Poll<Slot<T>> {
        let mut state = self.state.lock();

        if let Some((slot, producer)) = state.pop() {
            if let Some(t) = ticket.take() {
                state.consumers.cancel(t);
            }
            debug_assert_waiters_exclusive!(state);
            drop(state);

            if matches!(slot, Slot::Value(_)) && self.config.enable_metrics {
                self.metrics.record_drained();
            }
            wake_all(producer);
            return Poll::Ready(slot);
        }

        let queued = ticket.is_some_and(|t| state.consumers.contains(t));
        state.consumers.park(ticket, cx.waker());
        debug_assert_waiters_exclusive!(state);
        drop(state);

        if !queued {
            trace!("relay empty, consumer suspended");
            if self.config.enable_metrics {
                self.metrics.record_consumer_suspension();
            }
        }
        Poll::Pending
    }
}

impl<T> BoundedRelay<T> {
    /// Creates a relay holding at most `capacity` undrained slots.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        Self::with_config(RelayConfig::default().with_capacity(capacity))
    }

    /// Creates a relay from a full configuration.
    pub fn with_config(config: RelayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    /// Skips validation; the hub validates its relay config once up front.
    pub(crate) fn from_valid(config: RelayConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RelayState::new(config.capacity)),
                metrics: RelayMetrics::new(),
                config,
            }),
        }
    }

    // ---------------------------------------------------------------------
    // STATUS
    // ---------------------------------------------------------------------

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.config.capacity
    }

    /// Number of written slots the consumer has not taken yet.
    pub fn len(&self) -> usize {
        self.shared.state.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once the terminal slot has been written.
    pub fn is_terminated(&self) -> bool {
        self.shared.state.lock().terminated
    }

    /// Returns `true` if the consumer went away before the terminal slot.
    pub fn is_detached(&self) -> bool {
        self.shared.state.lock().detached
    }

    /// Counter snapshot; all zero unless metrics were enabled.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Writes `value`, suspending while the ring is full.
    ///
    /// Dropping the returned future while it is suspended withdraws the write.
    pub async fn next(&self, value: T) -> Result<(), RelayError> {
        self.write(Slot::Value(value)).await
    }

    /// Ends the stream normally, after every value already written.
    ///
    /// Subject to the same capacity rule as a value.
    pub async fn complete(&self) -> Result<(), RelayError> {
        self.write(Slot::Completed).await
    }

    /// Ends the stream with `cause`, which the consumer receives untouched.
    pub async fn fail(&self, cause: Cause) -> Result<(), RelayError> {
        self.write(Slot::Failed(cause)).await
    }

    /// Writes `value` only if that needs no suspension.
    ///
    /// Returns the value back when the ring is full, terminated or detached.
    pub fn try_next(&self, value: T) -> Result<(), T> {
        let mut state = self.shared.state.lock();
        if state.terminated || state.detached || state.is_full() {
            return Err(value);
        }
        let consumer = state.push(Slot::Value(value));
        drop(state);

        if self.shared.config.enable_metrics {
            self.shared.metrics.record_sent();
        }
        wake_all(consumer);
        Ok(())
    }

    pub(crate) async fn write(&self, slot: Slot<T>) -> Result<(), RelayError> {
        let mut pending = Some(slot);
        let mut parked = Parked::new(&self.shared, Side::Producer);
        let ticket = &mut parked.ticket;
        poll_fn(|cx| self.shared.poll_push(cx, &mut pending, &mut *ticket)).await
    }

    /// Writes `slot` into a relay no producer has written to yet. The caller
    /// sizes the relay so that every seeded slot fits.
    pub(crate) fn seed(&self, slot: Slot<T>) {
        let mut state = self.shared.state.lock();
        if state.terminated || state.is_full() {
            return;
        }
        let consumer = state.push(slot);
        drop(state);
        wake_all(consumer);
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Claims the single consumer side of this relay.
    ///
    /// Fails with [`ProtocolViolation::AlreadyDraining`] on a second claim.
    pub fn receiver(&self) -> Result<RelayReceiver<T>, ProtocolViolation> {
        let mut state = self.shared.state.lock();
        if state.claimed {
            return Err(ProtocolViolation::AlreadyDraining);
        }
        state.claimed = true;
        Ok(RelayReceiver {
            relay: self.clone(),
            ticket: None,
            done: false,
        })
    }

    /// Hands every value to `collector` until the terminal slot.
    ///
    /// Returns `Ok(())` on completion and [`DrainError::Failed`] with the
    /// producer's cause on failure. May be called once per relay. Dropping the
    /// future before it finishes detaches the consumer.
    pub async fn drain<F>(&self, mut collector: F) -> Result<(), DrainError>
    where
        F: FnMut(T),
    {
        let mut receiver = self.receiver()?;
        while let Some(item) = receiver.recv().await {
            collector(item.map_err(DrainError::Failed)?);
        }
        Ok(())
    }

    /// Detaches a consumer side that was never claimed.
    pub(crate) fn abandon(&self) {
        let mut state = self.shared.state.lock();
        if state.claimed {
            return;
        }
        state.claimed = true;
        let (ring, producers) = state.detach();
        drop(state);

        trace!("unclaimed relay abandoned");
        wake_all(producers);
        drop(ring);
    }
}

impl<T> Clone for BoundedRelay<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for BoundedRelay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("BoundedRelay")
            .field("capacity", &state.capacity())
            .field("len", &state.count)
            .field("terminated", &state.terminated)
            .field("detached", &state.detached)
            .finish()
    }
}

/// The claimed consumer side of a [`BoundedRelay`].
///
/// Yields values in write order, then `Some(Err(cause))` for a failed stream,
/// then `None` forever. Dropping it before the terminal slot detaches the
/// consumer: pending and future writes fail with [`RelayError::Detached`].
pub struct RelayReceiver<T> {
    relay: BoundedRelay<T>,
    ticket: Option<Ticket>,
    done: bool,
}

impl<T> RelayReceiver<T> {
    /// Polls for the next item, registering `cx` while the ring is empty.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<T, Cause>>> {
        if self.done {
            return Poll::Ready(None);
        }
        let slot = ready!(self.relay.shared.poll_pop(cx, &mut self.ticket));
        Poll::Ready(self.accept(slot))
    }

    /// Waits for the next item.
    pub async fn recv(&mut self) -> Option<Result<T, Cause>> {
        if self.done {
            return None;
        }
        self.unpark();

        let slot = {
            let shared = &*self.relay.shared;
            let mut parked = Parked::new(shared, Side::Consumer);
            let ticket = &mut parked.ticket;
            poll_fn(|cx| shared.poll_pop(cx, &mut *ticket)).await
        };
        self.accept(slot)
    }

    /// Returns `true` once the terminal slot has been observed.
    pub fn is_finished(&self) -> bool {
        self.done
    }

    /// Slots written but not yet received, the terminal marker included.
    pub fn len(&self) -> usize {
        self.relay.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relay.is_empty()
    }

    fn accept(&mut self, slot: Slot<T>) -> Option<Result<T, Cause>> {
        match slot {
            Slot::Value(value) => Some(Ok(value)),
            Slot::Completed => {
                self.done = true;
                None
            }
            Slot::Failed(cause) => {
                self.done = true;
                Some(Err(cause))
            }
        }
    }

    /// Drops a ticket left behind by `poll_recv`.
    fn unpark(&mut self) {
        if let Some(t) = self.ticket.take() {
            self.relay.shared.state.lock().consumers.cancel(t);
        }
    }
}

impl<T> Drop for RelayReceiver<T> {
    fn drop(&mut self) {
        let mut state = self.relay.shared.state.lock();
        if let Some(t) = self.ticket.take() {
            state.consumers.cancel(t);
        }
        if self.done {
            return;
        }
        let (ring, producers) = state.detach();
        drop(state);

        trace!("relay consumer detached");
        wake_all(producers);
        drop(ring);
    }
}

impl<T> fmt::Debug for RelayReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayReceiver")
            .field("relay", &self.relay)
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Debug, thiserror::Error)]
    #[error("upstream broke")]
    struct Upstream;

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(
            BoundedRelay::<u8>::new(0).unwrap_err(),
            ConfigError::ZeroCapacity
        );
    }

    #[tokio::test]
    async fn test_buffered_values_then_complete() {
        let relay = BoundedRelay::new(4).unwrap();
        for i in 0..3 {
            relay.next(i).await.unwrap();
        }
        relay.complete().await.unwrap();
        assert_eq!(relay.len(), 4);
        assert!(relay.is_terminated());

        let mut seen = Vec::new();
        relay.drain(|v| seen.push(v)).await.unwrap();
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(relay.is_empty());
    }

    #[tokio::test]
    async fn test_ring_wraps_around() {
        let relay = BoundedRelay::new(2).unwrap();
        let mut rx = relay.receiver().unwrap();
        for round in 0..5 {
            relay.next(round * 2).await.unwrap();
            relay.next(round * 2 + 1).await.unwrap();
            assert!(relay.try_next(99).is_err());
            assert_eq!(rx.recv().await.unwrap().unwrap(), round * 2);
            assert_eq!(rx.recv().await.unwrap().unwrap(), round * 2 + 1);
        }
        let state = relay.shared.state.lock();
        assert_eq!(state.head, state.tail);
        assert_eq!(state.count, 0);
    }

    #[tokio::test]
    async fn test_second_terminal_rejected() {
        let relay = BoundedRelay::<u32>::new(4).unwrap();
        relay.complete().await.unwrap();
        assert_eq!(
            relay.complete().await,
            Err(ProtocolViolation::AlreadyTerminated.into())
        );
        assert_eq!(
            relay.fail(Arc::new(Upstream)).await,
            Err(ProtocolViolation::AlreadyTerminated.into())
        );
        assert_eq!(
            relay.next(1).await,
            Err(ProtocolViolation::AlreadyTerminated.into())
        );
    }

    #[tokio::test]
    async fn test_second_drain_rejected() {
        let relay = BoundedRelay::<u32>::new(1).unwrap();
        relay.complete().await.unwrap();
        relay.drain(|_| {}).await.unwrap();

        let err = relay.drain(|_| {}).await.unwrap_err();
        assert!(matches!(
            err,
            DrainError::Protocol(ProtocolViolation::AlreadyDraining)
        ));
    }

    #[tokio::test]
    async fn test_failure_delivered_verbatim() {
        let relay = BoundedRelay::new(2).unwrap();
        let cause: Cause = Arc::new(Upstream);
        relay.next(7).await.unwrap();
        relay.fail(Arc::clone(&cause)).await.unwrap();

        let mut seen = Vec::new();
        let err = relay.drain(|v| seen.push(v)).await.unwrap_err();
        assert_eq!(seen, vec![7]);
        assert!(Arc::ptr_eq(err.cause().unwrap(), &cause));
    }

    #[tokio::test]
    async fn test_terminal_waits_for_capacity() {
        let relay = BoundedRelay::new(1).unwrap();
        relay.next(1).await.unwrap();

        // The completion marker queues behind the value like any other write.
        let mut completing = Box::pin(relay.complete());
        assert!(futures_util::poll!(completing.as_mut()).is_pending());
        assert!(!relay.is_terminated());

        let mut rx = relay.receiver().unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap(), 1);
        completing.await.unwrap();
        assert!(rx.recv().await.is_none());
        assert!(rx.is_finished());
    }

    #[tokio::test]
    async fn test_cancelled_producer_dequeues() {
        let relay = BoundedRelay::new(1).unwrap();
        relay.next(1).await.unwrap();

        let res = timeout(Duration::from_millis(10), relay.next(2)).await;
        assert!(res.is_err());
        {
            let state = relay.shared.state.lock();
            assert!(state.producers.is_empty());
            assert_eq!(state.count, 1);
        }

        // The withdrawn value never lands; the next one does.
        let mut rx = relay.receiver().unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap(), 1);
        relay.next(3).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_recv_dequeues() {
        let relay = BoundedRelay::new(1).unwrap();
        let mut rx = relay.receiver().unwrap();

        assert!(timeout(Duration::from_millis(10), rx.recv()).await.is_err());
        assert!(relay.shared.state.lock().consumers.is_empty());

        relay.next(5).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_concurrent_producer_rejected() {
        let relay = BoundedRelay::new(1).unwrap();
        relay.next(1).await.unwrap();

        let mut first = Box::pin(relay.next(2));
        assert!(futures_util::poll!(first.as_mut()).is_pending());
        assert_eq!(
            relay.next(3).await,
            Err(ProtocolViolation::ConcurrentProducer.into())
        );
    }

    #[tokio::test]
    async fn test_dropped_receiver_detaches() {
        let relay = BoundedRelay::new(1).unwrap();
        relay.next(1).await.unwrap();

        let mut blocked = Box::pin(relay.next(2));
        assert!(futures_util::poll!(blocked.as_mut()).is_pending());

        drop(relay.receiver().unwrap());
        assert_eq!(blocked.await, Err(RelayError::Detached));
        assert!(relay.is_detached());
        assert_eq!(relay.next(3).await, Err(RelayError::Detached));
        assert!(relay.receiver().is_err());
    }

    #[tokio::test]
    async fn test_metrics_counted_when_enabled() {
        let relay = BoundedRelay::with_config(RelayConfig::new(1, true)).unwrap();
        let consumer = {
            let relay = relay.clone();
            tokio::spawn(async move {
                let mut n = 0;
                relay.drain(|_: u32| n += 1).await?;
                Ok::<_, DrainError>(n)
            })
        };
        for i in 0..10 {
            relay.next(i).await.unwrap();
        }
        relay.complete().await.unwrap();
        assert_eq!(consumer.await.unwrap().unwrap(), 10);

        let snapshot = relay.metrics();
        assert_eq!(snapshot.values_sent, 10);
        assert_eq!(snapshot.values_drained, 10);
    }

    #[tokio::test]
    async fn test_waiter_queues_exclusive_under_load() {
        let relay = BoundedRelay::new(1).unwrap();
        let consumer = {
            let relay = relay.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                relay.drain(|v| seen.push(v)).await?;
                Ok::<_, DrainError>(seen)
            })
        };
        for i in 0..1_000u32 {
            relay.next(i).await.unwrap();
            let state = relay.shared.state.lock();
            assert!(state.producers.is_empty() || state.consumers.is_empty());
        }
        relay.complete().await.unwrap();
        let seen = consumer.await.unwrap().unwrap();
        assert_eq!(seen, (0..1_000).collect::<Vec<_>>());
    }
}
