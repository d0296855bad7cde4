//! Quorum-gated multicast over per-subscriber relays.

use crate::config::HubConfig;
use crate::error::{ConfigError, DrainError, HubError, ProtocolViolation};
use crate::relay::{BoundedRelay, RelayReceiver};
use crate::slot::{Cause, Slot};
use crate::waiter::{wake_all, Ticket, WaiterQueue};
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::fmt;
use std::future::poll_fn;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, trace};

/// Lifecycle of a [`MulticastHub`].
///
/// `AwaitingQuorum → Active → Terminated`; `Terminated` is absorbing. A hub
/// completed before its quorum goes straight to `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubState {
    AwaitingQuorum,
    Active,
    Terminated,
}

/// Identity of one hub registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub(crate) fn next(counter: &AtomicU64) -> Self {
        Self(counter.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

pub(crate) type Subscribers<T> = Vec<(SubscriberId, BoundedRelay<T>)>;

/// Drops subscribers whose consumer went away.
pub(crate) fn prune_detached<T>(subscribers: &mut Subscribers<T>) {
    let before = subscribers.len();
    subscribers.retain(|(_, relay)| !relay.is_detached());
    let pruned = before - subscribers.len();
    if pruned > 0 {
        debug!(pruned, remaining = subscribers.len(), "detached subscribers removed");
    }
}

/// Writes `value` into every relay concurrently and returns the subscribers
/// whose relay refused it.
pub(crate) async fn fan_out<T: Clone>(
    subscribers: &[(SubscriberId, BoundedRelay<T>)],
    value: T,
) -> Vec<SubscriberId> {
    let deliveries = subscribers.iter().map(|(id, relay)| {
        let value = value.clone();
        async move { (*id, relay.next(value).await) }
    });

    let mut refused = Vec::new();
    for (id, result) in join_all(deliveries).await {
        if let Err(err) = result {
            debug!(%id, error = %err, "subscriber refused value, removing");
            refused.push(id);
        }
    }
    refused
}

/// Writes a copy of `terminal` into every relay concurrently. Relays that
/// refuse it are skipped.
pub(crate) async fn fan_out_terminal<T>(subscribers: Subscribers<T>, terminal: Slot<T>) {
    let writes = subscribers.into_iter().filter_map(|(id, relay)| {
        let slot = terminal.terminal::<T>()?;
        Some(async move { (id, relay.write(slot).await) })
    });
    for (id, result) in join_all(writes).await {
        if let Err(err) = result {
            trace!(%id, error = %err, "terminal signal not delivered");
        }
    }
}

/// Multicast subject that holds its producer back until enough consumers
/// have attached, then fans every item out to all of them.
///
/// Each subscriber owns an independent [`BoundedRelay`], so a slow consumer
/// only back-pressures through its own relay. [`emit`](Self::emit) returns
/// once every relay present at emission time has accepted the value.
/// Producer operations are serialized through a FIFO-fair turn, so all
/// subscribers observe the same order.
///
/// `MulticastHub` is a cheap handle; clones share the same hub.
pub struct MulticastHub<T> {
    inner: Arc<HubInner<T>>,
}

struct HubInner<T> {
    config: HubConfig,
    next_id: AtomicU64,
    /// Held across a whole emit/complete/fail.
    turn: tokio::sync::Mutex<()>,
    state: Mutex<HubShared<T>>,
}

struct HubShared<T> {
    phase: HubState,
    subscribers: Subscribers<T>,
    /// Terminal slot handed to late subscribers.
    terminal: Option<Slot<T>>,
    /// Producers held back until the quorum is reached.
    barrier: WaiterQueue,
    /// Callers of `await_subscribers`.
    watchers: WaiterQueue,
}

#[derive(Debug, Clone, Copy)]
enum Queue {
    Barrier,
    Watchers,
}

impl<T> HubShared<T> {
    fn queue(&mut self, queue: Queue) -> &mut WaiterQueue {
        match queue {
            Queue::Barrier => &mut self.barrier,
            Queue::Watchers => &mut self.watchers,
        }
    }

    /// Drops subscribers whose consumer went away. The set is frozen once
    /// the hub has terminated.
    fn prune(&mut self) {
        if self.phase != HubState::Terminated {
            prune_detached(&mut self.subscribers);
        }
    }

    /// Removes `ticket` from `queue` once the caller no longer waits.
    fn settle(&mut self, queue: Queue, ticket: &mut Option<Ticket>) {
        if let Some(t) = ticket.take() {
            self.queue(queue).cancel(t);
        }
    }

    fn park(&mut self, queue: Queue, ticket: &mut Option<Ticket>, cx: &Context<'_>) -> bool {
        let queue = self.queue(queue);
        let fresh = !ticket.is_some_and(|t| queue.contains(t));
        queue.park(ticket, cx.waker());
        fresh
    }
}

/// Cancels a barrier or watcher ticket when the waiting future is dropped.
struct HubParked<'a, T> {
    inner: &'a HubInner<T>,
    queue: Queue,
    ticket: Option<Ticket>,
}

impl<'a, T> HubParked<'a, T> {
    fn new(inner: &'a HubInner<T>, queue: Queue) -> Self {
        Self {
            inner,
            queue,
            ticket: None,
        }
    }
}

impl<T> Drop for HubParked<'_, T> {
    fn drop(&mut self) {
        if self.ticket.is_some() {
            self.inner.state.lock().settle(self.queue, &mut self.ticket);
        }
    }
}

impl<T> HubInner<T> {
    fn remove(&self, ids: &[SubscriberId]) {
        let mut state = self.state.lock();
        if state.phase == HubState::Terminated {
            return;
        }
        state.subscribers.retain(|(id, _)| !ids.contains(id));
        debug!(removed = ids.len(), remaining = state.subscribers.len(), "subscribers removed");
    }
}

impl<T> MulticastHub<T> {
    /// Creates a hub that withholds emission until `min_subscribers` have
    /// registered, with default single-slot relays.
    pub fn new(min_subscribers: usize) -> Result<Self, ConfigError> {
        Self::with_config(HubConfig::new(min_subscribers))
    }

    pub fn with_config(config: HubConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(HubInner {
                config,
                next_id: AtomicU64::new(0),
                turn: tokio::sync::Mutex::new(()),
                state: Mutex::new(HubShared {
                    phase: HubState::AwaitingQuorum,
                    subscribers: Vec::new(),
                    terminal: None,
                    barrier: WaiterQueue::new(),
                    watchers: WaiterQueue::new(),
                }),
            }),
        })
    }

    // ---------------------------------------------------------------------
    // STATUS
    // ---------------------------------------------------------------------

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    #[inline]
    pub fn min_subscribers(&self) -> usize {
        self.inner.config.min_subscribers
    }

    pub fn state(&self) -> HubState {
        self.inner.state.lock().phase
    }

    /// Number of live registrations.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.prune();
        state.subscribers.len()
    }

    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Attaches a new consumer backed by its own relay.
    ///
    /// After termination the relay holds only the terminal signal already
    /// delivered to everybody else; values are never replayed.
    pub fn register(&self) -> ConsumerHandle<T> {
        let id = SubscriberId::next(&self.inner.next_id);
        let relay = BoundedRelay::from_valid(self.inner.config.relay);

        let mut state = self.inner.state.lock();
        let mut released = Vec::new();
        if let Some(terminal) = state.terminal.as_ref().and_then(|t| t.terminal()) {
            relay.seed(terminal);
            trace!(%id, "late subscriber receives terminal signal only");
        } else {
            state.prune();
            state.subscribers.push((id, relay.clone()));
            released.extend(state.watchers.release_all());

            if state.phase == HubState::AwaitingQuorum
                && state.subscribers.len() >= self.inner.config.min_subscribers
            {
                state.phase = HubState::Active;
                released.extend(state.barrier.release_all());
                debug!(
                    subscribers = state.subscribers.len(),
                    min_subscribers = self.inner.config.min_subscribers,
                    "hub quorum reached"
                );
            }
            trace!(%id, subscribers = state.subscribers.len(), "subscriber registered");
        }
        drop(state);
        wake_all(released);

        ConsumerHandle::new(id, relay)
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Suspends until at least `n` subscribers are registered.
    ///
    /// Independent of the emission quorum. Also returns once the hub has
    /// terminated, since the subscriber set is frozen from then on.
    pub async fn await_subscribers(&self, n: usize) {
        let inner = &*self.inner;
        let mut parked = HubParked::new(inner, Queue::Watchers);
        let ticket = &mut parked.ticket;
        poll_fn(|cx| {
            let mut state = inner.state.lock();
            state.prune();
            if state.subscribers.len() >= n || state.phase == HubState::Terminated {
                state.settle(Queue::Watchers, &mut *ticket);
                return Poll::Ready(());
            }
            if state.park(Queue::Watchers, &mut *ticket, cx) {
                trace!(wanted = n, current = state.subscribers.len(), "waiting for subscribers");
            }
            Poll::Pending
        })
        .await;
    }

    async fn await_quorum(&self) -> Result<(), HubError> {
        let inner = &*self.inner;
        let mut parked = HubParked::new(inner, Queue::Barrier);
        let ticket = &mut parked.ticket;
        poll_fn(|cx| {
            let mut state = inner.state.lock();
            match state.phase {
                HubState::Active => {
                    state.settle(Queue::Barrier, &mut *ticket);
                    Poll::Ready(Ok(()))
                }
                HubState::Terminated => {
                    state.settle(Queue::Barrier, &mut *ticket);
                    Poll::Ready(Err(ProtocolViolation::AlreadyTerminated.into()))
                }
                HubState::AwaitingQuorum => {
                    if state.park(Queue::Barrier, &mut *ticket, cx) {
                        trace!(
                            subscribers = state.subscribers.len(),
                            min_subscribers = inner.config.min_subscribers,
                            "emit held at quorum barrier"
                        );
                    }
                    Poll::Pending
                }
            }
        })
        .await
    }

    /// Delivers `value` to every subscriber registered at this instant.
    ///
    /// Suspends at the quorum barrier first, then until every relay has
    /// accepted the value (relays are written concurrently). A subscriber
    /// whose relay refuses the value, usually because its consumer went
    /// away, is dropped from the set; the emission still succeeds for
    /// everybody else.
    ///
    /// Dropping the future after the barrier may leave the value delivered
    /// to some subscribers only.
    pub async fn emit(&self, value: T) -> Result<(), HubError>
    where
        T: Clone,
    {
        self.await_quorum().await?;
        let _turn = self.inner.turn.lock().await;

        let relays = {
            let mut state = self.inner.state.lock();
            if state.phase == HubState::Terminated {
                return Err(ProtocolViolation::AlreadyTerminated.into());
            }
            state.prune();
            state.subscribers.clone()
        };

        let gone = fan_out(&relays, value).await;
        if !gone.is_empty() {
            self.inner.remove(&gone);
        }
        Ok(())
    }

    /// Completes the stream for every subscriber, exactly once.
    pub async fn complete(&self) -> Result<(), HubError> {
        self.terminate(Slot::Completed).await
    }

    /// Fails the stream for every subscriber with the same `cause`.
    pub async fn fail(&self, cause: Cause) -> Result<(), HubError> {
        self.terminate(Slot::Failed(cause)).await
    }

    async fn terminate(&self, terminal: Slot<T>) -> Result<(), HubError> {
        let _turn = self.inner.turn.lock().await;

        let (relays, released) = {
            let mut state = self.inner.state.lock();
            if state.phase == HubState::Terminated {
                return Err(ProtocolViolation::AlreadyTerminated.into());
            }
            state.prune();
            state.phase = HubState::Terminated;
            state.terminal = terminal.terminal::<T>();

            let mut released = state.barrier.release_all();
            released.extend(state.watchers.release_all());
            (state.subscribers.clone(), released)
        };
        wake_all(released);
        debug!(subscribers = relays.len(), "hub terminated");

        fan_out_terminal(relays, terminal).await;
        Ok(())
    }
}

impl<T> Clone for MulticastHub<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for MulticastHub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("MulticastHub")
            .field("state", &state.phase)
            .field("subscribers", &state.subscribers.len())
            .field("min_subscribers", &self.inner.config.min_subscribers)
            .finish()
    }
}

/// One subscription to a hub or subject.
///
/// Only the consumer side is reachable: drain it with [`drain`](Self::drain)
/// or claim it with [`receiver`](Self::receiver). Dropping a handle whose
/// consumer side was never claimed unsubscribes it.
pub struct ConsumerHandle<T> {
    id: SubscriberId,
    relay: BoundedRelay<T>,
}

impl<T> ConsumerHandle<T> {
    pub(crate) fn new(id: SubscriberId, relay: BoundedRelay<T>) -> Self {
        Self { id, relay }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Slots delivered but not yet consumed, the terminal marker included.
    pub fn len(&self) -> usize {
        self.relay.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relay.is_empty()
    }

    /// Capacity of the relay backing this subscription.
    pub fn capacity(&self) -> usize {
        self.relay.capacity()
    }

    /// Returns `true` once the terminal signal has been delivered.
    pub fn is_terminated(&self) -> bool {
        self.relay.is_terminated()
    }

    /// Claims the consumer side; see [`BoundedRelay::receiver`].
    pub fn receiver(&self) -> Result<RelayReceiver<T>, ProtocolViolation> {
        self.relay.receiver()
    }

    /// Hands every item emitted after registration to `collector`.
    ///
    /// See [`BoundedRelay::drain`].
    pub async fn drain<F>(&self, collector: F) -> Result<(), DrainError>
    where
        F: FnMut(T),
    {
        self.relay.drain(collector).await
    }
}

impl<T> Drop for ConsumerHandle<T> {
    fn drop(&mut self) {
        self.relay.abandon();
    }
}

impl<T> fmt::Debug for ConsumerHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerHandle")
            .field("id", &self.id)
            .field("relay", &self.relay)
            .finish()
    }
}
