//! Subjects that keep emitted values for subscribers that join later.
//!
//! Unlike [`MulticastHub`](crate::MulticastHub), a subject has no quorum: it
//! emits as soon as it is asked to, with or without subscribers, and records
//! what it emitted so a new subscriber can catch up.
//!
//! - [`ReplaySubject`] replays every value (or the last `n`) to a new
//!   subscriber, including after termination.
//! - [`BehaviorSubject`] replays only the latest value, and nothing once it
//!   has terminated.

use crate::config::{RelayConfig, ReplayConfig};
use crate::error::{ConfigError, HubError, ProtocolViolation};
use crate::hub::{fan_out, fan_out_terminal, prune_detached, ConsumerHandle, SubscriberId, Subscribers};
use crate::relay::BoundedRelay;
use crate::slot::{Cause, Slot};
use crate::waiter::{wake_all, Ticket, WaiterQueue};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::poll_fn;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::task::Poll;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retention {
    /// Latest value only, dropped on termination.
    Latest,
    Last(usize),
    All,
}

impl Retention {
    fn record<T>(self, history: &mut VecDeque<T>, value: T) {
        history.push_back(value);
        let limit = match self {
            Self::Latest => 1,
            Self::Last(n) => n,
            Self::All => return,
        };
        while history.len() > limit {
            history.pop_front();
        }
    }
}

struct Core<T> {
    relay: RelayConfig,
    retention: Retention,
    next_id: AtomicU64,
    /// Held across a whole emit/complete/fail.
    turn: tokio::sync::Mutex<()>,
    state: Mutex<CoreState<T>>,
}

struct CoreState<T> {
    history: VecDeque<T>,
    subscribers: Subscribers<T>,
    terminal: Option<Slot<T>>,
    watchers: WaiterQueue,
}

/// Cancels a watcher ticket when `await_subscribers` is dropped.
struct Watching<'a, T> {
    core: &'a Core<T>,
    ticket: Option<Ticket>,
}

impl<T> Drop for Watching<'_, T> {
    fn drop(&mut self) {
        if let Some(t) = self.ticket.take() {
            self.core.state.lock().watchers.cancel(t);
        }
    }
}

impl<T> Core<T> {
    fn new(relay: RelayConfig, retention: Retention, history: VecDeque<T>) -> Self {
        Self {
            relay,
            retention,
            next_id: AtomicU64::new(0),
            turn: tokio::sync::Mutex::new(()),
            state: Mutex::new(CoreState {
                history,
                subscribers: Vec::new(),
                terminal: None,
                watchers: WaiterQueue::new(),
            }),
        }
    }

    fn is_terminated(&self) -> bool {
        self.state.lock().terminal.is_some()
    }

    fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock();
        if state.terminal.is_none() {
            prune_detached(&mut state.subscribers);
        }
        state.subscribers.len()
    }

    async fn await_subscribers(&self, n: usize) {
        let mut watching = Watching {
            core: self,
            ticket: None,
        };
        let ticket = &mut watching.ticket;
        poll_fn(|cx| {
            let mut state = self.state.lock();
            let terminated = state.terminal.is_some();
            if !terminated {
                prune_detached(&mut state.subscribers);
            }
            if state.subscribers.len() >= n || terminated {
                if let Some(t) = ticket.take() {
                    state.watchers.cancel(t);
                }
                return Poll::Ready(());
            }
            state.watchers.park(&mut *ticket, cx.waker());
            Poll::Pending
        })
        .await;
    }

    async fn terminate(&self, terminal: Slot<T>) -> Result<(), HubError> {
        let _turn = self.turn.lock().await;

        let (relays, released) = {
            let mut state = self.state.lock();
            if state.terminal.is_some() {
                return Err(ProtocolViolation::AlreadyTerminated.into());
            }
            prune_detached(&mut state.subscribers);
            state.terminal = terminal.terminal::<T>();
            if self.retention == Retention::Latest {
                state.history.clear();
            }
            (state.subscribers.clone(), state.watchers.release_all())
        };
        wake_all(released);
        debug!(subscribers = relays.len(), "subject terminated");

        fan_out_terminal(relays, terminal).await;
        Ok(())
    }
}

impl<T: Clone> Core<T> {
    /// New subscriber whose relay starts with the retained history and, on a
    /// terminated subject, the terminal slot.
    fn register(&self) -> ConsumerHandle<T> {
        let id = SubscriberId::next(&self.next_id);

        let mut state = self.state.lock();
        let seeded = state.history.len() + usize::from(state.terminal.is_some());
        let capacity = self.relay.capacity.max(seeded);
        let relay = BoundedRelay::from_valid(self.relay.with_capacity(capacity));
        for value in &state.history {
            relay.seed(Slot::Value(value.clone()));
        }

        let mut released = Vec::new();
        if let Some(terminal) = state.terminal.as_ref().and_then(|t| t.terminal()) {
            relay.seed(terminal);
            trace!(%id, replayed = seeded - 1, "late subscriber replayed to the end");
        } else {
            prune_detached(&mut state.subscribers);
            state.subscribers.push((id, relay.clone()));
            released = state.watchers.release_all();
            trace!(%id, replayed = seeded, "subscriber registered");
        }
        drop(state);
        wake_all(released);

        ConsumerHandle::new(id, relay)
    }

    async fn emit(&self, value: T) -> Result<(), HubError> {
        let _turn = self.turn.lock().await;

        let relays = {
            let mut state = self.state.lock();
            if state.terminal.is_some() {
                return Err(ProtocolViolation::AlreadyTerminated.into());
            }
            self.retention.record(&mut state.history, value.clone());
            prune_detached(&mut state.subscribers);
            state.subscribers.clone()
        };

        let gone = fan_out(&relays, value).await;
        if !gone.is_empty() {
            self.state
                .lock()
                .subscribers
                .retain(|(id, _)| !gone.contains(id));
        }
        Ok(())
    }

    fn latest(&self) -> Option<T> {
        self.state.lock().history.back().cloned()
    }
}

// =============================================================================
// REPLAY SUBJECT
// =============================================================================

/// Multicast subject that records emitted values and replays them to every
/// new subscriber before live values.
///
/// Emission never waits for subscribers to arrive, but it does wait for
/// every present subscriber's relay to accept the value, exactly like
/// [`MulticastHub::emit`](crate::MulticastHub::emit). A subscriber that joins
/// after termination receives the retained values followed by the same
/// terminal signal.
///
/// `ReplaySubject` is a cheap handle; clones share the same subject.
pub struct ReplaySubject<T> {
    core: Arc<Core<T>>,
}

impl<T> ReplaySubject<T> {
    /// Keeps every value, with default single-slot relays.
    pub fn new() -> Self {
        Self::build(ReplayConfig::default())
    }

    /// Keeps only the last `max_size` values.
    pub fn with_limit(max_size: usize) -> Result<Self, ConfigError> {
        Self::with_config(ReplayConfig::last(max_size))
    }

    pub fn with_config(config: ReplayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ReplayConfig) -> Self {
        let retention = config.max_size.map_or(Retention::All, Retention::Last);
        Self {
            core: Arc::new(Core::new(config.relay, retention, VecDeque::new())),
        }
    }

    /// Number of values a new subscriber would be replayed.
    pub fn retained(&self) -> usize {
        self.core.state.lock().history.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.core.subscriber_count()
    }

    pub fn is_terminated(&self) -> bool {
        self.core.is_terminated()
    }

    /// Suspends until at least `n` subscribers are registered, or the
    /// subject has terminated.
    pub async fn await_subscribers(&self, n: usize) {
        self.core.await_subscribers(n).await;
    }

    /// Completes the stream for every subscriber, exactly once.
    pub async fn complete(&self) -> Result<(), HubError> {
        self.core.terminate(Slot::Completed).await
    }

    /// Fails the stream for every subscriber with the same `cause`.
    pub async fn fail(&self, cause: Cause) -> Result<(), HubError> {
        self.core.terminate(Slot::Failed(cause)).await
    }
}

impl<T: Clone> ReplaySubject<T> {
    /// Attaches a consumer that first receives the retained values.
    pub fn register(&self) -> ConsumerHandle<T> {
        self.core.register()
    }

    /// Records `value` and delivers it to every current subscriber.
    pub async fn emit(&self, value: T) -> Result<(), HubError> {
        self.core.emit(value).await
    }
}

impl<T> Default for ReplaySubject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ReplaySubject<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> fmt::Debug for ReplaySubject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.state.lock();
        f.debug_struct("ReplaySubject")
            .field("retained", &state.history.len())
            .field("subscribers", &state.subscribers.len())
            .field("terminated", &state.terminal.is_some())
            .finish()
    }
}

// =============================================================================
// BEHAVIOR SUBJECT
// =============================================================================

/// Multicast subject that hands its latest value to every new subscriber.
///
/// A subscriber first receives the current value, if there is one, then every
/// value emitted after it registered. Once terminated the subject forgets its
/// value; later subscribers receive only the terminal signal.
pub struct BehaviorSubject<T> {
    core: Arc<Core<T>>,
}

impl<T> BehaviorSubject<T> {
    /// A subject with no current value and default single-slot relays.
    pub fn new() -> Self {
        Self::build(RelayConfig::default(), None)
    }

    /// A subject whose current value starts as `initial`.
    pub fn with_initial(initial: T) -> Self {
        Self::build(RelayConfig::default(), Some(initial))
    }

    pub fn with_config(relay: RelayConfig, initial: Option<T>) -> Result<Self, ConfigError> {
        relay.validate()?;
        Ok(Self::build(relay, initial))
    }

    fn build(relay: RelayConfig, initial: Option<T>) -> Self {
        Self {
            core: Arc::new(Core::new(relay, Retention::Latest, initial.into_iter().collect())),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.core.subscriber_count()
    }

    pub fn is_terminated(&self) -> bool {
        self.core.is_terminated()
    }

    /// Suspends until at least `n` subscribers are registered, or the
    /// subject has terminated.
    pub async fn await_subscribers(&self, n: usize) {
        self.core.await_subscribers(n).await;
    }

    /// Completes the stream for every subscriber, exactly once.
    pub async fn complete(&self) -> Result<(), HubError> {
        self.core.terminate(Slot::Completed).await
    }

    /// Fails the stream for every subscriber with the same `cause`.
    pub async fn fail(&self, cause: Cause) -> Result<(), HubError> {
        self.core.terminate(Slot::Failed(cause)).await
    }
}

impl<T: Clone> BehaviorSubject<T> {
    /// The current value; `None` before the first value and after
    /// termination.
    pub fn value(&self) -> Option<T> {
        self.core.latest()
    }

    /// Attaches a consumer that first receives the current value.
    pub fn register(&self) -> ConsumerHandle<T> {
        self.core.register()
    }

    /// Makes `value` current and delivers it to every subscriber.
    pub async fn emit(&self, value: T) -> Result<(), HubError> {
        self.core.emit(value).await
    }
}

impl<T> Default for BehaviorSubject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for BehaviorSubject<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> fmt::Debug for BehaviorSubject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.state.lock();
        f.debug_struct("BehaviorSubject")
            .field("has_value", &!state.history.is_empty())
            .field("subscribers", &state.subscribers.len())
            .field("terminated", &state.terminal.is_some())
            .finish()
    }
}
