//! Relaycast - Bounded, Resumable Multicast for Async Tasks
//!
//! Two primitives:
//!
//! - [`BoundedRelay`]: a single-producer/single-consumer ring of fixed
//!   capacity. The producer suspends while it is full, the consumer while it
//!   is empty, and exactly one terminal signal (completion or failure) ends
//!   the stream after every value written before it.
//! - [`MulticastHub`]: withholds emission until a quorum of subscribers has
//!   registered, then fans every value out to one relay per subscriber.
//!
//! Built on the same per-subscriber relays, [`ReplaySubject`] and
//! [`BehaviorSubject`] emit without a quorum and catch new subscribers up
//! with recorded values (all or the last `n`, or the latest one).
//!
//! Suspension is built on plain [`Waker`](std::task::Waker)s, so both work
//! under any executor, single- or multi-threaded. Every suspension point is
//! cancel-safe: dropping a suspended future withdraws its waiter.
//!
//! # Key Features
//!
//! - Per-subscriber relays (a slow consumer only back-pressures itself)
//! - FIFO waiter queues with wakeup hand-off on cancellation
//! - Late hub subscribers see the terminal signal only, never a replay
//! - Optional cache-padded metrics
//!
//! # Example
//!
//! ```
//! use relaycast::{HubConfig, MulticastHub, RelayConfig};
//!
//! # tokio_test_block_on(async {
//! let hub = MulticastHub::with_config(
//!     HubConfig::new(2).with_relay(RelayConfig::buffered()),
//! )?;
//! let a = hub.register();
//! let b = hub.register();
//!
//! for i in 0..3 {
//!     hub.emit(i).await?;
//! }
//! hub.complete().await?;
//!
//! let mut seen = Vec::new();
//! a.drain(|v| seen.push(v)).await?;
//! b.drain(|v| seen.push(v)).await?;
//! assert_eq!(seen, vec![0, 1, 2, 0, 1, 2]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod config;
mod emitter;
mod error;
mod fair;
mod hub;
mod invariants;
mod metrics;
mod relay;
mod slot;
mod subject;
mod waiter;

pub use config::{HubConfig, RelayConfig, ReplayConfig};
pub use emitter::Emitter;
pub use error::{ConfigError, DrainError, HubError, ProtocolViolation, RelayError};
pub use fair::FairGate;
pub use hub::{ConsumerHandle, HubState, MulticastHub, SubscriberId};
pub use metrics::{MetricsSnapshot, RelayMetrics};
pub use relay::{BoundedRelay, RelayReceiver};
pub use slot::{Cause, Slot};
pub use subject::{BehaviorSubject, ReplaySubject};
