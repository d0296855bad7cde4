//! Async Stream/Sink Adapters for relaycast
//!
//! This crate provides [`futures_core::Stream`] and [`futures_sink::Sink`]
//! implementations over relaycast relays, hubs and subjects, so they plug into async
//! pipelines built from stream combinators.
//!
//! # Features
//!
//! - **Backpressure**: a sink write stays pending until the relay (or every
//!   hub subscriber's relay) has room
//! - **Completion on close**: closing a sink delivers the completion signal
//! - **Failure as an item**: a failed stream ends with one `Err(cause)`
//! - **Detach on drop**: dropping a stream early unblocks the producer
//!
//! # Example
//!
//! ```
//! use futures::{SinkExt, StreamExt};
//! use relaycast::HubConfig;
//! use relaycast_stream::{multicast, RelayStream};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let mut tx = multicast::<u64>(HubConfig::new(2))?;
//! let a = RelayStream::subscribe(tx.emitter())?;
//! let b = RelayStream::subscribe(tx.emitter())?;
//!
//! // Subscribers drain concurrently; each one back-pressures the hub.
//! let consumers = tokio::spawn(futures::future::join(
//!     a.map(Result::unwrap).collect::<Vec<_>>(),
//!     b.map(Result::unwrap).collect::<Vec<_>>(),
//! ));
//! for i in 0..3 {
//!     tx.send(i).await?;
//! }
//! tx.close().await?;
//!
//! let (a, b) = consumers.await.unwrap();
//! assert_eq!(a, vec![0, 1, 2]);
//! assert_eq!(a, b);
//! # Ok::<(), relaycast_stream::StreamError>(())
//! # }).unwrap();
//! ```

mod channel;
mod error;
mod invariants;
mod sink;
mod stream;

pub use channel::{channel, multicast};
pub use error::StreamError;
pub use sink::{EmitterSink, HubSink, RelaySink, ReplaySink};
pub use stream::RelayStream;

// Re-export useful stream combinators
pub use tokio_stream::StreamExt;
