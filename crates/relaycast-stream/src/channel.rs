//! Channel construction.

use crate::error::StreamError;
use crate::sink::{HubSink, RelaySink};
use crate::stream::RelayStream;
use relaycast::{BoundedRelay, HubConfig, MulticastHub, RelayConfig};

/// Creates a relay and returns its two ends as a sink and a stream.
///
/// # Example
///
/// ```
/// use futures::{SinkExt, StreamExt};
/// use relaycast::RelayConfig;
/// use relaycast_stream::channel;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let (mut tx, rx) = channel::<u64>(RelayConfig::new(4, false))?;
///
/// tx.send(42).await?;
/// tx.close().await?;
///
/// let items: Vec<_> = rx.map(Result::unwrap).collect().await;
/// assert_eq!(items, vec![42]);
/// # Ok::<(), relaycast_stream::StreamError>(())
/// # }).unwrap();
/// ```
pub fn channel<T: Send + 'static>(
    config: RelayConfig,
) -> Result<(RelaySink<T>, RelayStream<T>), StreamError> {
    let relay = BoundedRelay::with_config(config)?;
    let stream = RelayStream::new(&relay)?;
    Ok((RelaySink::new(relay), stream))
}

/// Creates a hub behind a sink. Subscribe with
/// [`RelayStream::subscribe`] on [`EmitterSink::emitter`](crate::EmitterSink::emitter).
pub fn multicast<T: Clone + Send + 'static>(config: HubConfig) -> Result<HubSink<T>, StreamError> {
    Ok(HubSink::new(MulticastHub::with_config(config)?))
}
