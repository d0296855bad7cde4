//! Integration tests for relaycast-stream.

use futures::{SinkExt, StreamExt};
use relaycast::{BoundedRelay, HubConfig, HubState, RelayConfig, RelayError, ReplaySubject};
use relaycast_stream::{channel, multicast, RelaySink, RelayStream, ReplaySink, StreamError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
#[error("upstream closed")]
struct UpstreamClosed;

#[tokio::test]
async fn test_basic_send_receive() {
    let (mut tx, rx) = channel::<u64>(RelayConfig::new(4, false)).expect("channel");

    tx.send(1).await.expect("send failed");
    tx.send(2).await.expect("send failed");
    tx.send(3).await.expect("send failed");
    tx.close().await.expect("close failed");

    let received: Vec<_> = rx.map(Result::unwrap).collect().await;
    assert_eq!(received, vec![1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_backpressure_through_sink() {
    let (mut tx, mut rx) = channel::<u64>(RelayConfig::default()).expect("channel");

    let producer = tokio::spawn(async move {
        let mut items = futures::stream::iter((0..1_000).map(Ok));
        tx.send_all(&mut items).await?;
        tx.close().await
    });

    let mut received = Vec::new();
    while let Some(item) = rx.next().await {
        received.push(item.expect("stream failed"));
    }
    producer.await.unwrap().expect("producer failed");
    assert_eq!(received, (0..1_000).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_sink_pending_while_full() {
    let relay = BoundedRelay::new(1).unwrap();
    let mut tx = RelaySink::new(relay.clone());
    tx.send(1).await.unwrap();

    // The second item is accepted but its write stays in flight.
    assert!(timeout(Duration::from_millis(20), tx.send(2)).await.is_err());
    assert_eq!(relay.len(), 1);

    let mut rx = RelayStream::new(&relay).unwrap();
    assert_eq!(rx.next().await.unwrap().unwrap(), 1);
    tx.flush().await.unwrap();
    assert_eq!(rx.next().await.unwrap().unwrap(), 2);
}

#[tokio::test]
async fn test_failure_ends_stream_with_error() {
    let relay = BoundedRelay::new(4).unwrap();
    let mut rx = RelayStream::new(&relay).unwrap();

    relay.next(10).await.unwrap();
    relay.fail(Arc::new(UpstreamClosed)).await.unwrap();

    assert_eq!(rx.next().await.unwrap().unwrap(), 10);
    let err = rx.next().await.unwrap().unwrap_err();
    assert_eq!(err.to_string(), "upstream closed");
    assert!(rx.next().await.is_none());
    assert!(futures::stream::FusedStream::is_terminated(&rx));
}

#[tokio::test]
async fn test_closed_sink_rejects_items() {
    let (mut tx, _rx) = channel::<u64>(RelayConfig::new(2, false)).expect("channel");
    tx.close().await.unwrap();
    assert!(tx.is_closed());
    assert_eq!(tx.send(1).await, Err(StreamError::Closed));
    // Closing twice does not complete the relay twice.
    tx.close().await.unwrap();
}

#[tokio::test]
async fn test_dropped_stream_detaches_sink() {
    let (mut tx, rx) = channel::<u64>(RelayConfig::new(1, false)).expect("channel");
    tx.send(1).await.unwrap();
    drop(rx);

    let err = tx.send(2).await.unwrap_err();
    assert_eq!(err, StreamError::Relay(RelayError::Detached));
    assert!(err.is_terminal());
}

#[tokio::test]
async fn test_second_stream_on_relay_rejected() {
    let relay = BoundedRelay::<u8>::new(1).unwrap();
    let _first = RelayStream::new(&relay).unwrap();
    assert!(matches!(
        RelayStream::new(&relay),
        Err(StreamError::Protocol(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hub_sink_fans_out() {
    let mut tx = multicast::<u32>(HubConfig::new(3).with_relay(RelayConfig::new(2, false)))
        .expect("hub");
    let streams: Vec<_> = (0..3)
        .map(|_| RelayStream::subscribe(tx.emitter()).expect("subscribe"))
        .collect();
    assert!(streams.iter().all(|s| s.subscriber().is_some()));
    assert_eq!(tx.emitter().state(), HubState::Active);

    let consumers: Vec<_> = streams
        .into_iter()
        .map(|s| tokio::spawn(s.map(Result::unwrap).collect::<Vec<_>>()))
        .collect();

    for i in 0..200 {
        tx.send(i).await.unwrap();
    }
    tx.close().await.unwrap();
    assert_eq!(tx.emitter().state(), HubState::Terminated);

    for consumer in consumers {
        assert_eq!(consumer.await.unwrap(), (0..200).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_hub_stream_composes_with_take() {
    let mut tx = multicast::<u32>(HubConfig::new(1).with_relay(RelayConfig::buffered()))
        .expect("hub");
    let rx = RelayStream::subscribe(tx.emitter()).unwrap();

    for i in 0..10 {
        tx.send(i).await.unwrap();
    }
    let first: Vec<_> = rx.take(3).map(Result::unwrap).collect().await;
    assert_eq!(first, vec![0, 1, 2]);

    // The stream was dropped mid-way; the hub prunes it and keeps going.
    tx.send(10).await.unwrap();
    assert_eq!(tx.emitter().subscriber_count(), 0);
    tx.close().await.unwrap();
}

#[tokio::test]
async fn test_replay_sink_catches_up_late_stream() {
    let mut tx = ReplaySink::new(ReplaySubject::with_limit(3).unwrap());
    for i in 0..5u32 {
        tx.send(i).await.unwrap();
    }
    tx.close().await.unwrap();

    let rx = RelayStream::from_handle(tx.emitter().register()).unwrap();
    assert_eq!(rx.buffered_count(), 4);
    let replayed: Vec<_> = rx.map(Result::unwrap).collect().await;
    assert_eq!(replayed, vec![2, 3, 4]);
}
