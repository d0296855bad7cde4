//! Property-based tests for the relay and hub invariants.
//!
//! Coverage:
//! - Bounded count and FIFO order against a `VecDeque` model
//! - No loss or duplication for arbitrary capacity and stream length
//! - Identical fan-out to every subscriber

use futures_util::task::noop_waker_ref;
use proptest::prelude::*;
use relaycast::{BoundedRelay, DrainError, HubConfig, MulticastHub, RelayConfig};
use std::collections::VecDeque;
use std::task::{Context, Poll};

#[derive(Debug, Clone)]
enum Op {
    Push(u32),
    Pop,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![any::<u32>().prop_map(Op::Push), Just(Op::Pop)]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

// =============================================================================
// Bounded Count / FIFO
// "0 ≤ count ≤ capacity" and values leave in the order they entered
// =============================================================================

proptest! {
    #[test]
    fn prop_relay_matches_queue_model(
        capacity in 1usize..8,
        ops in prop::collection::vec(op(), 0..200),
    ) {
        let relay = BoundedRelay::new(capacity).unwrap();
        let mut rx = relay.receiver().unwrap();
        let mut cx = Context::from_waker(noop_waker_ref());
        let mut model = VecDeque::new();

        for op in ops {
            match op {
                Op::Push(v) => {
                    let accepted = relay.try_next(v).is_ok();
                    prop_assert_eq!(accepted, model.len() < capacity);
                    if accepted {
                        model.push_back(v);
                    }
                }
                Op::Pop => match rx.poll_recv(&mut cx) {
                    Poll::Ready(Some(Ok(v))) => prop_assert_eq!(Some(v), model.pop_front()),
                    Poll::Ready(other) => prop_assert!(false, "unexpected item {:?}", other),
                    Poll::Pending => prop_assert!(model.is_empty()),
                },
            }
            prop_assert!(relay.len() <= capacity);
            prop_assert_eq!(relay.len(), model.len());
        }
    }
}

// =============================================================================
// No Loss Under Backpressure
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_every_value_delivered_once(capacity in 1usize..16, n in 0u32..500) {
        let seen = runtime().block_on(async {
            let relay = BoundedRelay::new(capacity).unwrap();
            let producer = {
                let relay = relay.clone();
                tokio::spawn(async move {
                    for i in 0..n {
                        relay.next(i).await?;
                    }
                    relay.complete().await
                })
            };
            let mut seen = Vec::new();
            relay.drain(|v| seen.push(v)).await?;
            producer.await.unwrap().unwrap();
            Ok::<_, DrainError>(seen)
        }).unwrap();

        prop_assert_eq!(seen, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn prop_fan_out_identical(
        subscribers in 1usize..5,
        capacity in 1usize..4,
        values in prop::collection::vec(any::<u16>(), 0..100),
    ) {
        let expected = values.clone();
        let results = runtime().block_on(async move {
            let hub = MulticastHub::with_config(
                HubConfig::new(subscribers).with_relay(RelayConfig::new(capacity, false)),
            ).unwrap();
            let consumers: Vec<_> = (0..subscribers)
                .map(|_| {
                    let handle = hub.register();
                    tokio::spawn(async move {
                        let mut seen = Vec::new();
                        handle.drain(|v| seen.push(v)).await?;
                        Ok::<_, DrainError>(seen)
                    })
                })
                .collect();
            for v in values {
                hub.emit(v).await.unwrap();
            }
            hub.complete().await.unwrap();

            let mut results = Vec::new();
            for consumer in consumers {
                results.push(consumer.await.unwrap().unwrap());
            }
            results
        });

        prop_assert_eq!(results.len(), subscribers);
        for seen in results {
            prop_assert_eq!(&seen, &expected);
        }
    }
}
