//! Demonstration of relaycast and relaycast-stream features.
//!
//! Run with: `cargo run -p relaycast-stream --bin demo`
//! Set `RUST_LOG=relaycast=trace` to watch suspensions and quorum events.

use anyhow::Context as _;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use relaycast::{BoundedRelay, FairGate, HubConfig, HubState, MulticastHub, RelayConfig};
use relaycast_stream::{channel, multicast, RelayStream};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
#[error("sensor {0} went offline")]
struct SensorOffline(u32);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== relaycast Demo ===\n");

    demo_relay_backpressure().await?;
    demo_quorum_barrier().await?;
    demo_slow_subscriber().await?;
    demo_failure_broadcast().await?;
    demo_fair_producers().await?;

    println!("\n=== All demos completed successfully! ===");
    Ok(())
}

/// Demo 1: A single-slot relay suspends the producer until the consumer drains
async fn demo_relay_backpressure() -> anyhow::Result<()> {
    println!("--- Demo 1: Relay Backpressure ---");

    let relay = BoundedRelay::with_config(RelayConfig::new(1, true))?;
    let producer = {
        let relay = relay.clone();
        tokio::spawn(async move {
            for i in 0..5u64 {
                relay.next(i).await?;
                println!("  Sent: {i}");
            }
            relay.complete().await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    relay
        .drain(|v| println!("  Received: {v}"))
        .await
        .context("drain failed")?;
    producer.await??;

    let metrics = relay.metrics();
    println!(
        "  ✓ {} sent, {} drained, producer suspended {} times\n",
        metrics.values_sent, metrics.values_drained, metrics.producer_suspensions
    );
    Ok(())
}

/// Demo 2: Emission waits until the quorum of subscribers is present
async fn demo_quorum_barrier() -> anyhow::Result<()> {
    println!("--- Demo 2: Quorum Barrier ---");

    let mut tx = multicast::<&'static str>(HubConfig::new(2).with_relay(RelayConfig::buffered()))?;
    let first = RelayStream::subscribe(tx.emitter())?;
    println!("  State with one subscriber: {:?}", tx.emitter().state());

    let hub = tx.emitter().clone();
    let late = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        println!("  Second subscriber joining");
        RelayStream::subscribe(&hub)
    });

    tx.send("hello").await?;
    let second = late.await??;
    tx.close().await?;
    assert_eq!(tx.emitter().state(), HubState::Terminated);

    let a: Vec<_> = first.map(Result::unwrap).collect().await;
    let b: Vec<_> = second.map(Result::unwrap).collect().await;
    println!("  First saw {a:?}, second saw {b:?}");
    println!("  ✓ Nothing was emitted before the quorum\n");
    Ok(())
}

/// Demo 3: A slow subscriber back-pressures only its own relay
async fn demo_slow_subscriber() -> anyhow::Result<()> {
    println!("--- Demo 3: Slow Subscriber ---");

    let hub = MulticastHub::with_config(HubConfig::new(2).with_relay(RelayConfig::new(4, false)))?;
    let fast = hub.register();
    let slow = hub.register();

    let fast_task = tokio::spawn(async move {
        let mut n = 0;
        fast.drain(|_: u32| n += 1).await?;
        Ok::<_, relaycast::DrainError>(n)
    });
    let slow_task = tokio::spawn(async move {
        let mut rx = slow.receiver()?;
        let mut n = 0;
        while let Some(item) = rx.recv().await {
            item.map_err(relaycast::DrainError::Failed)?;
            let pause = rand::thread_rng().gen_range(0..3);
            tokio::time::sleep(Duration::from_millis(pause)).await;
            n += 1;
        }
        Ok::<_, relaycast::DrainError>(n)
    });

    for i in 0..50 {
        hub.emit(i).await?;
    }
    hub.complete().await?;

    println!("  Fast subscriber received {}", fast_task.await??);
    println!("  Slow subscriber received {}", slow_task.await??);
    println!("  ✓ Both subscribers saw every value\n");
    Ok(())
}

/// Demo 4: A failure reaches every subscriber, late joiners included
async fn demo_failure_broadcast() -> anyhow::Result<()> {
    println!("--- Demo 4: Failure Broadcast ---");

    let hub = MulticastHub::<u32>::with_config(HubConfig::new(1).with_relay(RelayConfig::buffered()))?;
    let early = hub.register();
    hub.emit(7).await?;
    hub.fail(Arc::new(SensorOffline(3))).await?;

    let late = hub.register();
    for (name, handle) in [("early", early), ("late", late)] {
        let mut values = Vec::new();
        let result = handle.drain(|v| values.push(v)).await;
        match result {
            Ok(()) => println!("  {name}: completed with {values:?}"),
            Err(err) => println!("  {name}: {values:?} then {err}"),
        }
    }
    println!("  ✓ Late subscriber saw the failure, not the values\n");
    Ok(())
}

/// Demo 5: Two jobs share one producer through a fair gate
async fn demo_fair_producers() -> anyhow::Result<()> {
    println!("--- Demo 5: Fair Producers ---");

    let (tx, rx) = channel::<String>(RelayConfig::buffered())?;
    let relay = tx.emitter().clone();
    let gate = Arc::new(FairGate::new());

    let consumer = tokio::spawn(rx.count());
    let jobs: Vec<_> = (0..4)
        .map(|i| {
            let relay = relay.clone();
            let gate = Arc::clone(&gate);
            let job = if i % 2 == 0 { "job-a" } else { "job-b" };
            tokio::spawn(async move {
                for round in 0..36 {
                    let relay = relay.clone();
                    gate.lead(job, move || async move {
                        relay.next(format!("{job} round {round}")).await
                    })
                    .await?;
                }
                Ok::<_, relaycast::RelayError>(())
            })
        })
        .collect();
    for job in jobs {
        job.await??;
    }
    relay.complete().await?;

    println!(
        "  job-a: {} rounds, job-b: {} rounds, consumer saw {}",
        gate.rounds("job-a"),
        gate.rounds("job-b"),
        consumer.await?
    );
    println!("  ✓ Rounds split evenly\n");
    Ok(())
}
