//! Loom-based concurrency tests for the relay suspension protocol.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`
//!
//! Loom exhaustively explores thread interleavings. The relay itself is built
//! on `parking_lot` and task wakers, so these tests check a reduced model of
//! the same protocol: state and waiter slots behind one lock, wakeups issued
//! only after the lock is released. A lost wakeup shows up as a deadlock.

#![cfg(feature = "loom")]

use loom::sync::{Arc, Mutex};
use loom::thread::{self, Thread};

const TERMINAL: u64 = u64::MAX;

/// Reduced relay: a ring of two slots and at most one parked thread per side.
struct LoomRelay {
    state: Mutex<State>,
}

struct State {
    ring: [u64; 2],
    head: usize,
    count: usize,
    producer: Option<Thread>,
    consumer: Option<Thread>,
    unparks: usize,
}

impl LoomRelay {
    const CAPACITY: usize = 2;

    fn new() -> Self {
        Self {
            state: Mutex::new(State {
                ring: [0; 2],
                head: 0,
                count: 0,
                producer: None,
                consumer: None,
                unparks: 0,
            }),
        }
    }

    fn push(&self, value: u64) {
        loop {
            let mut state = self.state.lock().unwrap();
            if state.count < Self::CAPACITY {
                let idx = (state.head + state.count) % Self::CAPACITY;
                state.ring[idx] = value;
                state.count += 1;
                let consumer = state.consumer.take();
                drop(state);
                if let Some(t) = consumer {
                    t.unpark();
                }
                return;
            }
            assert!(state.consumer.is_none(), "both sides parked");
            state.producer = Some(thread::current());
            drop(state);
            thread::park();
        }
    }

    fn pop(&self) -> u64 {
        loop {
            let mut state = self.state.lock().unwrap();
            if state.count > 0 {
                let idx = state.head;
                let value = state.ring[idx];
                state.head = (idx + 1) % Self::CAPACITY;
                state.count -= 1;
                let producer = state.producer.take();
                if producer.is_some() {
                    state.unparks += 1;
                }
                drop(state);
                if let Some(t) = producer {
                    t.unpark();
                }
                return value;
            }
            assert!(state.producer.is_none(), "both sides parked");
            state.consumer = Some(thread::current());
            drop(state);
            thread::park();
        }
    }
}

#[test]
fn loom_values_then_terminal_in_order() {
    loom::model(|| {
        let relay = Arc::new(LoomRelay::new());

        let producer = {
            let relay = Arc::clone(&relay);
            thread::spawn(move || {
                for v in 1..=3 {
                    relay.push(v);
                }
                relay.push(TERMINAL);
            })
        };

        let mut seen = Vec::new();
        loop {
            let v = relay.pop();
            if v == TERMINAL {
                break;
            }
            seen.push(v);
        }
        producer.join().unwrap();

        assert_eq!(seen, vec![1, 2, 3]);
        let state = relay.state.lock().unwrap();
        assert_eq!(state.count, 0);
        assert!(state.producer.is_none());
    });
}

#[test]
fn loom_full_ring_releases_producer() {
    loom::model(|| {
        let relay = Arc::new(LoomRelay::new());
        relay.push(1);
        relay.push(2);

        let producer = {
            let relay = Arc::clone(&relay);
            thread::spawn(move || relay.push(3))
        };

        assert_eq!(relay.pop(), 1);
        producer.join().unwrap();
        assert_eq!(relay.pop(), 2);
        assert_eq!(relay.pop(), 3);
        assert!(relay.state.lock().unwrap().unparks <= 1);
    });
}
