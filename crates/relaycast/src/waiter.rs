//! FIFO queue of suspended tasks.
//!
//! Relays and hubs keep their shared state behind a lock and park callers
//! here when they cannot make progress. Releasing a waiter removes it from the
//! queue and hands back its [`Waker`]; the caller wakes it after dropping the
//! lock. A suspended future that is dropped must [`cancel`](WaiterQueue::cancel)
//! its ticket so the queue never holds stale entries.

use std::collections::VecDeque;
use std::task::Waker;

/// Position of one parked caller in a [`WaiterQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket(u64);

#[derive(Debug, Default)]
pub(crate) struct WaiterQueue {
    waiters: VecDeque<(Ticket, Waker)>,
    next_ticket: u64,
}

impl WaiterQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Parks `waker` under `ticket`.
    ///
    /// A ticket that is still queued keeps its position and only refreshes the
    /// waker. A missing or already released ticket is enqueued at the back.
    pub(crate) fn park(&mut self, ticket: &mut Option<Ticket>, waker: &Waker) {
        if let Some(current) = *ticket {
            if let Some((_, parked)) = self.waiters.iter_mut().find(|(t, _)| *t == current) {
                if !parked.will_wake(waker) {
                    parked.clone_from(waker);
                }
                return;
            }
        }

        let fresh = Ticket(self.next_ticket);
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.waiters.push_back((fresh, waker.clone()));
        *ticket = Some(fresh);
    }

    /// Removes `ticket`. Returns `false` if it had already been released.
    pub(crate) fn cancel(&mut self, ticket: Ticket) -> bool {
        match self.waiters.iter().position(|(t, _)| *t == ticket) {
            Some(pos) => {
                self.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, ticket: Ticket) -> bool {
        self.waiters.iter().any(|(t, _)| *t == ticket)
    }

    /// Releases the oldest waiter.
    pub(crate) fn release_one(&mut self) -> Option<Waker> {
        self.waiters.pop_front().map(|(_, waker)| waker)
    }

    /// Releases every waiter, oldest first.
    pub(crate) fn release_all(&mut self) -> Vec<Waker> {
        self.waiters.drain(..).map(|(_, waker)| waker).collect()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

/// Wakes released waiters once the lock guarding their queue is gone.
pub(crate) fn wake_all(wakers: impl IntoIterator<Item = Waker>) {
    for waker in wakers {
        waker.wake();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::Wake;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting() -> (Arc<CountingWaker>, Waker) {
        let inner = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(Arc::clone(&inner));
        (inner, waker)
    }

    #[test]
    fn test_fifo_release() {
        let mut queue = WaiterQueue::new();
        let (first, w1) = counting();
        let (second, w2) = counting();

        let mut t1 = None;
        let mut t2 = None;
        queue.park(&mut t1, &w1);
        queue.park(&mut t2, &w2);
        assert_eq!(queue.len(), 2);

        wake_all(queue.release_one());
        assert_eq!(first.0.load(Ordering::SeqCst), 1);
        assert_eq!(second.0.load(Ordering::SeqCst), 0);

        // Released tickets are gone; the second waiter is still parked.
        assert!(!queue.contains(t1.unwrap()));
        assert!(queue.contains(t2.unwrap()));
    }

    #[test]
    fn test_repark_keeps_position() {
        let mut queue = WaiterQueue::new();
        let (_, w1) = counting();
        let (_, w2) = counting();

        let mut t1 = None;
        let mut t2 = None;
        queue.park(&mut t1, &w1);
        queue.park(&mut t2, &w2);
        let before = t1;
        queue.park(&mut t1, &w1);

        assert_eq!(t1, before);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_cancel() {
        let mut queue = WaiterQueue::new();
        let (parked, w) = counting();

        let mut ticket = None;
        queue.park(&mut ticket, &w);
        assert!(queue.cancel(ticket.unwrap()));
        assert!(queue.is_empty());
        assert!(!queue.cancel(ticket.unwrap()));

        wake_all(queue.release_all());
        assert_eq!(parked.0.load(Ordering::SeqCst), 0);
    }
}
