//! FIFO-fair leadership over a single producer.
//!
//! A hub accepts one logical producer. When several jobs want to drive it,
//! each wraps its work in [`FairGate::lead`]: rounds never overlap, and a
//! contender that is waiting always gets the next round before the current
//! leader can take another.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use tracing::trace;

/// Serializes rounds of work from named contenders in arrival order.
pub struct FairGate {
    turn: tokio::sync::Mutex<()>,
    rounds: Mutex<HashMap<String, u64>>,
}

impl FairGate {
    pub fn new() -> Self {
        Self {
            turn: tokio::sync::Mutex::new(()),
            rounds: Mutex::new(HashMap::new()),
        }
    }

    /// Waits for the turn, then runs one round on behalf of `contender`.
    ///
    /// The round is credited once it finishes; a round whose future is
    /// dropped midway is not counted.
    pub async fn lead<F, Fut, R>(&self, contender: &str, round: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let _turn = self.turn.lock().await;
        trace!(contender, "round started");
        let out = round().await;
        *self.rounds.lock().entry(contender.to_owned()).or_insert(0) += 1;
        out
    }

    /// Rounds completed by `contender`.
    pub fn rounds(&self, contender: &str) -> u64 {
        self.rounds.lock().get(contender).copied().unwrap_or(0)
    }

    pub fn total_rounds(&self) -> u64 {
        self.rounds.lock().values().sum()
    }

    /// Contenders that completed at least one round, sorted by name.
    pub fn contenders(&self) -> Vec<String> {
        let mut names: Vec<_> = self.rounds.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for FairGate {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FairGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FairGate")
            .field("rounds", &*self.rounds.lock())
            .finish_non_exhaustive()
    }
}
