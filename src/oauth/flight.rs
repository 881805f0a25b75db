use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

/// Collapses concurrent runs of the same computation into one.
///
/// The first caller becomes the leader and runs the computation while holding
/// the slot. Callers that queued on the slot while a flight was in progress
/// take that flight's outcome instead of starting their own. A caller that
/// arrives after a flight has landed starts a new one.
#[derive(Debug)]
pub struct SingleFlight<T> {
    slot: Mutex<Landed<T>>,
    landed: AtomicU64,
}

#[derive(Debug)]
struct Landed<T> {
    generation: u64,
    outcome: Option<T>,
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Landed {
                generation: 0,
                outcome: None,
            }),
            landed: AtomicU64::new(0),
        }
    }

    /// Run `work`, or join the flight already in progress.
    ///
    /// If the leader is cancelled before landing, the next queued caller runs
    /// `work` itself.
    pub async fn run<F, Fut>(&self, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let seen = self.landed.load(Ordering::Acquire);
        let mut slot = self.slot.lock().await;
        if slot.generation != seen {
            if let Some(outcome) = &slot.outcome {
                return outcome.clone();
            }
        }

        let outcome = work().await;
        slot.generation += 1;
        slot.outcome = Some(outcome.clone());
        self.landed.store(slot.generation, Ordering::Release);
        outcome
    }

    /// Number of flights that have completed.
    pub fn flights(&self) -> u64 {
        self.landed.load(Ordering::Acquire)
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}
