//! Virtual user (VU) task loop for load test execution.
//!
//! Each VU owns its own RNG and a clone of the shared [`RequestDriver`], runs
//! driver iterations back to back with a random think time in between, and
//! stops when its cancellation token fires or the iteration budget runs out.
//! Metrics leave the VU as [`Sample`] values over a bounded mpsc channel.

use crate::loadtest::config::{DriverKind, ThinkTime};
use crate::loadtest::driver::{think_time, RequestDriver};
use crate::loadtest::metrics::Sample;

use rand::prelude::*;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Atomic counter tracking the number of currently active virtual users.
///
/// Lightweight wrapper around `Arc<AtomicU32>` for clone-friendly sharing
/// across VU tasks and the engine orchestrator.
#[derive(Clone)]
pub struct ActiveVuCounter(Arc<AtomicU32>);

impl ActiveVuCounter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(Arc::new(AtomicU32::new(0)))
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    /// Returns the current number of active VUs.
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for ActiveVuCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Global cap on driver iterations, shared by every VU of a run.
///
/// Exhausting the budget cancels `stop`, which ends the whole run
/// (first-limit-wins with the scenario durations). Minor overshoot across
/// VUs is acceptable.
#[derive(Clone)]
pub struct IterationBudget {
    used: Arc<AtomicU64>,
    max: u64,
    stop: CancellationToken,
}

impl IterationBudget {
    pub fn new(max: u64, stop: CancellationToken) -> Self {
        Self {
            used: Arc::new(AtomicU64::new(0)),
            max,
            stop,
        }
    }

    /// Claim one iteration. Returns `false` and stops the run once the cap is hit.
    pub fn try_acquire(&self) -> bool {
        let prev = self.used.fetch_add(1, Ordering::Relaxed);
        if prev >= self.max {
            self.stop.cancel();
            return false;
        }
        true
    }
}

/// Main virtual user task loop.
///
/// Each pass:
/// 1. Pre-flight cancellation and iteration budget checks.
/// 2. One driver iteration; in-flight requests always run to completion.
/// 3. An [`Sample::Iteration`] marker.
/// 4. A think-time pause that ends early on cancellation.
///
/// The `active_vus` counter is incremented on entry and decremented on exit.
#[allow(clippy::too_many_arguments)]
pub async fn vu_loop(
    vu_id: u32,
    kind: DriverKind,
    driver: RequestDriver,
    think_time_override: Option<ThinkTime>,
    sample_tx: mpsc::Sender<Sample>,
    cancel: CancellationToken,
    budget: Option<IterationBudget>,
    active_vus: ActiveVuCounter,
) {
    active_vus.increment();
    tracing::debug!(vu_id, driver = %kind, "virtual user started");

    let mut rng = StdRng::from_rng(&mut rand::rng());
    let mut iterations: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        if let Some(ref budget) = budget {
            if !budget.try_acquire() {
                break;
            }
        }

        driver.run_iteration(kind, &mut rng, &sample_tx).await;
        iterations += 1;

        if sample_tx.send(Sample::Iteration).await.is_err() {
            // Receiver dropped -- metrics aggregator is gone
            break;
        }

        let pause = think_time(kind, think_time_override, &mut rng);
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = cancel.cancelled() => break,
        }
    }

    tracing::debug!(vu_id, iterations, "virtual user stopped");
    active_vus.decrement();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::client::BoardClient;
    use std::time::Duration;

    #[test]
    fn test_active_vu_counter_increment_decrement() {
        let counter = ActiveVuCounter::new();
        assert_eq!(counter.get(), 0);

        counter.increment();
        counter.increment();
        counter.increment();
        assert_eq!(counter.get(), 3);

        counter.decrement();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_iteration_budget_stops_run_when_exhausted() {
        let stop = CancellationToken::new();
        let budget = IterationBudget::new(2, stop.clone());
        assert!(budget.try_acquire());
        assert!(budget.clone().try_acquire());
        assert!(!stop.is_cancelled());
        assert!(!budget.try_acquire());
        assert!(stop.is_cancelled());
    }

    #[tokio::test]
    async fn test_vu_loop_exits_immediately_when_cancelled() {
        let driver = RequestDriver::new(
            BoardClient::new(
                reqwest::Client::new(),
                "http://127.0.0.1:1",
                Duration::from_millis(100),
            ),
            0.2,
        );
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let active = ActiveVuCounter::new();

        vu_loop(0, DriverKind::Full, driver, None, tx, cancel, None, active.clone()).await;

        assert_eq!(active.get(), 0);
        assert!(rx.recv().await.is_none(), "no samples expected");
    }

    #[tokio::test]
    async fn test_vu_loop_zero_budget_sends_nothing() {
        let driver = RequestDriver::new(
            BoardClient::new(
                reqwest::Client::new(),
                "http://127.0.0.1:1",
                Duration::from_millis(100),
            ),
            0.2,
        );
        let (tx, mut rx) = mpsc::channel(16);
        let stop = CancellationToken::new();
        let budget = IterationBudget::new(0, stop.clone());

        vu_loop(
            3,
            DriverKind::Mixed,
            driver,
            None,
            tx,
            CancellationToken::new(),
            Some(budget),
            ActiveVuCounter::new(),
        )
        .await;

        assert!(stop.is_cancelled());
        assert!(rx.recv().await.is_none());
    }
}
