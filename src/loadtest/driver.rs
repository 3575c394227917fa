//! The iteration body each virtual user runs against the board API.
//!
//! Two entry behaviors are available, selected per scenario:
//!
//! - [`DriverKind::Full`]: create a board, list boards, then fetch the board
//!   that was just created.
//! - [`DriverKind::Mixed`]: one random draw decides between a lone create
//!   (write path) and a list followed by a fetch of the first listed board
//!   (read path).
//!
//! Nothing here ever fails an iteration. Status mismatches, slow responses and
//! unexpected bodies only fail checks, which feed the `checks` and `errors`
//! metrics and are logged at `warn`.

use std::time::Duration;

use rand::prelude::*;
use tokio::sync::mpsc;

use crate::loadtest::checks::{check_group, create_checks, detail_checks, list_checks, Check};
use crate::loadtest::client::{
    truncate_body, BoardClient, BoardId, BoardList, HttpResponse, MAX_LOGGED_BODY,
};
use crate::loadtest::config::{DriverKind, ThinkTime};
use crate::loadtest::fixtures::Fixture;
use crate::loadtest::metrics::Sample;

/// Page requested by every list call.
pub const LIST_PAGE: u32 = 0;
/// Page size requested by every list call.
pub const LIST_SIZE: u32 = 20;

/// Default pause after a full iteration.
pub const FULL_THINK_TIME: ThinkTime = ThinkTime {
    min_ms: 0,
    max_ms: 2000,
};

/// Default pause after a mixed iteration.
pub const MIXED_THINK_TIME: ThinkTime = ThinkTime {
    min_ms: 500,
    max_ms: 1500,
};

/// What one iteration did, for callers and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationOutcome {
    /// HTTP requests issued.
    pub requests: u32,
    /// Check groups with at least one failed check.
    pub failed_groups: u32,
}

impl IterationOutcome {
    fn add(&mut self, group_passed: bool) {
        self.requests += 1;
        if !group_passed {
            self.failed_groups += 1;
        }
    }
}

/// Runs driver iterations against one [`BoardClient`].
#[derive(Debug, Clone)]
pub struct RequestDriver {
    client: BoardClient,
    write_ratio: f64,
}

impl RequestDriver {
    pub fn new(client: BoardClient, write_ratio: f64) -> Self {
        Self {
            client,
            write_ratio,
        }
    }

    /// Run one iteration of the given driver.
    pub async fn run_iteration<R: Rng + ?Sized>(
        &self,
        kind: DriverKind,
        rng: &mut R,
        samples: &mpsc::Sender<Sample>,
    ) -> IterationOutcome {
        match kind {
            DriverKind::Full => self.full_iteration(rng, samples).await,
            DriverKind::Mixed => {
                let draw: f64 = rng.random();
                self.mixed_iteration(draw, rng, samples).await
            },
        }
    }

    /// Create, list, then fetch the created board.
    ///
    /// The detail fetch only happens when the create group passed, the status
    /// was at most 201 and the body carried a truthy `id`. An unparseable
    /// create body just skips the fetch.
    pub async fn full_iteration<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        samples: &mpsc::Sender<Sample>,
    ) -> IterationOutcome {
        let mut outcome = IterationOutcome::default();

        let (created, create_passed) = self.create(rng, samples).await;
        outcome.add(create_passed);

        let (_, _, list_passed) = self.list(samples).await;
        outcome.add(list_passed);

        if create_passed && created.status <= 201 {
            if let Some(id) = created.json().as_ref().and_then(BoardId::from_board) {
                outcome.add(self.detail(&id, samples).await);
            }
        }

        outcome
    }

    /// Write path when `draw < write_ratio`, read path otherwise.
    ///
    /// `draw` is a uniform fraction in `[0, 1)`; it is a parameter so the
    /// branch can be pinned in tests.
    pub async fn mixed_iteration<R: Rng + ?Sized>(
        &self,
        draw: f64,
        rng: &mut R,
        samples: &mpsc::Sender<Sample>,
    ) -> IterationOutcome {
        let mut outcome = IterationOutcome::default();

        if draw < self.write_ratio {
            let (_, passed) = self.create(rng, samples).await;
            outcome.add(passed);
            return outcome;
        }

        let (listed, list, list_passed) = self.list(samples).await;
        outcome.add(list_passed);

        if listed.status == 200 {
            if let Some(id) = list.as_ref().and_then(BoardList::first_id) {
                outcome.add(self.detail(&id, samples).await);
            }
        }

        outcome
    }

    async fn create<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        samples: &mpsc::Sender<Sample>,
    ) -> (HttpResponse, bool) {
        let fixture = Fixture::random(rng);
        let response = self.client.create_board(&fixture).await;
        let passed = self
            .report(samples, &response, &create_checks(&response))
            .await;
        (response, passed)
    }

    async fn list(&self, samples: &mpsc::Sender<Sample>) -> (HttpResponse, Option<BoardList>, bool) {
        let response = self.client.list_boards(LIST_PAGE, LIST_SIZE).await;
        let list = BoardList::parse(&response.body);
        let passed = self
            .report(samples, &response, &list_checks(&response, list.as_ref()))
            .await;
        (response, list, passed)
    }

    async fn detail(&self, id: &BoardId, samples: &mpsc::Sender<Sample>) -> bool {
        let response = self.client.get_board(id).await;
        self.report(samples, &response, &detail_checks(&response))
            .await
    }

    async fn report(
        &self,
        samples: &mpsc::Sender<Sample>,
        response: &HttpResponse,
        checks: &[Check],
    ) -> bool {
        let _ = samples.send(Sample::Request(response.to_sample())).await;
        let passed = check_group(samples, checks).await;
        if !passed {
            let failed: Vec<&str> = checks
                .iter()
                .filter(|c| !c.passed)
                .map(|c| c.name)
                .collect();
            tracing::warn!(
                endpoint = %response.endpoint,
                status = response.status,
                elapsed_ms = response.duration.as_millis() as u64,
                error = ?response.error,
                body = %truncate_body(&response.body, MAX_LOGGED_BODY),
                "{} failed: {}",
                response.endpoint.name(),
                failed.join(", ")
            );
        }
        passed
    }
}

/// Pause before the next iteration: `override_bounds` if set, else the
/// driver's default range.
pub fn think_time<R: Rng + ?Sized>(
    kind: DriverKind,
    override_bounds: Option<ThinkTime>,
    rng: &mut R,
) -> Duration {
    let bounds = override_bounds.unwrap_or(match kind {
        DriverKind::Full => FULL_THINK_TIME,
        DriverKind::Mixed => MIXED_THINK_TIME,
    });
    Duration::from_millis(rng.random_range(bounds.min_ms..=bounds.max_ms))
}
