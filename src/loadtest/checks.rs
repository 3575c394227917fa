//! Named response checks and the `errors` rate they feed.
//!
//! A check group is the set of checks evaluated against one response. Each
//! check is reported to the `checks` metric individually; the group as a whole
//! writes exactly one entry to the `errors` rate, failed if any check failed.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::loadtest::client::{BoardList, HttpResponse};
use crate::loadtest::metrics::Sample;

pub const CREATE_STATUS: &str = "create status is 200 or 201";
pub const CREATE_DURATION: &str = "create response time < 1000ms";
pub const LIST_STATUS: &str = "list status is 200";
pub const LIST_DURATION: &str = "list response time < 500ms";
pub const LIST_HAS_DATA: &str = "list has data";
pub const DETAIL_STATUS: &str = "detail status is 200";
pub const DETAIL_DURATION: &str = "detail response time < 300ms";

/// Latency bounds of the duration checks.
pub const CREATE_MAX_DURATION: Duration = Duration::from_millis(1000);
pub const LIST_MAX_DURATION: Duration = Duration::from_millis(500);
pub const DETAIL_MAX_DURATION: Duration = Duration::from_millis(300);

/// One evaluated assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Check {
    pub name: &'static str,
    pub passed: bool,
}

impl Check {
    pub fn new(name: &'static str, passed: bool) -> Self {
        Self { name, passed }
    }
}

pub fn create_checks(response: &HttpResponse) -> [Check; 2] {
    [
        Check::new(CREATE_STATUS, matches!(response.status, 200 | 201)),
        Check::new(CREATE_DURATION, response.duration < CREATE_MAX_DURATION),
    ]
}

/// `list` is the parsed body, `None` when it was not a board list.
pub fn list_checks(response: &HttpResponse, list: Option<&BoardList>) -> [Check; 3] {
    [
        Check::new(LIST_STATUS, response.status == 200),
        Check::new(LIST_DURATION, response.duration < LIST_MAX_DURATION),
        Check::new(LIST_HAS_DATA, list.is_some()),
    ]
}

pub fn detail_checks(response: &HttpResponse) -> [Check; 2] {
    [
        Check::new(DETAIL_STATUS, response.status == 200),
        Check::new(DETAIL_DURATION, response.duration < DETAIL_MAX_DURATION),
    ]
}

/// Report a check group and return whether every check passed.
///
/// A closed channel only means the aggregator is gone; the result is still
/// returned so the iteration can finish.
pub async fn check_group(samples: &mpsc::Sender<Sample>, checks: &[Check]) -> bool {
    let mut all_passed = true;
    for check in checks {
        all_passed &= check.passed;
        let _ = samples
            .send(Sample::Check {
                name: check.name,
                passed: check.passed,
            })
            .await;
    }
    let _ = samples
        .send(Sample::ErrorRate {
            failed: !all_passed,
        })
        .await;
    all_passed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::metrics::{Endpoint, MetricsRecorder};

    fn response(endpoint: Endpoint, status: u16, ms: u64, body: &str) -> HttpResponse {
        HttpResponse {
            endpoint,
            status,
            body: body.to_string(),
            duration: Duration::from_millis(ms),
            error: None,
        }
    }

    #[test]
    fn test_create_checks_accept_200_and_201() {
        for status in [200, 201] {
            let checks = create_checks(&response(Endpoint::Create, status, 10, "{}"));
            assert!(checks.iter().all(|c| c.passed));
        }
        let checks = create_checks(&response(Endpoint::Create, 204, 10, ""));
        assert!(!checks[0].passed);
    }

    #[test]
    fn test_duration_bounds_are_exclusive() {
        let slow = response(Endpoint::Detail, 200, 300, "{}");
        let checks = detail_checks(&slow);
        assert!(checks[0].passed);
        assert!(!checks[1].passed);
    }

    #[test]
    fn test_list_checks_need_parsed_body() {
        let ok = response(Endpoint::List, 200, 10, "[]");
        let parsed = BoardList::parse(&ok.body);
        assert!(list_checks(&ok, parsed.as_ref()).iter().all(|c| c.passed));

        let malformed = response(Endpoint::List, 200, 10, "<html>");
        let parsed = BoardList::parse(&malformed.body);
        let checks = list_checks(&malformed, parsed.as_ref());
        assert_eq!(checks[2], Check::new(LIST_HAS_DATA, false));
    }

    #[tokio::test]
    async fn test_check_group_writes_one_error_entry() {
        let (tx, mut rx) = mpsc::channel(16);
        let passed = check_group(
            &tx,
            &[Check::new(LIST_STATUS, false), Check::new(LIST_DURATION, false)],
        )
        .await;
        assert!(!passed);
        drop(tx);

        let mut recorder = MetricsRecorder::new();
        while let Some(sample) = rx.recv().await {
            recorder.record(&sample);
        }
        assert_eq!(recorder.check_total(), 2);
        assert_eq!(recorder.error_metric_total(), 1);
        assert_eq!(recorder.errors_rate(), 1.0);
    }

    #[tokio::test]
    async fn test_check_group_survives_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert!(check_group(&tx, &[Check::new(DETAIL_STATUS, true)]).await);
    }
}
