//! HdrHistogram-based metrics pipeline.
//!
//! Virtual users emit [`Sample`] values over an mpsc channel; a single
//! aggregator task owns the [`MetricsRecorder`] and folds every sample into it.
//!
//! # Design
//!
//! - **Single-owner**: No `Arc<Mutex>`. One task owns the recorder and the
//!   rest of the engine only ever sees [`MetricsSnapshot`] copies.
//! - **k6 metric model**: `http_req_duration` covers every request (passed or
//!   failed), `http_req_failed` is the fraction of failed requests, `checks`
//!   and `errors` are rate metrics fed by the check groups.
//! - **Millisecond resolution**: Matches how users think about latency.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

use crate::loadtest::error::RequestError;

/// Board API endpoint being measured.
///
/// The [`fmt::Display`] impl produces `METHOD path` (e.g., `"GET /api/boards"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// `POST /api/boards`
    Create,
    /// `GET /api/boards?page=..&size=..`
    List,
    /// `GET /api/boards/{id}`
    Detail,
    /// `GET /actuator/health`
    Health,
}

impl Endpoint {
    /// Short name used in log lines and check names.
    pub fn name(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::List => "list",
            Self::Detail => "detail",
            Self::Health => "health",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "POST /api/boards",
            Self::List => "GET /api/boards",
            Self::Detail => "GET /api/boards/{id}",
            Self::Health => "GET /actuator/health",
        };
        f.write_str(s)
    }
}

/// A single request measurement.
#[derive(Debug, Clone)]
pub struct RequestSample {
    pub endpoint: Endpoint,
    /// HTTP status, or 0 when the request never produced a response.
    pub status: u16,
    /// Wall-clock duration of the request.
    pub duration: Duration,
    /// `Ok(())` for success, `Err(RequestError)` for failure.
    pub result: Result<(), RequestError>,
}

impl RequestSample {
    /// Create a sample. `error` is `None` for success.
    pub fn new(
        endpoint: Endpoint,
        status: u16,
        duration: Duration,
        error: Option<RequestError>,
    ) -> Self {
        Self {
            endpoint,
            status,
            duration,
            result: error.map_or(Ok(()), Err),
        }
    }

    /// Whether this request counts toward `http_req_failed`.
    pub fn is_failed(&self) -> bool {
        self.result.is_err()
    }
}

/// Everything a virtual user reports to the aggregator.
#[derive(Debug, Clone)]
pub enum Sample {
    /// One HTTP request.
    Request(RequestSample),
    /// One named check and whether it held.
    Check { name: &'static str, passed: bool },
    /// One entry in the `errors` rate, written once per check group.
    ErrorRate { failed: bool },
    /// One completed driver iteration.
    Iteration,
}

/// Pass/fail tallies for one named check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckSnapshot {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

/// Latency and failure summary for one endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSnapshot {
    pub endpoint: Endpoint,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub error_rate: f64,
}

/// Point-in-time snapshot of all metrics state.
///
/// Captured via [`MetricsRecorder::snapshot`]. Latency values are in
/// milliseconds and cover every request.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub p50: u64,
    pub p90: u64,
    pub p95: u64,
    pub p99: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    /// Total requests recorded.
    pub total_requests: u64,
    /// Requests that failed (transport error or status outside `200..400`).
    pub failed_requests: u64,
    /// `http_req_failed` rate (0.0..=1.0).
    pub error_rate: f64,
    /// Failed entries in the `errors` rate.
    pub errors_failed: u64,
    /// All entries in the `errors` rate.
    pub errors_total: u64,
    /// `errors` rate (0.0..=1.0).
    pub errors_rate: f64,
    /// Per-check tallies in first-seen order.
    pub checks: Vec<CheckSnapshot>,
    /// Completed driver iterations.
    pub iterations: u64,
    /// Per-endpoint breakdown, in endpoint order.
    pub per_endpoint: Vec<EndpointSnapshot>,
    /// Error counts by classification (http, timeout, connection).
    pub error_category_counts: HashMap<String, u64>,
    /// Response counts by HTTP status; 0 means no response.
    pub status_counts: BTreeMap<u16, u64>,
}

impl MetricsSnapshot {
    /// Fraction of individual checks that passed. 0.0 when none ran.
    pub fn checks_rate(&self) -> f64 {
        let passes: u64 = self.checks.iter().map(|c| c.passes).sum();
        let total: u64 = self.checks.iter().map(|c| c.passes + c.fails).sum();
        if total == 0 {
            0.0
        } else {
            passes as f64 / total as f64
        }
    }
}

fn latency_histogram() -> Histogram<u64> {
    let mut histogram = Histogram::<u64>::new(3).expect("3 sigfigs is always valid");
    histogram.auto(true);
    histogram
}

fn quantile(histogram: &Histogram<u64>, q: f64) -> u64 {
    if histogram.is_empty() {
        return 0;
    }
    histogram.value_at_quantile(q)
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

struct EndpointMetrics {
    histogram: Histogram<u64>,
    total: u64,
    failed: u64,
}

impl EndpointMetrics {
    fn new() -> Self {
        Self {
            histogram: latency_histogram(),
            total: 0,
            failed: 0,
        }
    }

    fn snapshot(&self, endpoint: Endpoint) -> EndpointSnapshot {
        let empty = self.histogram.is_empty();
        EndpointSnapshot {
            endpoint,
            p50: quantile(&self.histogram, 0.50),
            p95: quantile(&self.histogram, 0.95),
            p99: quantile(&self.histogram, 0.99),
            min: if empty { 0 } else { self.histogram.min() },
            max: if empty { 0 } else { self.histogram.max() },
            mean: if empty { 0.0 } else { self.histogram.mean() },
            total_requests: self.total,
            failed_requests: self.failed,
            error_rate: ratio(self.failed, self.total),
        }
    }
}

struct CheckTally {
    name: &'static str,
    passes: u64,
    fails: u64,
}

/// HdrHistogram-backed metrics recorder.
///
/// Designed for single-owner usage with no internal locking.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use board_loadtest::loadtest::metrics::{Endpoint, MetricsRecorder, RequestSample, Sample};
///
/// let mut recorder = MetricsRecorder::new();
/// let sample = RequestSample::new(Endpoint::List, 200, Duration::from_millis(42), None);
/// recorder.record(&Sample::Request(sample));
///
/// assert_eq!(recorder.total_requests(), 1);
/// assert_eq!(recorder.duration_quantile(0.5), 42);
/// ```
pub struct MetricsRecorder {
    /// Latencies of every request.
    durations: Histogram<u64>,
    total_failed: u64,
    per_endpoint: BTreeMap<Endpoint, EndpointMetrics>,
    error_category_counts: HashMap<String, u64>,
    status_counts: BTreeMap<u16, u64>,
    checks: Vec<CheckTally>,
    errors_failed: u64,
    errors_total: u64,
    iterations: u64,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    /// Create an empty recorder. Histograms use 3 significant figures and
    /// auto-resize.
    pub fn new() -> Self {
        Self {
            durations: latency_histogram(),
            total_failed: 0,
            per_endpoint: BTreeMap::new(),
            error_category_counts: HashMap::new(),
            status_counts: BTreeMap::new(),
            checks: Vec::new(),
            errors_failed: 0,
            errors_total: 0,
            iterations: 0,
        }
    }

    /// Fold one sample into the recorder.
    pub fn record(&mut self, sample: &Sample) {
        match sample {
            Sample::Request(request) => self.record_request(request),
            Sample::Check { name, passed } => self.record_check(name, *passed),
            Sample::ErrorRate { failed } => {
                self.errors_total += 1;
                if *failed {
                    self.errors_failed += 1;
                }
            },
            Sample::Iteration => self.iterations += 1,
        }
    }

    fn record_request(&mut self, sample: &RequestSample) {
        let ms = sample.duration.as_millis() as u64;
        let _ = self.durations.record(ms);
        *self.status_counts.entry(sample.status).or_insert(0) += 1;

        let endpoint = self
            .per_endpoint
            .entry(sample.endpoint)
            .or_insert_with(EndpointMetrics::new);
        let _ = endpoint.histogram.record(ms);
        endpoint.total += 1;

        if let Err(ref err) = sample.result {
            endpoint.failed += 1;
            self.total_failed += 1;
            *self
                .error_category_counts
                .entry(err.error_category().to_owned())
                .or_insert(0) += 1;
        }
    }

    fn record_check(&mut self, name: &'static str, passed: bool) {
        let idx = match self.checks.iter().position(|c| c.name == name) {
            Some(idx) => idx,
            None => {
                self.checks.push(CheckTally {
                    name,
                    passes: 0,
                    fails: 0,
                });
                self.checks.len() - 1
            },
        };
        let tally = &mut self.checks[idx];
        if passed {
            tally.passes += 1;
        } else {
            tally.fails += 1;
        }
    }

    /// Request latency at quantile `q` (0.0..=1.0) in milliseconds.
    /// Returns 0 if no requests were recorded.
    pub fn duration_quantile(&self, q: f64) -> u64 {
        quantile(&self.durations, q)
    }

    /// Mean request latency in milliseconds. Returns 0.0 if empty.
    pub fn duration_mean(&self) -> f64 {
        if self.durations.is_empty() {
            return 0.0;
        }
        self.durations.mean()
    }

    /// Fastest request in milliseconds. Returns 0 if empty.
    pub fn duration_min(&self) -> u64 {
        if self.durations.is_empty() {
            return 0;
        }
        self.durations.min()
    }

    /// Slowest request in milliseconds. Returns 0 if empty.
    pub fn duration_max(&self) -> u64 {
        if self.durations.is_empty() {
            return 0;
        }
        self.durations.max()
    }

    pub fn total_requests(&self) -> u64 {
        self.durations.len()
    }

    pub fn failed_requests(&self) -> u64 {
        self.total_failed
    }

    /// `http_req_failed` rate (0.0..=1.0). Returns 0.0 if no requests recorded.
    pub fn error_rate(&self) -> f64 {
        ratio(self.total_failed, self.total_requests())
    }

    /// Number of entries written to the `errors` rate.
    pub fn error_metric_total(&self) -> u64 {
        self.errors_total
    }

    /// `errors` rate (0.0..=1.0).
    pub fn errors_rate(&self) -> f64 {
        ratio(self.errors_failed, self.errors_total)
    }

    /// Number of individual checks evaluated.
    pub fn check_total(&self) -> u64 {
        self.checks.iter().map(|c| c.passes + c.fails).sum()
    }

    /// Fraction of individual checks that passed.
    pub fn checks_rate(&self) -> f64 {
        let passes = self.checks.iter().map(|c| c.passes).sum();
        ratio(passes, self.check_total())
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Requests recorded for one endpoint.
    pub fn endpoint_count(&self, endpoint: Endpoint) -> u64 {
        self.per_endpoint.get(&endpoint).map_or(0, |m| m.total)
    }

    /// Capture a point-in-time snapshot of all metrics.
    ///
    /// The snapshot is a self-contained value that can be sent across threads
    /// or serialized without holding a reference to the recorder.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            p50: self.duration_quantile(0.50),
            p90: self.duration_quantile(0.90),
            p95: self.duration_quantile(0.95),
            p99: self.duration_quantile(0.99),
            min: self.duration_min(),
            max: self.duration_max(),
            mean: self.duration_mean(),
            total_requests: self.total_requests(),
            failed_requests: self.total_failed,
            error_rate: self.error_rate(),
            errors_failed: self.errors_failed,
            errors_total: self.errors_total,
            errors_rate: self.errors_rate(),
            checks: self
                .checks
                .iter()
                .map(|c| CheckSnapshot {
                    name: c.name.to_string(),
                    passes: c.passes,
                    fails: c.fails,
                })
                .collect(),
            iterations: self.iterations,
            per_endpoint: self
                .per_endpoint
                .iter()
                .map(|(endpoint, metrics)| metrics.snapshot(*endpoint))
                .collect(),
            error_category_counts: self.error_category_counts.clone(),
            status_counts: self.status_counts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(endpoint: Endpoint, status: u16, ms: u64) -> Sample {
        let error = if (200..400).contains(&status) {
            None
        } else {
            Some(RequestError::Http {
                status,
                body: String::new(),
            })
        };
        Sample::Request(RequestSample::new(
            endpoint,
            status,
            Duration::from_millis(ms),
            error,
        ))
    }

    #[test]
    fn test_new_recorder_has_zero_counts() {
        let recorder = MetricsRecorder::new();
        assert_eq!(recorder.total_requests(), 0);
        assert_eq!(recorder.failed_requests(), 0);
        assert_eq!(recorder.iterations(), 0);
        assert_eq!(recorder.error_rate(), 0.0);
        assert_eq!(recorder.errors_rate(), 0.0);
    }

    #[test]
    fn test_percentiles_known_distribution() {
        let mut recorder = MetricsRecorder::new();
        for i in 1..=100 {
            recorder.record(&request(Endpoint::List, 200, i));
        }
        let p50 = recorder.duration_quantile(0.50) as i64;
        let p95 = recorder.duration_quantile(0.95) as i64;
        let p99 = recorder.duration_quantile(0.99) as i64;
        assert!((p50 - 50).abs() <= 1, "p50 was {p50}, expected ~50");
        assert!((p95 - 95).abs() <= 1, "p95 was {p95}, expected ~95");
        assert!((p99 - 99).abs() <= 1, "p99 was {p99}, expected ~99");
        assert_eq!(recorder.duration_min(), 1);
        assert_eq!(recorder.duration_max(), 100);
    }

    #[test]
    fn test_failed_requests_count_toward_duration() {
        let mut recorder = MetricsRecorder::new();
        for _ in 0..7 {
            recorder.record(&request(Endpoint::Create, 201, 10));
        }
        for _ in 0..3 {
            recorder.record(&request(Endpoint::Create, 500, 400));
        }
        assert_eq!(recorder.total_requests(), 10);
        assert_eq!(recorder.failed_requests(), 3);
        assert!((recorder.error_rate() - 0.3).abs() < 0.001);
        assert_eq!(recorder.duration_max(), 400);
    }

    #[test]
    fn test_transport_failure_recorded_with_status_zero() {
        let mut recorder = MetricsRecorder::new();
        recorder.record(&Sample::Request(RequestSample::new(
            Endpoint::Detail,
            0,
            Duration::from_millis(5),
            Some(RequestError::Timeout),
        )));
        let snap = recorder.snapshot();
        assert_eq!(snap.status_counts.get(&0), Some(&1));
        assert_eq!(snap.error_category_counts.get("timeout"), Some(&1));
        assert_eq!(snap.failed_requests, 1);
    }

    #[test]
    fn test_check_tallies_keep_first_seen_order() {
        let mut recorder = MetricsRecorder::new();
        recorder.record(&Sample::Check {
            name: "list status is 200",
            passed: true,
        });
        recorder.record(&Sample::Check {
            name: "create status is 200 or 201",
            passed: false,
        });
        recorder.record(&Sample::Check {
            name: "list status is 200",
            passed: false,
        });

        let snap = recorder.snapshot();
        assert_eq!(snap.checks.len(), 2);
        assert_eq!(snap.checks[0].name, "list status is 200");
        assert_eq!(snap.checks[0].passes, 1);
        assert_eq!(snap.checks[0].fails, 1);
        assert_eq!(snap.checks[1].fails, 1);
        assert_eq!(recorder.check_total(), 3);
        assert!((recorder.checks_rate() - 1.0 / 3.0).abs() < 1e-9);
        assert!((snap.checks_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_errors_rate_counts_every_group() {
        let mut recorder = MetricsRecorder::new();
        recorder.record(&Sample::ErrorRate { failed: true });
        recorder.record(&Sample::ErrorRate { failed: false });
        recorder.record(&Sample::ErrorRate { failed: false });
        recorder.record(&Sample::ErrorRate { failed: false });
        assert_eq!(recorder.error_metric_total(), 4);
        assert_eq!(recorder.errors_rate(), 0.25);
    }

    #[test]
    fn test_per_endpoint_breakdown() {
        let mut recorder = MetricsRecorder::new();
        recorder.record(&request(Endpoint::Detail, 404, 30));
        for _ in 0..3 {
            recorder.record(&request(Endpoint::Create, 201, 50));
        }
        recorder.record(&request(Endpoint::List, 200, 20));

        assert_eq!(recorder.endpoint_count(Endpoint::Create), 3);
        assert_eq!(recorder.endpoint_count(Endpoint::Health), 0);

        let snap = recorder.snapshot();
        let order: Vec<Endpoint> = snap.per_endpoint.iter().map(|e| e.endpoint).collect();
        assert_eq!(order, vec![Endpoint::Create, Endpoint::List, Endpoint::Detail]);

        let detail = &snap.per_endpoint[2];
        assert_eq!(detail.failed_requests, 1);
        assert_eq!(detail.error_rate, 1.0);
        assert_eq!(detail.p50, 30);
    }

    #[test]
    fn test_iterations_counted() {
        let mut recorder = MetricsRecorder::new();
        for _ in 0..4 {
            recorder.record(&Sample::Iteration);
        }
        assert_eq!(recorder.snapshot().iterations, 4);
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::Create.to_string(), "POST /api/boards");
        assert_eq!(Endpoint::List.to_string(), "GET /api/boards");
        assert_eq!(Endpoint::Detail.to_string(), "GET /api/boards/{id}");
        assert_eq!(Endpoint::Health.to_string(), "GET /actuator/health");
        assert_eq!(Endpoint::Detail.name(), "detail");
    }
}
