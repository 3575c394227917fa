//! JSON report serialization for load test results.
//!
//! Produces a schema-versioned JSON report file containing latency percentiles,
//! throughput, check tallies, threshold outcomes and the full resolved config
//! for reproducibility. Designed for CI/CD pipeline consumption.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::loadtest::config::LoadTestConfig;
use crate::loadtest::engine::LoadTestResult;
use crate::loadtest::metrics::{CheckSnapshot, EndpointSnapshot};

/// Schema version for the JSON report format.
///
/// Increment when making breaking changes to the report structure.
const SCHEMA_VERSION: &str = "1.0";

/// Top-level JSON report structure.
#[derive(Debug, Serialize)]
pub struct LoadTestReport {
    /// Report format version for parser compatibility.
    pub schema_version: String,
    /// ISO-8601 timestamp when the report was generated.
    pub timestamp: String,
    /// Base URL of the board API that was tested.
    pub target_url: String,
    /// Actual test duration in seconds.
    pub duration_secs: f64,
    /// `true` when every threshold passed.
    pub passed: bool,
    /// Full resolved configuration (with CLI overrides applied).
    pub config: ReportConfig,
    pub metrics: ReportMetrics,
    pub checks: Vec<CheckSnapshot>,
    pub per_endpoint: Vec<EndpointSnapshot>,
    /// Request failure counts by classification.
    pub errors: HashMap<String, u64>,
    /// Response counts keyed by HTTP status (`"0"` for no response).
    pub status_counts: BTreeMap<String, u64>,
    pub thresholds: Vec<ThresholdReport>,
}

/// Resolved test configuration embedded in the report.
#[derive(Debug, Serialize)]
pub struct ReportConfig {
    pub timeout_ms: u64,
    pub write_ratio: f64,
    /// Scenarios as JSON values for stable serialization.
    pub scenarios: Vec<serde_json::Value>,
    pub thresholds: BTreeMap<String, Vec<String>>,
}

/// Aggregate metrics in the report.
#[derive(Debug, Serialize)]
pub struct ReportMetrics {
    pub http_reqs: u64,
    pub http_reqs_per_sec: f64,
    pub http_req_failed: u64,
    /// `http_req_failed` rate (0.0..=1.0).
    pub http_req_failed_rate: f64,
    pub errors_rate: f64,
    pub checks_rate: f64,
    pub iterations: u64,
    pub http_req_duration: LatencyMetrics,
}

/// Latency metrics in milliseconds.
#[derive(Debug, Serialize)]
pub struct LatencyMetrics {
    pub avg_ms: f64,
    pub min_ms: u64,
    pub med_ms: u64,
    pub max_ms: u64,
    pub p90_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

/// One threshold outcome.
#[derive(Debug, Serialize)]
pub struct ThresholdReport {
    pub metric: String,
    pub expression: String,
    /// Observed aggregate, absent when the metric had no data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed: Option<f64>,
    pub passed: bool,
}

impl LoadTestReport {
    /// Build a report from load test results and the config that produced them.
    pub fn from_result(result: &LoadTestResult, config: &LoadTestConfig) -> Self {
        let snap = &result.snapshot;
        let elapsed_secs = result.elapsed.as_secs_f64();
        let http_reqs_per_sec = if elapsed_secs > 0.0 {
            snap.total_requests as f64 / elapsed_secs
        } else {
            0.0
        };

        let scenarios: Vec<serde_json::Value> = config
            .scenario
            .iter()
            .map(|s| serde_json::to_value(s).unwrap_or(serde_json::Value::Null))
            .collect();

        let status_counts = snap
            .status_counts
            .iter()
            .map(|(status, count)| (status.to_string(), *count))
            .collect();

        let thresholds = result
            .thresholds
            .iter()
            .map(|t| ThresholdReport {
                metric: t.metric.to_string(),
                expression: t.expression.clone(),
                observed: t.observed,
                passed: t.passed,
            })
            .collect();

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            target_url: config.settings.base_url.clone(),
            duration_secs: elapsed_secs,
            passed: result.passed(),
            config: ReportConfig {
                timeout_ms: config.settings.timeout_ms,
                write_ratio: config.settings.write_ratio,
                scenarios,
                thresholds: config.thresholds.clone(),
            },
            metrics: ReportMetrics {
                http_reqs: snap.total_requests,
                http_reqs_per_sec,
                http_req_failed: snap.failed_requests,
                http_req_failed_rate: snap.error_rate,
                errors_rate: snap.errors_rate,
                checks_rate: snap.checks_rate(),
                iterations: snap.iterations,
                http_req_duration: LatencyMetrics {
                    avg_ms: snap.mean,
                    min_ms: snap.min,
                    med_ms: snap.p50,
                    max_ms: snap.max,
                    p90_ms: snap.p90,
                    p95_ms: snap.p95,
                    p99_ms: snap.p99,
                },
            },
            checks: snap.checks.clone(),
            per_endpoint: snap.per_endpoint.clone(),
            errors: snap.error_category_counts.clone(),
            status_counts,
            thresholds,
        }
    }
}

/// Write a JSON report file to the `.loadtest/reports/` directory.
///
/// Creates the reports directory if it does not exist. The filename is
/// timestamped: `loadtest-YYYY-MM-DDTHH-MM-SS.json` (hyphens, not colons,
/// for Windows compatibility).
pub fn write_report(report: &LoadTestReport, base_dir: &Path) -> Result<PathBuf, std::io::Error> {
    let reports_dir = base_dir.join(".loadtest").join("reports");
    std::fs::create_dir_all(&reports_dir)?;

    let report_path = reports_dir.join(report_filename(&chrono::Utc::now()));
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(&report_path, json)?;

    tracing::debug!(path = %report_path.display(), "report written");
    Ok(report_path)
}

/// Generate the report filename for a given timestamp.
pub fn report_filename(timestamp: &chrono::DateTime<chrono::Utc>) -> String {
    format!("loadtest-{}.json", timestamp.format("%Y-%m-%dT%H-%M-%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::metrics::{Endpoint, MetricsRecorder, RequestSample, Sample};
    use crate::loadtest::thresholds::{Metric, ThresholdResult};
    use std::time::Duration;

    fn test_result() -> LoadTestResult {
        let mut recorder = MetricsRecorder::new();
        for ms in [10, 20, 30, 40] {
            recorder.record(&Sample::Request(RequestSample::new(
                Endpoint::List,
                200,
                Duration::from_millis(ms),
                None,
            )));
        }
        recorder.record(&Sample::Check {
            name: "list status is 200",
            passed: true,
        });
        recorder.record(&Sample::Iteration);

        LoadTestResult {
            snapshot: recorder.snapshot(),
            elapsed: Duration::from_secs(2),
            wall_clock_secs: 2.1,
            final_active_vus: 0,
            thresholds: vec![ThresholdResult {
                metric: Metric::HttpReqDuration,
                expression: "p(95)<500".to_string(),
                observed: Some(40.0),
                passed: true,
            }],
        }
    }

    #[test]
    fn test_report_schema_and_target() {
        let config = LoadTestConfig::default();
        let report = LoadTestReport::from_result(&test_result(), &config);
        assert_eq!(report.schema_version, "1.0");
        assert_eq!(report.target_url, "http://localhost:8080");
        assert!(report.passed);
    }

    #[test]
    fn test_report_metrics() {
        let report = LoadTestReport::from_result(&test_result(), &LoadTestConfig::default());
        assert_eq!(report.metrics.http_reqs, 4);
        assert!((report.metrics.http_reqs_per_sec - 2.0).abs() < 0.001);
        assert_eq!(report.metrics.iterations, 1);
        assert_eq!(report.metrics.http_req_duration.max_ms, 40);
        assert_eq!(report.status_counts.get("200"), Some(&4));
        assert_eq!(report.checks.len(), 1);
    }

    #[test]
    fn test_report_embeds_config() {
        let config = LoadTestConfig::default();
        let report = LoadTestReport::from_result(&test_result(), &config);
        assert_eq!(report.config.scenarios.len(), config.scenario.len());
        assert_eq!(report.config.scenarios[1]["executor"], "constant-vus");
        assert_eq!(report.config.thresholds, config.thresholds);
    }

    #[test]
    fn test_report_serializes_thresholds() {
        let report = LoadTestReport::from_result(&test_result(), &LoadTestConfig::default());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["thresholds"][0]["metric"], "http_req_duration");
        assert_eq!(json["thresholds"][0]["passed"], true);
        assert_eq!(json["per_endpoint"][0]["endpoint"], "list");
    }

    #[test]
    fn test_report_filename_format() {
        let ts = chrono::DateTime::parse_from_rfc3339("2026-03-01T14:30:05Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(report_filename(&ts), "loadtest-2026-03-01T14-30-05.json");
    }

    #[test]
    fn test_write_report_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let report = LoadTestReport::from_result(&test_result(), &LoadTestConfig::default());
        let path = write_report(&report, dir.path()).unwrap();

        assert!(path.starts_with(dir.path().join(".loadtest").join("reports")));
        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["schema_version"], "1.0");
    }
}
