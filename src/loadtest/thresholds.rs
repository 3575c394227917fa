//! Pass/fail thresholds evaluated over aggregated metrics at the end of a run.
//!
//! Thresholds are declared per metric in the `[thresholds]` table using
//! k6-style expressions:
//!
//! ```toml
//! [thresholds]
//! http_req_duration = ["p(95)<500"]
//! http_req_failed = ["rate<0.05"]
//! errors = ["rate<0.05"]
//! ```
//!
//! Each expression is `<aggregation> <op> <number>`. Failing a threshold marks
//! the run as failed; it never stops in-flight iterations.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::loadtest::error::LoadTestError;
use crate::loadtest::metrics::MetricsRecorder;

/// A metric that thresholds can be declared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    /// Trend of request durations in milliseconds, across all requests.
    HttpReqDuration,
    /// Rate of requests that failed (transport error or status outside `200..400`).
    HttpReqFailed,
    /// Rate of failed check groups.
    Errors,
    /// Rate of individual checks that passed.
    Checks,
    /// Counter of HTTP requests.
    HttpReqs,
    /// Counter of completed driver iterations.
    Iterations,
}

impl Metric {
    /// The metric name as written in config files and the summary.
    pub fn name(self) -> &'static str {
        match self {
            Self::HttpReqDuration => "http_req_duration",
            Self::HttpReqFailed => "http_req_failed",
            Self::Errors => "errors",
            Self::Checks => "checks",
            Self::HttpReqs => "http_reqs",
            Self::Iterations => "iterations",
        }
    }

    fn supports(self, aggregation: Aggregation) -> bool {
        match self {
            Self::HttpReqDuration => matches!(
                aggregation,
                Aggregation::Percentile(_)
                    | Aggregation::Avg
                    | Aggregation::Min
                    | Aggregation::Max
                    | Aggregation::Med
            ),
            Self::HttpReqFailed | Self::Errors | Self::Checks => {
                matches!(aggregation, Aggregation::Rate)
            },
            Self::HttpReqs | Self::Iterations => {
                matches!(aggregation, Aggregation::Count | Aggregation::Rate)
            },
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http_req_duration" => Ok(Self::HttpReqDuration),
            "http_req_failed" => Ok(Self::HttpReqFailed),
            "errors" => Ok(Self::Errors),
            "checks" => Ok(Self::Checks),
            "http_reqs" => Ok(Self::HttpReqs),
            "iterations" => Ok(Self::Iterations),
            other => Err(format!("unknown metric '{other}'")),
        }
    }
}

/// How a metric is reduced to a single number before comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    /// Percentile in `(0, 100]`, written `p(95)`.
    Percentile(f64),
    Avg,
    Min,
    Max,
    Med,
    /// Fraction for rate metrics, per-second throughput for counters.
    Rate,
    Count,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percentile(p) => write!(f, "p({p})"),
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Med => f.write_str("med"),
            Self::Rate => f.write_str("rate"),
            Self::Count => f.write_str("count"),
        }
    }
}

/// Comparison operator of a threshold expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    fn holds(self, observed: f64, bound: f64) -> bool {
        match self {
            Self::Lt => observed < bound,
            Self::Le => observed <= bound,
            Self::Gt => observed > bound,
            Self::Ge => observed >= bound,
            Self::Eq => (observed - bound).abs() < f64::EPSILON,
            Self::Ne => (observed - bound).abs() >= f64::EPSILON,
        }
    }
}

/// A single parsed threshold: `metric: aggregation op bound`.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: Metric,
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub bound: f64,
    /// The expression as written in the config, for display.
    pub expression: String,
}

/// Outcome of evaluating one [`Threshold`].
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub metric: Metric,
    pub expression: String,
    /// Observed aggregate, or `None` when the metric has no data.
    pub observed: Option<f64>,
    pub passed: bool,
}

impl Threshold {
    /// Parse an expression such as `p(95)<500` for the named metric.
    pub fn parse(metric: &str, expression: &str) -> Result<Self, LoadTestError> {
        let fail = |reason: String| LoadTestError::Threshold {
            metric: metric.to_string(),
            expression: expression.to_string(),
            reason,
        };

        let parsed_metric = metric.parse::<Metric>().map_err(fail)?;
        let trimmed = expression.trim();

        let (aggregation, rest) = parse_aggregation(trimmed).map_err(fail)?;
        if !parsed_metric.supports(aggregation) {
            return Err(fail(format!(
                "aggregation '{aggregation}' is not available for {parsed_metric}"
            )));
        }

        let (comparison, rest) = parse_comparison(rest.trim_start()).map_err(fail)?;
        let bound = rest
            .trim()
            .parse::<f64>()
            .map_err(|_| fail(format!("'{}' is not a number", rest.trim())))?;
        if !bound.is_finite() {
            return Err(fail(format!("bound '{}' must be a finite number", rest.trim())));
        }

        Ok(Self {
            metric: parsed_metric,
            aggregation,
            comparison,
            bound,
            expression: trimmed.to_string(),
        })
    }

    /// Compute the observed value for this threshold from the recorder.
    ///
    /// `elapsed` is the run duration, used for per-second counter rates.
    pub fn observe(&self, recorder: &MetricsRecorder, elapsed: Duration) -> Option<f64> {
        match self.metric {
            Metric::HttpReqDuration => {
                if recorder.total_requests() == 0 {
                    return None;
                }
                let value = match self.aggregation {
                    Aggregation::Percentile(p) => recorder.duration_quantile(p / 100.0) as f64,
                    Aggregation::Med => recorder.duration_quantile(0.5) as f64,
                    Aggregation::Avg => recorder.duration_mean(),
                    Aggregation::Min => recorder.duration_min() as f64,
                    Aggregation::Max => recorder.duration_max() as f64,
                    Aggregation::Rate | Aggregation::Count => return None,
                };
                Some(value)
            },
            Metric::HttpReqFailed => {
                (recorder.total_requests() > 0).then(|| recorder.error_rate())
            },
            Metric::Errors => {
                (recorder.error_metric_total() > 0).then(|| recorder.errors_rate())
            },
            Metric::Checks => (recorder.check_total() > 0).then(|| recorder.checks_rate()),
            Metric::HttpReqs => Some(counter_value(
                recorder.total_requests(),
                self.aggregation,
                elapsed,
            )),
            Metric::Iterations => Some(counter_value(
                recorder.iterations(),
                self.aggregation,
                elapsed,
            )),
        }
    }

    /// Evaluate against the recorder. Metrics without data pass.
    pub fn evaluate(&self, recorder: &MetricsRecorder, elapsed: Duration) -> ThresholdResult {
        let observed = self.observe(recorder, elapsed);
        let passed = observed.is_none_or(|value| self.comparison.holds(value, self.bound));
        ThresholdResult {
            metric: self.metric,
            expression: self.expression.clone(),
            observed,
            passed,
        }
    }
}

fn counter_value(count: u64, aggregation: Aggregation, elapsed: Duration) -> f64 {
    match aggregation {
        Aggregation::Rate => {
            let secs = elapsed.as_secs_f64();
            if secs > 0.0 {
                count as f64 / secs
            } else {
                0.0
            }
        },
        _ => count as f64,
    }
}

fn parse_aggregation(input: &str) -> Result<(Aggregation, &str), String> {
    if let Some(rest) = input.strip_prefix("p(") {
        let close = rest
            .find(')')
            .ok_or_else(|| "missing ')' after percentile".to_string())?;
        let value: f64 = rest[..close]
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not a valid percentile", &rest[..close]))?;
        if !(value > 0.0 && value <= 100.0) {
            return Err(format!("percentile {value} must be in (0, 100]"));
        }
        return Ok((Aggregation::Percentile(value), &rest[close + 1..]));
    }

    let end = input
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(input.len());
    let aggregation = match &input[..end] {
        "avg" => Aggregation::Avg,
        "min" => Aggregation::Min,
        "max" => Aggregation::Max,
        "med" => Aggregation::Med,
        "rate" => Aggregation::Rate,
        "count" => Aggregation::Count,
        "" => return Err("missing aggregation".to_string()),
        other => return Err(format!("unknown aggregation '{other}'")),
    };
    Ok((aggregation, &input[end..]))
}

fn parse_comparison(input: &str) -> Result<(Comparison, &str), String> {
    const OPERATORS: [(&str, Comparison); 6] = [
        ("<=", Comparison::Le),
        (">=", Comparison::Ge),
        ("==", Comparison::Eq),
        ("!=", Comparison::Ne),
        ("<", Comparison::Lt),
        (">", Comparison::Gt),
    ];
    OPERATORS
        .iter()
        .find_map(|(token, op)| input.strip_prefix(token).map(|rest| (*op, rest)))
        .ok_or_else(|| "missing comparison operator".to_string())
}

/// All thresholds of a run, in metric-name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdSet {
    thresholds: Vec<Threshold>,
}

impl ThresholdSet {
    /// Parse the `[thresholds]` table of a config.
    pub fn from_config(table: &BTreeMap<String, Vec<String>>) -> Result<Self, LoadTestError> {
        let mut thresholds = Vec::new();
        for (metric, expressions) in table {
            for expression in expressions {
                thresholds.push(Threshold::parse(metric, expression)?);
            }
        }
        Ok(Self { thresholds })
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Threshold> {
        self.thresholds.iter()
    }

    /// Evaluate every threshold against the final recorder state.
    pub fn evaluate(&self, recorder: &MetricsRecorder, elapsed: Duration) -> Vec<ThresholdResult> {
        self.thresholds
            .iter()
            .map(|t| t.evaluate(recorder, elapsed))
            .collect()
    }
}
