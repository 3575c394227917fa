//! k6-style terminal summary renderer for load test results.
//!
//! Produces a colorized, human-readable summary with:
//! - ASCII art header with the target and scenario schedule
//! - The check list with pass/fail marks
//! - Dotted-line metric rows (metric.........: value)
//! - Per-endpoint latency table
//! - Threshold outcomes
//!
//! [`render_summary`] is a pure function: it takes structured data and
//! returns a formatted [`String`]. Color coding respects the global override
//! set by `colored::control::set_override(false)`.

use colored::Colorize;

use crate::loadtest::config::{Executor, LoadTestConfig};
use crate::loadtest::engine::LoadTestResult;
use crate::loadtest::metrics::MetricsSnapshot;
use crate::loadtest::thresholds::{Metric, ThresholdResult};

/// Width for dotted metric row padding.
const PAD_WIDTH: usize = 30;

const PASS_MARK: &str = "\u{2713}";
const FAIL_MARK: &str = "\u{2717}";

/// Render a k6-style terminal summary from load test results.
///
/// # Layout
///
/// ```text
///           /\      |  board-loadtest
///          /  \     |
///     /\  /    \    |  target:    http://localhost:8080
///    /  \/      \   |  max vus:   100
///   /    \       \  |  duration:  480s
///  /      \       \ |  scenarios: 2
///
///   ✓ create status is 201
///   ✗ list duration < 500ms
///     ↳  97% - ✓ 1940 / ✗ 60
///
///   checks.........................: 99.1%  ✓ 11892  ✗ 108
///   errors.........................: 2.7%   ✓ 108    ✗ 3892
///   http_req_duration..............: avg=41.2ms min=3ms med=22ms max=1204ms p(90)=88ms p(95)=131ms
/// ```
pub fn render_summary(result: &LoadTestResult, config: &LoadTestConfig) -> String {
    let snap = &result.snapshot;
    let mut lines = Vec::new();

    lines.push(render_header(config));

    if !snap.checks.is_empty() {
        lines.extend(render_checks(snap));
        lines.push(String::new());
    }

    lines.extend(render_metric_rows(snap, result.elapsed.as_secs_f64()));

    if !snap.per_endpoint.is_empty() {
        lines.push(String::new());
        lines.extend(render_endpoint_table(snap));
    }

    if !snap.error_category_counts.is_empty() {
        lines.push(String::new());
        lines.push("  request failures:".to_string());
        let mut categories: Vec<_> = snap.error_category_counts.iter().collect();
        categories.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (category, count) in categories {
            lines.push(format_metric_row(
                &format!("  {category}"),
                &count.to_string().red().to_string(),
                PAD_WIDTH,
            ));
        }
    }

    if !result.thresholds.is_empty() {
        lines.push(String::new());
        lines.extend(render_thresholds(&result.thresholds));
    }

    lines.push(String::new());
    lines.push(format!(
        "  running ({:.1}s), {} VUs still active at end, {} complete iterations",
        result.elapsed.as_secs_f64(),
        result.final_active_vus,
        snap.iterations
    ));

    lines.join("\n")
}

fn render_header(config: &LoadTestConfig) -> String {
    let max_vus = config.peak_vus();
    let duration = config.effective_duration_secs();
    format!(
        r#"
          /\      |  {}
         /  \     |
    /\  /    \    |  target:    {}
   /  \/      \   |  max vus:   {}
  /    \       \  |  duration:  {}s
 /      \       \ |  scenarios: {}
{}"#,
        "board-loadtest".bold(),
        config.settings.base_url,
        max_vus,
        duration,
        config.scenario.len(),
        render_schedule(config),
    )
}

fn render_schedule(config: &LoadTestConfig) -> String {
    let mut out = String::new();
    for scenario in &config.scenario {
        let shape = match &scenario.executor {
            Executor::ConstantVus { vus, duration_secs } => {
                format!("{vus} VUs for {duration_secs}s")
            },
            Executor::RampingVus { stages, .. } => {
                format!(
                    "up to {} VUs over {}s ({} stages)",
                    scenario.max_vus(),
                    scenario.duration_secs(),
                    stages.len()
                )
            },
        };
        out.push_str(&format!(
            "\n    * {}: {}, {} driver, starts at {}s",
            scenario.name, shape, scenario.driver, scenario.start_time_secs
        ));
    }
    out.push('\n');
    out
}

fn render_checks(snap: &MetricsSnapshot) -> Vec<String> {
    let mut lines = Vec::new();
    for check in &snap.checks {
        if check.fails == 0 {
            lines.push(format!("  {} {}", PASS_MARK.green(), check.name));
        } else {
            let total = check.passes + check.fails;
            let pct = check.passes as f64 / total as f64 * 100.0;
            lines.push(format!("  {} {}", FAIL_MARK.red(), check.name));
            lines.push(format!(
                "    \u{21b3}  {:.0}% - {} {} / {} {}",
                pct, PASS_MARK, check.passes, FAIL_MARK, check.fails
            ));
        }
    }
    lines
}

fn render_metric_rows(snap: &MetricsSnapshot, elapsed_secs: f64) -> Vec<String> {
    let mut lines = Vec::new();

    let check_passes: u64 = snap.checks.iter().map(|c| c.passes).sum();
    let check_fails: u64 = snap.checks.iter().map(|c| c.fails).sum();
    lines.push(format_metric_row(
        "checks",
        &format!(
            "{}  {} {}  {} {}",
            rate_colored(snap.checks_rate(), check_fails == 0),
            PASS_MARK,
            check_passes,
            FAIL_MARK,
            check_fails
        ),
        PAD_WIDTH,
    ));

    lines.push(format_metric_row(
        "errors",
        &format!(
            "{}  {} {}  {} {}",
            rate_colored(snap.errors_rate, snap.errors_failed == 0),
            PASS_MARK,
            snap.errors_failed,
            FAIL_MARK,
            snap.errors_total - snap.errors_failed
        ),
        PAD_WIDTH,
    ));

    let duration_value = format!(
        "avg={:.1}ms min={}ms med={}ms max={}ms p(90)={}ms p(95)={}ms",
        snap.mean, snap.min, snap.p50, snap.max, snap.p90, snap.p95
    );
    let duration_colored = if snap.p95 < 500 {
        duration_value.green().to_string()
    } else {
        duration_value.yellow().to_string()
    };
    lines.push(format_metric_row("http_req_duration", &duration_colored, PAD_WIDTH));

    lines.push(format_metric_row(
        "http_req_failed",
        &format!(
            "{}  {} {}  {} {}",
            rate_colored(snap.error_rate, snap.failed_requests == 0),
            PASS_MARK,
            snap.failed_requests,
            FAIL_MARK,
            snap.total_requests - snap.failed_requests
        ),
        PAD_WIDTH,
    ));

    lines.push(format_metric_row(
        "http_reqs",
        &format!(
            "{}  {:.1}/s",
            snap.total_requests,
            per_second(snap.total_requests, elapsed_secs)
        ),
        PAD_WIDTH,
    ));

    lines.push(format_metric_row(
        "iterations",
        &format!(
            "{}  {:.1}/s",
            snap.iterations,
            per_second(snap.iterations, elapsed_secs)
        ),
        PAD_WIDTH,
    ));

    lines
}

fn render_endpoint_table(snap: &MetricsSnapshot) -> Vec<String> {
    let mut lines = vec![
        "  per-endpoint metrics:".to_string(),
        String::new(),
        format!(
            "  {:<22} {:>7} {:>7} {:>7} {:>7} {:>7}",
            "endpoint", "reqs", "fail%", "p50", "p95", "p99"
        ),
        format!("  {}", "\u{2500}".repeat(62)),
    ];

    for ep in &snap.per_endpoint {
        let fail_str = format!("{:.1}%", ep.error_rate * 100.0);
        let fail_colored = if ep.failed_requests > 0 {
            fail_str.red().to_string()
        } else {
            fail_str.green().to_string()
        };
        lines.push(format!(
            "  {:<22} {:>7} {:>7} {:>7} {:>7} {:>7}",
            ep.endpoint.to_string(),
            ep.total_requests,
            fail_colored,
            format!("{}ms", ep.p50),
            format!("{}ms", ep.p95),
            format!("{}ms", ep.p99),
        ));
    }
    lines
}

fn render_thresholds(results: &[ThresholdResult]) -> Vec<String> {
    let mut lines = vec!["  thresholds:".to_string()];
    for result in results {
        let mark = if result.passed {
            PASS_MARK.green()
        } else {
            FAIL_MARK.red()
        };
        let observed = match result.observed {
            Some(value) => format_observed(result.metric, value),
            None => "no data".to_string(),
        };
        lines.push(format!(
            "    {} {}: '{}' (observed {})",
            mark, result.metric, result.expression, observed
        ));
    }
    lines
}

fn format_observed(metric: Metric, value: f64) -> String {
    match metric {
        Metric::HttpReqDuration => format!("{value:.1}ms"),
        Metric::HttpReqFailed | Metric::Errors | Metric::Checks => {
            format!("{:.2}%", value * 100.0)
        },
        Metric::HttpReqs | Metric::Iterations => format!("{value}"),
    }
}

fn rate_colored(rate: f64, clean: bool) -> String {
    let s = format!("{:.2}%", rate * 100.0);
    if clean {
        s.green().to_string()
    } else {
        s.red().to_string()
    }
}

fn per_second(count: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        count as f64 / elapsed_secs
    } else {
        0.0
    }
}

/// Format a single metric row with dot-padding.
///
/// Produces: `"  metric_name..................: value_string"`
fn format_metric_row(name: &str, value: &str, pad_width: usize) -> String {
    format!("  {name:.<pad_width$}: {value}")
}
