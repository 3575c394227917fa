//! k6-style live terminal display for load test progress.
//!
//! Renders a compact, in-place updating line on stderr showing active VUs,
//! requests per second, P95 latency, failed requests, failed checks and
//! elapsed time. Updates every 2 seconds from a watch channel, not per-request.
//!
//! While scenarios are running, their phase (e.g. `[ramping_load: stage 2/5]`)
//! is shown as a prefix.

use crate::loadtest::engine::DisplayState;
use crate::loadtest::metrics::MetricsSnapshot;
use crate::loadtest::vu::ActiveVuCounter;

use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// P95 above this is highlighted (milliseconds).
const SLOW_P95_MS: u64 = 500;

/// Live terminal display for a running load test.
pub struct LiveDisplay {
    _multi: MultiProgress,
    status_bar: ProgressBar,
}

impl LiveDisplay {
    /// Create a new live display.
    ///
    /// If `no_color` is true or stderr is not a terminal (piped),
    /// color output is disabled.
    pub fn new(no_color: bool) -> Self {
        if no_color || !std::io::stderr().is_terminal() {
            colored::control::set_override(false);
        }

        let multi = MultiProgress::new();
        let status_bar = multi.add(ProgressBar::new_spinner());
        let style = ProgressStyle::with_template("{spinner:.cyan} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        status_bar.set_style(style);
        status_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            _multi: multi,
            status_bar,
        }
    }

    /// Format a single line of live status from a snapshot.
    ///
    /// Color coding: red for failed requests or errors, yellow for a P95
    /// above 500ms, green otherwise.
    pub fn format_status(
        snap: &MetricsSnapshot,
        elapsed: Duration,
        active_vus: u32,
        target_vus: u64,
        phase: Option<&str>,
    ) -> String {
        let elapsed_secs = elapsed.as_secs_f64();
        let rps = if elapsed_secs > 0.0 {
            snap.total_requests as f64 / elapsed_secs
        } else {
            0.0
        };

        let vu_display = format!("{}/{}", active_vus, target_vus).green();
        let rps_display = format!("{:.1}", rps).green();

        let p95_str = format!("{}ms", snap.p95);
        let p95_display = if snap.p95 > SLOW_P95_MS {
            p95_str.yellow().to_string()
        } else {
            p95_str.green().to_string()
        };

        let failed_str = format!(
            "{} ({:.1}%)",
            snap.failed_requests,
            snap.error_rate * 100.0
        );
        let failed_display = if snap.failed_requests > 0 {
            failed_str.red().to_string()
        } else {
            failed_str
        };

        let errors_str = format!("{:.1}%", snap.errors_rate * 100.0);
        let errors_display = if snap.errors_failed > 0 {
            errors_str.red().to_string()
        } else {
            errors_str
        };

        let metrics_line = format!(
            "vus: {}  |  iters: {}  |  rps: {}  |  p95: {}  |  failed: {}  |  errors: {}  |  elapsed: {}s",
            vu_display,
            snap.iterations,
            rps_display,
            p95_display,
            failed_display,
            errors_display,
            elapsed.as_secs()
        );

        match phase {
            Some(label) => format!("  [{}]  {}", label, metrics_line),
            None => format!("  {}", metrics_line),
        }
    }

    pub fn update(
        &self,
        snap: &MetricsSnapshot,
        elapsed: Duration,
        active_vus: u32,
        target_vus: u64,
        phase: Option<&str>,
    ) {
        let msg = Self::format_status(snap, elapsed, active_vus, target_vus, phase);
        self.status_bar.set_message(msg);
    }

    /// Stop the display and clear the spinner.
    pub fn finish(&self) {
        self.status_bar.finish_and_clear();
    }
}

/// Run the live display loop.
///
/// Stops when the [`CancellationToken`] is cancelled or the watch sender is
/// dropped.
pub async fn display_loop(
    mut display_rx: watch::Receiver<DisplayState>,
    active_vus: ActiveVuCounter,
    target_vus: u64,
    cancel: CancellationToken,
    no_color: bool,
    test_start: Instant,
) {
    let display = LiveDisplay::new(no_color);

    eprintln!();
    eprintln!("  Running load test...");
    eprintln!();

    loop {
        tokio::select! {
            result = display_rx.changed() => {
                if result.is_err() {
                    // Sender dropped, test is ending
                    break;
                }
                let state = display_rx.borrow_and_update().clone();
                display.update(
                    &state.snapshot,
                    test_start.elapsed(),
                    active_vus.get(),
                    target_vus,
                    state.phase.as_deref(),
                );
            }
            _ = cancel.cancelled() => {
                let state = display_rx.borrow().clone();
                display.update(
                    &state.snapshot,
                    test_start.elapsed(),
                    active_vus.get(),
                    target_vus,
                    state.phase.as_deref(),
                );
                break;
            }
        }
    }

    display.finish();
}
