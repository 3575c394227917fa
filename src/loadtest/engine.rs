//! Load test execution engine with metrics aggregation and graceful shutdown.
//!
//! [`LoadTestEngine`] is the top-level orchestrator that:
//! - Runs the `setup` hook, every configured scenario, then `teardown`
//! - Spawns virtual user tasks via [`tokio_util::task::TaskTracker`]
//! - Collects metrics through a bounded mpsc channel
//! - Publishes snapshots through a watch channel for live display
//! - Coordinates graceful shutdown via [`CancellationToken`]
//! - Evaluates thresholds against the final metrics
//!
//! Each scenario runs in its own task. After its start offset it either holds
//! a constant VU count for its duration, or walks its stages, spawning VUs with
//! linear stagger when ramping up and cancelling them LIFO when ramping down.

use crate::loadtest::client::BoardClient;
use crate::loadtest::config::{DriverKind, Executor, LoadTestConfig, ScenarioConfig, Stage, ThinkTime};
use crate::loadtest::display::display_loop;
use crate::loadtest::driver::RequestDriver;
use crate::loadtest::error::LoadTestError;
use crate::loadtest::lifecycle;
use crate::loadtest::metrics::{MetricsRecorder, MetricsSnapshot, Sample};
use crate::loadtest::thresholds::ThresholdResult;
use crate::loadtest::vu::{vu_loop, ActiveVuCounter, IterationBudget};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Extra time past the last scheduled scenario end before the run is forced to stop.
const SAFETY_MARGIN_SECS: u64 = 30;

/// How often the aggregator publishes a snapshot to the display.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(2);

/// Sample channel slots reserved per VU.
const SAMPLES_PER_VU: usize = 100;

/// Upper bound on the sample channel capacity.
const MAX_SAMPLE_BUFFER: usize = 1 << 20;

/// Compile-time Send bounds verification for channel-transported types.
fn _assert_send<T: Send>() {}
#[allow(dead_code)]
fn _check_send_bounds() {
    _assert_send::<Sample>();
    _assert_send::<MetricsSnapshot>();
    _assert_send::<DisplayState>();
}

/// Display state published through the watch channel to the live terminal display.
#[derive(Debug, Clone)]
pub struct DisplayState {
    /// Current metrics snapshot.
    pub snapshot: MetricsSnapshot,
    /// What each running scenario is doing (e.g., `"ramping_load: stage 2/5"`),
    /// or `None` when no scenario is active.
    pub phase: Option<String>,
}

/// Per-scenario phase labels, keyed by scenario name.
type PhaseMap = BTreeMap<String, String>;

/// Top-level load test engine configuration and entry point.
pub struct LoadTestEngine {
    config: LoadTestConfig,
    max_iterations: Option<u64>,
    no_color: bool,
}

impl LoadTestEngine {
    /// Creates a new engine for the given configuration.
    pub fn new(config: LoadTestConfig) -> Self {
        Self {
            config,
            max_iterations: None,
            no_color: false,
        }
    }

    /// Sets an iteration limit. The test stops after this many total iterations
    /// across all VUs (first-limit-wins with the scenario durations).
    pub fn with_iterations(mut self, n: u64) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Disables colored output.
    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    pub fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    /// Run the load test to completion.
    ///
    /// Configuration and threshold errors are returned before any request is
    /// sent. Once running, request failures only show up in the metrics.
    pub async fn run(&self) -> Result<LoadTestResult, LoadTestError> {
        self.config.validate()?;
        let thresholds = self.config.threshold_set()?;

        let settings = &self.config.settings;
        let client = BoardClient::new(
            reqwest::Client::new(),
            settings.base_url.clone(),
            settings.timeout_as_duration(),
        );
        let run_data = lifecycle::setup(&client).await;

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let active_vus = ActiveVuCounter::new();

        let peak_vus = self.config.peak_vus();
        let buffer_size = sample_buffer_size(peak_vus);
        let (sample_tx, sample_rx) = mpsc::channel::<Sample>(buffer_size);
        let (phase_tx, phase_rx) = watch::channel(PhaseMap::new());
        let (display_tx, display_rx) = watch::channel(DisplayState {
            snapshot: MetricsRecorder::new().snapshot(),
            phase: None,
        });

        let test_start = Instant::now();

        // Spawn metrics aggregator (NOT on tracker -- must outlive VU tasks)
        let aggregator_handle = tokio::spawn(metrics_aggregator(sample_rx, display_tx, phase_rx));

        let display_handle = tokio::spawn(display_loop(
            display_rx,
            active_vus.clone(),
            peak_vus,
            cancel.clone(),
            self.no_color,
            test_start,
        ));

        let ctrl_c_handle = tokio::spawn(handle_ctrl_c(cancel.clone()));

        let context = Arc::new(ScenarioContext {
            driver: RequestDriver::new(client, settings.write_ratio),
            think_time: settings.think_time,
            sample_tx,
            tracker: tracker.clone(),
            active_vus: active_vus.clone(),
            budget: self
                .max_iterations
                .map(|n| IterationBudget::new(n, cancel.clone())),
            next_vu_id: AtomicU32::new(0),
            phases: phase_tx,
        });

        let mut scenarios = JoinSet::new();
        for scenario in &self.config.scenario {
            scenarios.spawn(run_scenario(
                Arc::clone(&context),
                scenario.clone(),
                cancel.child_token(),
            ));
        }
        // Scenario tasks hold their own clones of the context
        drop(context);

        // Run controller -- first-limit-wins between scenario completion,
        // iteration limit, safety timeout and Ctrl+C
        let safety_timeout =
            Duration::from_secs(self.config.effective_duration_secs() + SAFETY_MARGIN_SECS);
        tokio::select! {
            _ = async { while scenarios.join_next().await.is_some() {} } => {}
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(safety_timeout) => {
                tracing::warn!("Safety timeout reached, stopping test.");
            }
        }

        // Cancel all remaining VUs and let scenario tasks wind down
        cancel.cancel();
        while scenarios.join_next().await.is_some() {}

        // Drain: close tracker and wait for all VU tasks
        tracker.close();
        tracker.wait().await;
        ctrl_c_handle.abort();

        // Every sender is gone now, so the aggregator drains and returns
        let recorder = aggregator_handle
            .await
            .map_err(|e| LoadTestError::Runtime {
                message: format!("metrics aggregator failed: {e}"),
            })?;
        let _ = display_handle.await;

        let elapsed = test_start.elapsed();
        let wall_clock_secs = lifecycle::teardown(&run_data);

        Ok(LoadTestResult {
            snapshot: recorder.snapshot(),
            elapsed,
            wall_clock_secs,
            final_active_vus: active_vus.get(),
            thresholds: thresholds.evaluate(&recorder, elapsed),
        })
    }
}

/// Result of a completed load test run.
#[derive(Debug)]
pub struct LoadTestResult {
    /// Final metrics snapshot.
    pub snapshot: MetricsSnapshot,
    /// Time from the first scheduled scenario to the end of the drain.
    pub elapsed: Duration,
    /// Seconds from `setup` to `teardown`, as reported by the teardown hook.
    pub wall_clock_secs: f64,
    /// Number of VUs that were still active at test end.
    pub final_active_vus: u32,
    /// Outcome of every configured threshold.
    pub thresholds: Vec<ThresholdResult>,
}

impl LoadTestResult {
    /// `true` when every threshold passed.
    pub fn passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }
}

/// Capacity of the sample channel for a run peaking at `peak_vus`.
///
/// Each VU emits several samples per iteration, so the buffer is generous,
/// but it is clamped so huge VU counts cannot overflow or exhaust memory.
fn sample_buffer_size(peak_vus: u64) -> usize {
    usize::try_from(peak_vus.max(1))
        .unwrap_or(usize::MAX)
        .saturating_mul(SAMPLES_PER_VU)
        .min(MAX_SAMPLE_BUFFER)
}

/// Everything a scenario task needs to spawn virtual users.
struct ScenarioContext {
    driver: RequestDriver,
    think_time: Option<ThinkTime>,
    sample_tx: mpsc::Sender<Sample>,
    tracker: TaskTracker,
    active_vus: ActiveVuCounter,
    budget: Option<IterationBudget>,
    next_vu_id: AtomicU32,
    phases: watch::Sender<PhaseMap>,
}

impl ScenarioContext {
    fn spawn_vu(&self, kind: DriverKind, token: CancellationToken) {
        let vu_id = self.next_vu_id.fetch_add(1, Ordering::Relaxed);
        self.tracker.spawn(vu_loop(
            vu_id,
            kind,
            self.driver.clone(),
            self.think_time,
            self.sample_tx.clone(),
            token,
            self.budget.clone(),
            self.active_vus.clone(),
        ));
    }

    fn set_phase(&self, scenario: &str, label: String) {
        self.phases.send_modify(|phases| {
            phases.insert(scenario.to_string(), label);
        });
    }

    fn clear_phase(&self, scenario: &str) {
        self.phases.send_modify(|phases| {
            phases.remove(scenario);
        });
    }
}

/// Sleep for `duration` unless `cancel` fires first. Returns `false` if cancelled.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}

/// Drive one scenario from its start offset to its end.
///
/// All VUs of the scenario hang off `cancel`, which is cancelled on return.
async fn run_scenario(ctx: Arc<ScenarioContext>, scenario: ScenarioConfig, cancel: CancellationToken) {
    let name = scenario.name.as_str();

    if scenario.start_time_secs > 0 {
        ctx.set_phase(name, format!("starts in {}s", scenario.start_time_secs));
        if !sleep_or_cancel(Duration::from_secs(scenario.start_time_secs), &cancel).await {
            ctx.clear_phase(name);
            return;
        }
    }

    tracing::info!(scenario = name, driver = %scenario.driver, "scenario started");

    match &scenario.executor {
        Executor::ConstantVus { vus, duration_secs } => {
            ctx.set_phase(name, format!("{vus} VUs"));
            for _ in 0..*vus {
                ctx.spawn_vu(scenario.driver, cancel.child_token());
            }
            sleep_or_cancel(Duration::from_secs(*duration_secs), &cancel).await;
        },
        Executor::RampingVus { start_vus, stages } => {
            run_stages(&ctx, &scenario, *start_vus, stages, &cancel).await;
        },
    }

    cancel.cancel();
    ctx.clear_phase(name);
    tracing::info!(scenario = name, "scenario finished");
}

/// Walk the stages of a ramping scenario.
///
/// For each stage, the scheduler:
/// 1. Computes how many VUs to add or remove to reach `target_vus`.
/// 2. **Ramp up**: spawns VUs with linear stagger, each getting a `child_token()`.
/// 3. **Ramp down**: cancels VU tokens in LIFO order with the same stagger.
/// 4. **Hold**: waits for the remaining stage duration.
async fn run_stages(
    ctx: &ScenarioContext,
    scenario: &ScenarioConfig,
    start_vus: u32,
    stages: &[Stage],
    cancel: &CancellationToken,
) {
    let name = scenario.name.as_str();
    let total_stages = stages.len();

    // Per-VU cancellation tokens for selective ramp-down (LIFO order)
    let mut vu_tokens: Vec<CancellationToken> = Vec::new();
    for _ in 0..start_vus {
        let token = cancel.child_token();
        vu_tokens.push(token.clone());
        ctx.spawn_vu(scenario.driver, token);
    }

    for (stage_idx, stage) in stages.iter().enumerate() {
        let stage_start = Instant::now();
        let stage_duration = Duration::from_secs(stage.duration_secs);
        ctx.set_phase(name, format!("stage {}/{}", stage_idx + 1, total_stages));

        let current = vu_tokens.len() as u32;
        let target = stage.target_vus;
        let delta = current.abs_diff(target);
        let delay_per_vu = if delta > 1 {
            stage_duration / delta
        } else {
            Duration::ZERO
        };

        for step in 0..delta {
            if cancel.is_cancelled() {
                return;
            }

            if target > current {
                let token = cancel.child_token();
                vu_tokens.push(token.clone());
                ctx.spawn_vu(scenario.driver, token);
            } else if let Some(token) = vu_tokens.pop() {
                token.cancel();
            }

            // Stagger between changes (not after last)
            if step + 1 < delta && !sleep_or_cancel(delay_per_vu, cancel).await {
                return;
            }
        }

        // Wait for remaining stage time
        let elapsed_in_stage = stage_start.elapsed();
        if elapsed_in_stage < stage_duration
            && !sleep_or_cancel(stage_duration - elapsed_in_stage, cancel).await
        {
            return;
        }
    }
}

/// Join the active scenario phases into one display label.
fn phase_label(phases: &PhaseMap) -> Option<String> {
    if phases.is_empty() {
        return None;
    }
    Some(
        phases
            .iter()
            .map(|(name, label)| format!("{name}: {label}"))
            .collect::<Vec<_>>()
            .join(", "),
    )
}

/// Metrics aggregator task.
///
/// Consumes [`Sample`] values from the mpsc channel into the single
/// [`MetricsRecorder`] and publishes a [`DisplayState`] via the watch channel
/// every 2 seconds. Returns the recorder once every sender is dropped.
///
/// Uses `biased;` select to ensure the tick branch is checked first,
/// preventing display starvation when the mpsc channel is busy.
async fn metrics_aggregator(
    mut sample_rx: mpsc::Receiver<Sample>,
    display_tx: watch::Sender<DisplayState>,
    phase_rx: watch::Receiver<PhaseMap>,
) -> MetricsRecorder {
    let mut recorder = MetricsRecorder::new();
    let mut tick = tokio::time::interval(SNAPSHOT_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = tick.tick() => {
                // Drain all available samples before publishing snapshot
                while let Ok(sample) = sample_rx.try_recv() {
                    recorder.record(&sample);
                }
                let _ = display_tx.send(DisplayState {
                    snapshot: recorder.snapshot(),
                    phase: phase_label(&phase_rx.borrow()),
                });
            }
            result = sample_rx.recv() => {
                match result {
                    Some(sample) => recorder.record(&sample),
                    None => {
                        // All senders dropped -- VUs are done
                        let _ = display_tx.send(DisplayState {
                            snapshot: recorder.snapshot(),
                            phase: None,
                        });
                        break;
                    }
                }
            }
        }
    }

    recorder
}

/// Ctrl+C handler with two-phase shutdown.
///
/// First Ctrl+C triggers graceful drain via the cancellation token.
/// Second Ctrl+C performs a hard abort via `std::process::exit(1)`.
/// If the signal handler cannot be installed, Ctrl+C keeps its default
/// behavior.
async fn handle_ctrl_c(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::debug!("failed to install ctrl_c handler: {e}");
        return;
    }
    eprintln!("\nReceived Ctrl+C, stopping gracefully...");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("\nReceived second Ctrl+C, aborting immediately.");
        std::process::exit(1);
    }
}
