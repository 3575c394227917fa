//! `board-loadtest run` command implementation.

use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use board_loadtest::loadtest::config::{DriverKind, LoadTestConfig};
use board_loadtest::loadtest::engine::LoadTestEngine;
use board_loadtest::loadtest::report::{write_report, LoadTestReport};
use board_loadtest::loadtest::summary::render_summary;

/// Default VU count when only `--duration` is given.
const DEFAULT_OVERRIDE_VUS: u32 = 1;
/// Default duration when only `--vus` is given.
const DEFAULT_OVERRIDE_DURATION_SECS: u64 = 30;

/// Flags of the `run` subcommand.
#[derive(Debug, Default)]
pub struct RunOptions {
    pub url: Option<String>,
    pub config_path: Option<PathBuf>,
    pub vus: Option<u32>,
    pub duration: Option<u64>,
    pub iterations: Option<u64>,
    pub driver: Option<DriverKind>,
    pub no_report: bool,
    pub no_color: bool,
}

/// Execute the `run` command.
///
/// Loads config (explicit path, auto-discovery, or the built-in default),
/// applies CLI overrides, runs the engine, prints the summary and writes the
/// JSON report. Fails when any threshold fails.
pub async fn execute_run(opts: RunOptions) -> Result<()> {
    let mut config = load_config(opts.config_path.as_deref())?;
    apply_overrides(&mut config, &opts);

    let mut engine = LoadTestEngine::new(config).with_no_color(opts.no_color);
    if let Some(n) = opts.iterations {
        engine = engine.with_iterations(n);
    }

    let result = engine.run().await.context("Load test failed")?;

    if opts.no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }
    println!("{}", render_summary(&result, engine.config()));

    if !opts.no_report {
        let report = LoadTestReport::from_result(&result, engine.config());
        let cwd = std::env::current_dir()?;
        match write_report(&report, &cwd) {
            Ok(path) => {
                eprintln!();
                eprintln!("Report written to: {}", path.display());
            },
            Err(e) => {
                // Non-fatal -- the test still completed
                tracing::warn!("failed to write report: {e}");
            },
        }
    }

    if !result.passed() {
        let failed: Vec<String> = result
            .thresholds
            .iter()
            .filter(|t| !t.passed)
            .map(|t| format!("{}: {}", t.metric, t.expression))
            .collect();
        anyhow::bail!("thresholds failed: {}", failed.join(", "));
    }

    Ok(())
}

/// Resolve the config: an explicit path must exist, otherwise discover
/// `.loadtest/loadtest.toml` and fall back to the default scenario.
fn load_config(explicit: Option<&Path>) -> Result<LoadTestConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: {}\nUse `board-loadtest init` to create one.",
                    path.display()
                );
            }
            Some(path.to_path_buf())
        },
        None => discover_config(),
    };

    match path {
        Some(path) => {
            eprintln!("Loading config from: {}", path.display());
            LoadTestConfig::load(&path)
                .with_context(|| format!("Failed to load config '{}'", path.display()))
        },
        None => {
            tracing::info!("no .loadtest/loadtest.toml found, using the default scenario");
            Ok(LoadTestConfig::default())
        },
    }
}

/// Apply CLI flag overrides to a loaded config.
///
/// `--vus`/`--duration` replace every scenario with one constant-VU
/// scenario; a missing half falls back to 1 VU or 30 seconds.
fn apply_overrides(config: &mut LoadTestConfig, opts: &RunOptions) {
    if let Some(url) = &opts.url {
        config.settings.base_url = url.trim_end_matches('/').to_string();
    }

    if opts.vus.is_some() || opts.duration.is_some() {
        let vus = opts.vus.unwrap_or(DEFAULT_OVERRIDE_VUS);
        let duration = opts.duration.unwrap_or(DEFAULT_OVERRIDE_DURATION_SECS);
        config.replace_with_constant(vus, duration);
    }

    if let Some(driver) = opts.driver {
        config.force_driver(driver);
    }
}

/// Discover `.loadtest/loadtest.toml` by walking parent directories.
///
/// Starts from the current working directory and walks up until either
/// the file is found or the filesystem root is reached.
fn discover_config() -> Option<PathBuf> {
    let dir = std::env::current_dir().ok()?;
    discover_config_from(dir)
}

fn discover_config_from(mut dir: PathBuf) -> Option<PathBuf> {
    loop {
        let candidate = dir.join(".loadtest").join("loadtest.toml");
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}
