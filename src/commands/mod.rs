//! `board-loadtest` CLI subcommands.
//!
//! Provides `run` (execute a load test) and `init` (generate starter config).

mod init;
mod run;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use board_loadtest::loadtest::config::DriverKind;

/// Load test commands for the board API.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test against the board API
    ///
    /// Executes the scenarios defined in .loadtest/loadtest.toml (or a custom
    /// config path, or the built-in default scenario when neither exists).
    /// Reports results to the terminal and writes a JSON report to
    /// .loadtest/reports/.
    Run {
        /// Base URL of the board service (overrides config)
        #[arg(long, env = "BOARD_LOADTEST_URL")]
        url: Option<String>,

        /// Path to config file (default: auto-discover .loadtest/loadtest.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Run a single constant scenario with this many virtual users
        #[arg(long)]
        vus: Option<u32>,

        /// Run a single constant scenario for this many seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Stop after this many iterations across all VUs
        #[arg(long)]
        iterations: Option<u64>,

        /// Force one driver (full or mixed) on every scenario
        #[arg(long)]
        driver: Option<DriverKind>,

        /// Disable JSON report output
        #[arg(long)]
        no_report: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Generate a starter loadtest config file
    ///
    /// Creates .loadtest/loadtest.toml holding the default scenario.
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

impl Command {
    /// Execute the selected subcommand.
    pub fn execute(self) -> Result<()> {
        match self {
            Command::Run {
                url,
                config,
                vus,
                duration,
                iterations,
                driver,
                no_report,
                no_color,
            } => {
                let runtime = tokio::runtime::Runtime::new()?;
                runtime.block_on(run::execute_run(run::RunOptions {
                    url,
                    config_path: config,
                    vus,
                    duration,
                    iterations,
                    driver,
                    no_report,
                    no_color,
                }))
            },
            Command::Init { force } => init::execute_init(force),
        }
    }
}
