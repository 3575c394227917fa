//! TOML-based load test scenario configuration.
//!
//! A config declares one or more named scenarios. Each scenario either holds a
//! constant number of virtual users for a fixed duration, or ramps through an
//! ordered list of `(duration, target)` stages. Scenarios may be offset with
//! `start_time_secs` so that one begins after another finishes, and each one
//! picks the request driver its virtual users run.
//!
//! # Example TOML
//!
//! ```toml
//! [settings]
//! base_url = "http://localhost:8080"
//! timeout_ms = 10000
//! write_ratio = 0.2
//!
//! [[scenario]]
//! name = "ramping_load"
//! executor = "ramping-vus"
//! driver = "full"
//! start_vus = 1
//! stages = [
//!     { duration_secs = 30, target_vus = 10 },
//!     { duration_secs = 30, target_vus = 0 },
//! ]
//!
//! [[scenario]]
//! name = "constant_load"
//! executor = "constant-vus"
//! driver = "mixed"
//! vus = 50
//! duration_secs = 180
//! start_time_secs = 60
//!
//! [thresholds]
//! http_req_duration = ["p(95)<500"]
//! http_req_failed = ["rate<0.05"]
//! errors = ["rate<0.05"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::loadtest::error::LoadTestError;
use crate::loadtest::thresholds::ThresholdSet;

/// Base URL of the board service when neither the config nor the CLI names one.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// A load-shaping stage defining a target VU count and duration.
///
/// The engine linearly ramps the VU count from the previous target to
/// `target_vus` over the stage's `duration_secs`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Stage {
    /// Duration of this stage in seconds.
    pub duration_secs: u64,
    /// Target number of virtual users at the end of this stage.
    pub target_vus: u32,
}

/// Which entry behavior the virtual users of a scenario run each iteration.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Create, list, then fetch the created board.
    #[default]
    Full,
    /// Either a single create or a list followed by a detail fetch.
    Mixed,
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::Mixed => f.write_str("mixed"),
        }
    }
}

impl FromStr for DriverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "mixed" => Ok(Self::Mixed),
            other => Err(format!("unknown driver '{other}' (expected 'full' or 'mixed')")),
        }
    }
}

/// How a scenario schedules its virtual users over time.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "executor", rename_all = "kebab-case")]
pub enum Executor {
    /// A fixed number of VUs for a fixed duration.
    ConstantVus { vus: u32, duration_secs: u64 },
    /// Start with `start_vus` and walk the stages in order.
    RampingVus {
        #[serde(default = "default_start_vus")]
        start_vus: u32,
        stages: Vec<Stage>,
    },
}

fn default_start_vus() -> u32 {
    1
}

/// A named scenario: executor, start offset and driver selection.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScenarioConfig {
    /// Name shown in logs, the live display and the report.
    pub name: String,
    /// Delay from the start of the run before this scenario begins.
    #[serde(default)]
    pub start_time_secs: u64,
    #[serde(default)]
    pub driver: DriverKind,
    #[serde(flatten)]
    pub executor: Executor,
}

impl ScenarioConfig {
    /// Length of the scenario itself, excluding its start offset.
    pub fn duration_secs(&self) -> u64 {
        match &self.executor {
            Executor::ConstantVus { duration_secs, .. } => *duration_secs,
            Executor::RampingVus { stages, .. } => stages
                .iter()
                .map(|s| s.duration_secs)
                .fold(0, u64::saturating_add),
        }
    }

    /// Seconds from the start of the run until this scenario finishes.
    pub fn end_secs(&self) -> u64 {
        self.start_time_secs.saturating_add(self.duration_secs())
    }

    /// Highest VU count this scenario ever asks for.
    pub fn max_vus(&self) -> u32 {
        match &self.executor {
            Executor::ConstantVus { vus, .. } => *vus,
            Executor::RampingVus { start_vus, stages } => stages
                .iter()
                .map(|s| s.target_vus)
                .fold(*start_vus, u32::max),
        }
    }
}

/// Inclusive bounds of the random pause between iterations.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ThinkTime {
    pub min_ms: u64,
    pub max_ms: u64,
}

/// General settings shared by every scenario.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Target board service, e.g. `http://localhost:8080`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Probability that a mixed-driver iteration is a write.
    #[serde(default = "default_write_ratio")]
    pub write_ratio: f64,
    /// Overrides the per-driver think time when set.
    #[serde(default)]
    pub think_time: Option<ThinkTime>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_write_ratio() -> f64 {
    0.2
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            write_ratio: default_write_ratio(),
            think_time: None,
        }
    }
}

impl Settings {
    /// Convert the `timeout_ms` field to a [`Duration`].
    pub fn timeout_as_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Top-level load test configuration parsed from a TOML file.
///
/// The field name is `scenario` (not `scenarios`) because TOML
/// `[[scenario]]` array-of-tables syntax creates a key called `scenario`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoadTestConfig {
    #[serde(default)]
    pub settings: Settings,
    pub scenario: Vec<ScenarioConfig>,
    /// Metric name to threshold expressions, e.g. `errors = ["rate<0.05"]`.
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,
}

impl Default for LoadTestConfig {
    /// The stock board scenario: a ramp to 100 VUs followed by a 50-VU plateau.
    fn default() -> Self {
        let stages = [(30, 10), (60, 50), (120, 100), (60, 100), (30, 0)]
            .into_iter()
            .map(|(duration_secs, target_vus)| Stage {
                duration_secs,
                target_vus,
            })
            .collect();

        let mut thresholds = BTreeMap::new();
        thresholds.insert("http_req_duration".to_string(), vec!["p(95)<500".to_string()]);
        thresholds.insert("http_req_failed".to_string(), vec!["rate<0.05".to_string()]);
        thresholds.insert("errors".to_string(), vec!["rate<0.05".to_string()]);

        Self {
            settings: Settings::default(),
            scenario: vec![
                ScenarioConfig {
                    name: "ramping_load".to_string(),
                    start_time_secs: 0,
                    driver: DriverKind::Full,
                    executor: Executor::RampingVus {
                        start_vus: 1,
                        stages,
                    },
                },
                ScenarioConfig {
                    name: "constant_load".to_string(),
                    start_time_secs: 300,
                    driver: DriverKind::Full,
                    executor: Executor::ConstantVus {
                        vus: 50,
                        duration_secs: 180,
                    },
                },
            ],
            thresholds,
        }
    }
}

impl LoadTestConfig {
    /// Parse a TOML string into a validated [`LoadTestConfig`].
    ///
    /// Returns an error if the TOML is malformed or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, LoadTestError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a [`LoadTestConfig`] from a file path.
    ///
    /// Returns [`LoadTestError::ConfigIo`] if the file cannot be read,
    /// [`LoadTestError::ConfigParse`] if the TOML is malformed, or
    /// [`LoadTestError::ConfigValidation`] if validation fails.
    pub fn load(path: &Path) -> Result<Self, LoadTestError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadTestError::ConfigIo {
            source,
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Seconds from the start of the run until the last scenario ends.
    pub fn effective_duration_secs(&self) -> u64 {
        self.scenario
            .iter()
            .map(ScenarioConfig::end_secs)
            .max()
            .unwrap_or(0)
    }

    /// Highest number of VUs that can be alive at once.
    ///
    /// A scenario occupies `[start_time_secs, end_secs)` at its `max_vus`.
    /// The peak is taken at scenario start points, where the concurrent
    /// total can only rise. Summed in `u64` so large configs cannot overflow.
    pub fn peak_vus(&self) -> u64 {
        self.scenario
            .iter()
            .map(|at| {
                self.scenario
                    .iter()
                    .filter(|s| {
                        s.start_time_secs <= at.start_time_secs
                            && at.start_time_secs < s.end_secs()
                    })
                    .map(|s| u64::from(s.max_vus()))
                    .fold(0u64, u64::saturating_add)
            })
            .max()
            .unwrap_or(0)
    }

    /// Parse the `[thresholds]` table.
    pub fn threshold_set(&self) -> Result<ThresholdSet, LoadTestError> {
        ThresholdSet::from_config(&self.thresholds)
    }

    /// Replace every scenario with a single constant-VU scenario.
    ///
    /// Used by the `--vus`/`--duration` flags. The driver of the first
    /// existing scenario is kept.
    pub fn replace_with_constant(&mut self, vus: u32, duration_secs: u64) {
        let driver = self
            .scenario
            .first()
            .map(|s| s.driver)
            .unwrap_or_default();
        self.scenario = vec![ScenarioConfig {
            name: "cli_override".to_string(),
            start_time_secs: 0,
            driver,
            executor: Executor::ConstantVus { vus, duration_secs },
        }];
    }

    /// Force every scenario onto the same driver.
    pub fn force_driver(&mut self, driver: DriverKind) {
        for scenario in &mut self.scenario {
            scenario.driver = driver;
        }
    }

    /// Validate that the config is semantically correct.
    ///
    /// Checks:
    /// - At least one scenario is defined and names are unique and non-empty
    /// - Constant scenarios have `vus > 0` and `duration_secs > 0`
    /// - Ramping scenarios have at least one stage, each with `duration_secs > 0`
    /// - `write_ratio` lies in `[0, 1]` and think-time bounds are ordered
    /// - `base_url` parses as a URL and every threshold parses
    pub fn validate(&self) -> Result<(), LoadTestError> {
        let invalid = |message: String| Err(LoadTestError::ConfigValidation { message });

        if self.scenario.is_empty() {
            return invalid("Config must contain at least one [[scenario]] block".to_string());
        }

        let mut seen = HashSet::new();
        for scenario in &self.scenario {
            if scenario.name.trim().is_empty() {
                return invalid("Scenario names must not be empty".to_string());
            }
            if !seen.insert(scenario.name.as_str()) {
                return invalid(format!("Duplicate scenario name '{}'", scenario.name));
            }

            match &scenario.executor {
                Executor::ConstantVus { vus, duration_secs } => {
                    if *vus == 0 {
                        return invalid(format!("Scenario '{}' has vus=0", scenario.name));
                    }
                    if *duration_secs == 0 {
                        return invalid(format!(
                            "Scenario '{}' has duration_secs=0",
                            scenario.name
                        ));
                    }
                },
                Executor::RampingVus { stages, .. } => {
                    if stages.is_empty() {
                        return invalid(format!(
                            "Scenario '{}' uses ramping-vus but defines no stages",
                            scenario.name
                        ));
                    }
                    if let Some(i) = stages.iter().position(|s| s.duration_secs == 0) {
                        return invalid(format!(
                            "Scenario '{}' stage {} has duration_secs=0; each stage must have a positive duration",
                            scenario.name,
                            i + 1
                        ));
                    }
                },
            }
        }

        if !(0.0..=1.0).contains(&self.settings.write_ratio) {
            return invalid(format!(
                "settings.write_ratio={} must be between 0 and 1",
                self.settings.write_ratio
            ));
        }

        if let Some(think) = self.settings.think_time {
            if think.min_ms > think.max_ms {
                return invalid(format!(
                    "settings.think_time min_ms={} exceeds max_ms={}",
                    think.min_ms, think.max_ms
                ));
            }
        }

        if let Err(e) = reqwest::Url::parse(&self.settings.base_url) {
            return invalid(format!(
                "settings.base_url '{}' is not a valid URL: {e}",
                self.settings.base_url
            ));
        }

        self.threshold_set()?;

        Ok(())
    }
}
