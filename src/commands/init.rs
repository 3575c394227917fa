//! `board-loadtest init` command implementation.

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Execute the `init` command.
///
/// Creates `.loadtest/loadtest.toml` in the current directory holding the
/// default scenario. Refuses to overwrite an existing file unless `force`.
pub fn execute_init(force: bool) -> Result<()> {
    let path = write_template(&std::env::current_dir()?, force)?;
    eprintln!("Created {}", path.display());
    eprintln!("Edit the file to customize your load test scenario.");
    Ok(())
}

fn write_template(base_dir: &Path, force: bool) -> Result<PathBuf> {
    let config_dir = base_dir.join(".loadtest");
    let config_path = config_dir.join("loadtest.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}\n\
             Use `--force` to overwrite.",
            config_path.display()
        );
    }

    std::fs::create_dir_all(&config_dir)?;
    std::fs::write(&config_path, generate_default_template())?;
    Ok(config_path)
}

/// Generate the default TOML config template.
///
/// Mirrors `LoadTestConfig::default()`: a ramp to 100 VUs, a 50-VU plateau
/// starting at five minutes, and the standard thresholds.
fn generate_default_template() -> String {
    r#"# Board API load test configuration
# Docs: board-loadtest run --help

[settings]
base_url = "http://localhost:8080"
timeout_ms = 10000
# Share of mixed-driver iterations that create a board
write_ratio = 0.2
# Uncomment to override the per-driver pause between iterations
# think_time = { min_ms = 0, max_ms = 2000 }

# Ramp 1 -> 10 -> 50 -> 100 VUs, hold, then ramp down
[[scenario]]
name = "ramping_load"
executor = "ramping-vus"
driver = "full"
start_vus = 1
stages = [
    { duration_secs = 30, target_vus = 10 },
    { duration_secs = 60, target_vus = 50 },
    { duration_secs = 120, target_vus = 100 },
    { duration_secs = 60, target_vus = 100 },
    { duration_secs = 30, target_vus = 0 },
]

# Steady 50 VUs for 3 minutes, starting 5 minutes in
[[scenario]]
name = "constant_load"
executor = "constant-vus"
driver = "full"
start_time_secs = 300
vus = 50
duration_secs = 180

[thresholds]
http_req_duration = ["p(95)<500"]
http_req_failed = ["rate<0.05"]
errors = ["rate<0.05"]
"#
    .to_string()
}
