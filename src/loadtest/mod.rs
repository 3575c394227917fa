//! HTTP load testing engine for the board REST API.
//!
//! Provides typed TOML configuration with k6-style scenarios, a board API
//! client, request drivers with checks, HdrHistogram-based metrics,
//! threshold evaluation, a live terminal display and JSON reports.

pub mod checks;
pub mod client;
pub mod config;
pub mod display;
pub mod driver;
pub mod engine;
pub mod error;
pub mod fixtures;
pub mod lifecycle;
pub mod metrics;
pub mod report;
pub mod summary;
pub mod thresholds;
pub mod vu;
