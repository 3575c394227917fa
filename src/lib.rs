//! # board-loadtest
//!
//! A k6-style HTTP load test for a board REST API (`/api/boards`).
//!
//! Virtual users create, list and fetch boards according to one or more
//! scenarios, every response is checked, and the run ends with a summary
//! and threshold verdict. See [`loadtest::engine::LoadTestEngine`] for the
//! entry point.

pub mod loadtest;
