//! End-to-end engine runs against a mocked board API.

use std::collections::BTreeMap;

use mockito::{Matcher, ServerGuard};

use board_loadtest::loadtest::config::{
    DriverKind, Executor, LoadTestConfig, ScenarioConfig, Settings, Stage, ThinkTime,
};
use board_loadtest::loadtest::engine::LoadTestEngine;
use board_loadtest::loadtest::metrics::Endpoint;
use board_loadtest::loadtest::report::LoadTestReport;
use board_loadtest::loadtest::summary::render_summary;

async fn healthy_board_api() -> ServerGuard {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/actuator/health")
        .with_status(200)
        .with_body(r#"{"status":"UP"}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/api/boards")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":42}"#)
        .expect_at_least(1)
        .create_async()
        .await;
    server
        .mock("GET", "/api/boards")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"content":[{"id":42}]}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/api/boards/42")
        .with_status(200)
        .with_body(r#"{"id":42}"#)
        .create_async()
        .await;
    server
}

fn fast_settings(server: &ServerGuard) -> Settings {
    Settings {
        base_url: server.url(),
        timeout_ms: 2000,
        write_ratio: 0.2,
        think_time: Some(ThinkTime {
            min_ms: 0,
            max_ms: 20,
        }),
    }
}

fn default_thresholds() -> BTreeMap<String, Vec<String>> {
    LoadTestConfig::default().thresholds
}

#[tokio::test]
async fn constant_run_against_healthy_api_passes_thresholds() {
    let server = healthy_board_api().await;
    let config = LoadTestConfig {
        settings: fast_settings(&server),
        scenario: vec![ScenarioConfig {
            name: "smoke".to_string(),
            start_time_secs: 0,
            driver: DriverKind::Full,
            executor: Executor::ConstantVus {
                vus: 2,
                duration_secs: 2,
            },
        }],
        thresholds: default_thresholds(),
    };

    let engine = LoadTestEngine::new(config).with_no_color(true);
    let result = engine.run().await.unwrap();
    let snap = &result.snapshot;

    assert!(snap.iterations > 0);
    assert!(snap.total_requests >= snap.iterations * 3);
    assert_eq!(snap.failed_requests, 0);
    assert_eq!(snap.errors_failed, 0);
    assert_eq!(result.final_active_vus, 0);
    assert!(result.passed(), "thresholds: {:?}", result.thresholds);
    assert!(snap
        .per_endpoint
        .iter()
        .all(|e| e.endpoint != Endpoint::Health));

    let summary = render_summary(&result, engine.config());
    assert!(summary.contains("http_req_duration"));

    let report = LoadTestReport::from_result(&result, engine.config());
    assert!(report.passed);
}

#[tokio::test]
async fn iteration_cap_stops_the_run_early() {
    let server = healthy_board_api().await;
    let config = LoadTestConfig {
        settings: fast_settings(&server),
        scenario: vec![ScenarioConfig {
            name: "capped".to_string(),
            start_time_secs: 0,
            driver: DriverKind::Mixed,
            executor: Executor::ConstantVus {
                vus: 3,
                duration_secs: 60,
            },
        }],
        thresholds: BTreeMap::new(),
    };

    let result = LoadTestEngine::new(config)
        .with_iterations(12)
        .with_no_color(true)
        .run()
        .await
        .unwrap();

    assert!(result.snapshot.iterations <= 12);
    assert!(result.snapshot.iterations > 0);
    assert!(result.elapsed.as_secs() < 30, "run should stop on the cap");
}

#[tokio::test]
async fn ramping_and_delayed_scenarios_both_run() {
    let server = healthy_board_api().await;
    let config = LoadTestConfig {
        settings: fast_settings(&server),
        scenario: vec![
            ScenarioConfig {
                name: "ramp".to_string(),
                start_time_secs: 0,
                driver: DriverKind::Full,
                executor: Executor::RampingVus {
                    start_vus: 1,
                    stages: vec![
                        Stage {
                            duration_secs: 1,
                            target_vus: 3,
                        },
                        Stage {
                            duration_secs: 1,
                            target_vus: 0,
                        },
                    ],
                },
            },
            ScenarioConfig {
                name: "late".to_string(),
                start_time_secs: 1,
                driver: DriverKind::Mixed,
                executor: Executor::ConstantVus {
                    vus: 1,
                    duration_secs: 1,
                },
            },
        ],
        thresholds: BTreeMap::new(),
    };

    let result = LoadTestEngine::new(config)
        .with_no_color(true)
        .run()
        .await
        .unwrap();

    assert!(result.snapshot.iterations > 0);
    assert!(result.elapsed.as_secs_f64() >= 2.0);
    assert_eq!(result.final_active_vus, 0);
    assert!(result.thresholds.is_empty());
}

#[tokio::test]
async fn failing_api_fails_thresholds() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/boards")
        .with_status(500)
        .create_async()
        .await;
    server
        .mock("GET", Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let config = LoadTestConfig {
        settings: fast_settings(&server),
        scenario: vec![ScenarioConfig {
            name: "broken".to_string(),
            start_time_secs: 0,
            driver: DriverKind::Full,
            executor: Executor::ConstantVus {
                vus: 1,
                duration_secs: 1,
            },
        }],
        thresholds: default_thresholds(),
    };

    let result = LoadTestEngine::new(config)
        .with_no_color(true)
        .run()
        .await
        .unwrap();

    assert!(!result.passed());
    assert_eq!(result.snapshot.failed_requests, result.snapshot.total_requests);
    assert_eq!(result.snapshot.status_counts.get(&500).copied(), Some(result.snapshot.iterations));
    let failed: Vec<_> = result
        .thresholds
        .iter()
        .filter(|t| !t.passed)
        .map(|t| t.metric.to_string())
        .collect();
    assert!(failed.contains(&"http_req_failed".to_string()));
    assert!(failed.contains(&"errors".to_string()));
}
