//! One-time hooks around a run: a health probe before, a duration line after.

use chrono::{DateTime, Utc};

use crate::loadtest::client::BoardClient;

/// State captured by [`setup`] and handed verbatim to [`teardown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunData {
    pub start_time: DateTime<Utc>,
}

/// Log the run banner and probe `/actuator/health`.
///
/// A failed probe only warns; the run goes ahead either way.
pub async fn setup(client: &BoardClient) -> RunData {
    tracing::info!("=== board load test starting ===");
    tracing::info!(base_url = client.base_url(), "target");

    let health = client.health().await;
    if health.status != 200 {
        tracing::warn!(
            status = health.status,
            error = ?health.error,
            "health check failed"
        );
    }

    RunData {
        start_time: Utc::now(),
    }
}

/// Log the total run time and return it in seconds.
pub fn teardown(data: &RunData) -> f64 {
    let elapsed = (Utc::now() - data.start_time).num_milliseconds() as f64 / 1000.0;
    tracing::info!("=== board load test finished ===");
    tracing::info!(elapsed_secs = elapsed, "total run time: {elapsed}s");
    elapsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_measures_from_start_time() {
        let data = RunData {
            start_time: Utc::now() - chrono::Duration::milliseconds(2500),
        };
        let elapsed = teardown(&data);
        assert!((2.5..3.5).contains(&elapsed), "elapsed was {elapsed}");
    }

    #[tokio::test]
    async fn test_setup_continues_when_health_check_fails() {
        let client = BoardClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1",
            std::time::Duration::from_millis(300),
        );
        let before = Utc::now();
        let data = setup(&client).await;
        assert!(data.start_time >= before);
    }
}
