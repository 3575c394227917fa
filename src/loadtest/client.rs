//! HTTP client for the board REST API.
//!
//! Every call returns an [`HttpResponse`], never an error: transport failures
//! surface as status 0 with a classified [`RequestError`], so callers can run
//! their checks against any outcome without branching on `Result`.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;

use crate::loadtest::error::RequestError;
use crate::loadtest::fixtures::Fixture;
use crate::loadtest::metrics::{Endpoint, RequestSample};

/// Longest response body kept in error classifications and log lines.
pub const MAX_LOGGED_BODY: usize = 200;

/// Outcome of one request against the board API.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub endpoint: Endpoint,
    /// HTTP status, or 0 when no response was received.
    pub status: u16,
    pub body: String,
    /// Time from sending the request until the body was fully read.
    pub duration: Duration,
    /// Set for transport failures and for statuses outside `200..400`.
    pub error: Option<RequestError>,
}

impl HttpResponse {
    /// Build the metrics sample for this response.
    pub fn to_sample(&self) -> RequestSample {
        RequestSample::new(self.endpoint, self.status, self.duration, self.error.clone())
    }

    /// Parse the body as JSON, or `None` if it is not valid JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Identifier of a board, as returned in the `id` field.
///
/// Only truthy ids are accepted: non-zero numbers and non-empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardId(String);

impl BoardId {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()) => {
                Some(Self(n.to_string()))
            },
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            _ => None,
        }
    }

    /// The `id` field of a created board.
    pub fn from_board(board: &Value) -> Option<Self> {
        board.get("id").and_then(Self::from_value)
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of the paged list endpoint.
///
/// Servers answer either with a bare array or with a page object whose
/// `content` field holds the array.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BoardList {
    Bare(Vec<Value>),
    Paged { content: Vec<Value> },
}

impl BoardList {
    /// Parse a list body. Returns `None` for malformed JSON or any other shape.
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }

    pub fn items(&self) -> &[Value] {
        match self {
            Self::Bare(items) | Self::Paged { content: items } => items,
        }
    }

    /// Id of the first board in the list.
    pub fn first_id(&self) -> Option<BoardId> {
        self.items().first().and_then(BoardId::from_board)
    }
}

/// Shorten a body for logs, respecting char boundaries.
pub fn truncate_body(body: &str, max_chars: usize) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Thin board API client. Cloning is cheap; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct BoardClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl BoardClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /api/boards` with the fixture as JSON body.
    pub async fn create_board(&self, fixture: &Fixture) -> HttpResponse {
        let url = format!("{}/api/boards", self.base_url);
        let request = self.http.post(url).json(fixture);
        self.execute(Endpoint::Create, request).await
    }

    /// `GET /api/boards?page={page}&size={size}`
    pub async fn list_boards(&self, page: u32, size: u32) -> HttpResponse {
        let url = format!("{}/api/boards?page={page}&size={size}", self.base_url);
        self.execute(Endpoint::List, self.http.get(url)).await
    }

    /// `GET /api/boards/{id}`
    pub async fn get_board(&self, id: &BoardId) -> HttpResponse {
        let url = format!("{}/api/boards/{id}", self.base_url);
        self.execute(Endpoint::Detail, self.http.get(url)).await
    }

    /// `GET /actuator/health`
    pub async fn health(&self) -> HttpResponse {
        let url = format!("{}/actuator/health", self.base_url);
        self.execute(Endpoint::Health, self.http.get(url)).await
    }

    async fn execute(&self, endpoint: Endpoint, request: reqwest::RequestBuilder) -> HttpResponse {
        let start = Instant::now();
        let (status, body, mut error) = match request.timeout(self.timeout).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.text().await {
                    Ok(body) => (status, body, None),
                    Err(e) => (status, String::new(), Some(RequestError::classify_reqwest(&e))),
                }
            },
            Err(e) => (0, String::new(), Some(RequestError::classify_reqwest(&e))),
        };
        let duration = start.elapsed();

        if error.is_none() && !(200..400).contains(&status) {
            error = Some(RequestError::Http {
                status,
                body: truncate_body(&body, MAX_LOGGED_BODY),
            });
        }

        tracing::debug!(%endpoint, status, elapsed_ms = duration.as_millis() as u64, "request finished");

        HttpResponse {
            endpoint,
            status,
            body,
            duration,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_board_list_bare_array() {
        let list = BoardList::parse(r#"[{"id": 42}, {"id": 43}]"#).unwrap();
        assert!(matches!(list, BoardList::Bare(_)));
        assert_eq!(list.items().len(), 2);
        assert_eq!(list.first_id(), Some(BoardId("42".to_string())));
    }

    #[test]
    fn test_board_list_paged_object() {
        let list = BoardList::parse(r#"{"content": [{"id": 7}], "totalElements": 1}"#).unwrap();
        assert!(matches!(list, BoardList::Paged { .. }));
        assert_eq!(list.first_id().unwrap().to_string(), "7");
    }

    #[test]
    fn test_board_list_empty_page_has_no_id() {
        let list = BoardList::parse(r#"{"content": []}"#).unwrap();
        assert!(list.items().is_empty());
        assert_eq!(list.first_id(), None);
    }

    #[test]
    fn test_board_list_rejects_other_shapes() {
        assert!(BoardList::parse("not json").is_none());
        assert!(BoardList::parse(r#"{"items": []}"#).is_none());
        assert!(BoardList::parse(r#"{"content": null}"#).is_none());
        assert!(BoardList::parse("42").is_none());
    }

    #[test]
    fn test_board_id_truthiness() {
        assert!(BoardId::from_value(&json!(0)).is_none());
        assert!(BoardId::from_value(&json!("")).is_none());
        assert!(BoardId::from_value(&json!(null)).is_none());
        assert!(BoardId::from_value(&json!(false)).is_none());
        assert_eq!(BoardId::from_value(&json!(5)).unwrap().to_string(), "5");
        assert_eq!(BoardId::from_value(&json!("abc")).unwrap().to_string(), "abc");
    }

    #[test]
    fn test_board_id_from_board_missing_field() {
        assert!(BoardId::from_board(&json!({"title": "x"})).is_none());
        assert!(BoardId::from_board(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("short", 10), "short");
        assert_eq!(truncate_body("abcdef", 3), "abc...");
        assert_eq!(truncate_body("가나다라", 2), "가나...");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = BoardClient::new(
            reqwest::Client::new(),
            "http://localhost:8080/",
            Duration::from_secs(1),
        );
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_transport_failure_is_status_zero() {
        let client = BoardClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1",
            Duration::from_millis(500),
        );
        let response = client.health().await;
        assert_eq!(response.status, 0);
        assert!(response.error.is_some());
        assert!(response.to_sample().is_failed());
    }
}
