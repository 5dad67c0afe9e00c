//! Client for the remote answer service: one JSON POST per user turn.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct AnswerRequest<'a> {
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnswerResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Every way a turn can fail. All of them end in the same apology in the
/// transcript; the variants exist for logging.
#[derive(Debug, Clone, Error)]
pub enum AnswerError {
    #[error("request failed: {0}")]
    Transport(#[source] Arc<reqwest::Error>),
    #[error("answer service returned status {0}")]
    Status(StatusCode),
    #[error("answer service reported an error: {0}")]
    Service(String),
    #[error("malformed answer payload: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for AnswerError {
    fn from(err: reqwest::Error) -> Self {
        AnswerError::Transport(Arc::new(err))
    }
}

#[derive(Debug, Clone)]
pub struct AnswerClient {
    endpoint: String,
    client: reqwest::Client,
}

impl AnswerClient {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, AnswerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one message and return the answer text. Exactly one request is
    /// made; there is no retry.
    pub async fn ask(&self, message: &str) -> Result<String, AnswerError> {
        debug!(endpoint = %self.endpoint, len = message.len(), "asking answer service");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&AnswerRequest { message })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "answer service returned non-success status");
            return Err(AnswerError::Status(status));
        }

        let body = response.text().await?;
        parse_answer(&body)
    }

    /// [`ask`](Self::ask), then hold the outcome back for `reveal` so the
    /// answer fades in after the working indicator.
    pub async fn ask_revealed(
        &self,
        message: &str,
        reveal: Duration,
    ) -> Result<String, AnswerError> {
        let outcome = self.ask(message).await;
        tokio::time::sleep(reveal).await;
        outcome
    }
}

fn parse_answer(body: &str) -> Result<String, AnswerError> {
    let payload: AnswerResponse =
        serde_json::from_str(body).map_err(|e| AnswerError::Malformed(e.to_string()))?;

    if let Some(error) = payload.error {
        return Err(AnswerError::Service(error));
    }

    payload
        .response
        .ok_or_else(|| AnswerError::Malformed("missing `response` field".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client_for(server: &MockServer) -> AnswerClient {
        AnswerClient::new(server.url("/ask"), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn returns_response_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/ask")
                    .json_body(json!({ "message": "What is a SARL?" }));
                then.status(200)
                    .json_body(json!({ "response": "A **limited** company." }));
            })
            .await;

        let answer = client_for(&server).ask("What is a SARL?").await.unwrap();

        assert_eq!(answer, "A **limited** company.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_field_is_a_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/ask");
                then.status(200).json_body(json!({ "error": "model offline" }));
            })
            .await;

        let err = client_for(&server).ask("hi").await.unwrap_err();

        match err {
            AnswerError::Service(message) => assert_eq!(message, "model offline"),
            other => panic!("unexpected error variant {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_success_status_is_a_failure() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/ask");
                then.status(503).body("unavailable");
            })
            .await;

        let err = client_for(&server).ask("hi").await.unwrap_err();

        assert!(matches!(err, AnswerError::Status(s) if s == StatusCode::SERVICE_UNAVAILABLE));
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_failure() {
        let client =
            AnswerClient::new("http://127.0.0.1:9/ask".to_string(), Duration::from_secs(2)).unwrap();

        let err = client.ask("hi").await.unwrap_err();

        assert!(matches!(err, AnswerError::Transport(_)));
    }

    #[test]
    fn body_without_answer_is_malformed() {
        assert!(matches!(parse_answer("{}"), Err(AnswerError::Malformed(_))));
        assert!(matches!(parse_answer("not json"), Err(AnswerError::Malformed(_))));
    }

    #[test]
    fn error_field_wins_over_response() {
        let body = r#"{ "response": "ok", "error": "boom" }"#;
        assert!(matches!(parse_answer(body), Err(AnswerError::Service(_))));
    }

    #[tokio::test]
    async fn revealed_outcome_waits_for_the_delay() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/ask");
                then.status(502);
            })
            .await;
        let client = client_for(&server);
        let reveal = Duration::from_millis(200);

        let started = std::time::Instant::now();
        let outcome = client.ask_revealed("late?", reveal).await;

        assert!(started.elapsed() >= reveal);
        assert!(matches!(outcome, Err(AnswerError::Status(status)) if status.as_u16() == 502));
    }
}
