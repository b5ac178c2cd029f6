//! Shared HTTP plumbing for nodes that call vendor APIs.
//!
//! Every call builds its own client from the credentials in the state;
//! nothing here is cached across runs.

use chaincore::NodeError;
use std::time::Duration;

/// Default timeout for LLM and publishing calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn client(timeout: Duration) -> Result<reqwest::Client, NodeError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| NodeError::Configuration(format!("HTTP client error: {}", e)))
}

/// Send a request and decode a JSON body, mapping transport and HTTP status
/// failures onto `NodeError`.
pub(crate) async fn send_json(
    request: reqwest::RequestBuilder,
    service: &str,
    timeout: Duration,
) -> Result<serde_json::Value, NodeError> {
    let response = request.send().await.map_err(|e| transport_error(e, service, timeout))?;

    let status = response.status();
    let body_text = response
        .text()
        .await
        .map_err(|e| NodeError::ExecutionFailed(format!("{} response unreadable: {}", service, e)))?;

    if !status.is_success() {
        return Err(NodeError::ExecutionFailed(format!(
            "{} returned HTTP {}: {}",
            service,
            status.as_u16(),
            error_message(&body_text)
        )));
    }

    serde_json::from_str(&body_text)
        .map_err(|e| NodeError::ExecutionFailed(format!("{} returned invalid JSON: {}", service, e)))
}

/// Send a request where only the status matters
pub(crate) async fn send_expect_success(
    request: reqwest::RequestBuilder,
    service: &str,
    timeout: Duration,
) -> Result<u16, NodeError> {
    let response = request.send().await.map_err(|e| transport_error(e, service, timeout))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(NodeError::ExecutionFailed(format!(
            "{} returned HTTP {}: {}",
            service,
            status.as_u16(),
            error_message(&body)
        )));
    }
    Ok(status.as_u16())
}

fn transport_error(e: reqwest::Error, service: &str, timeout: Duration) -> NodeError {
    if e.is_timeout() {
        NodeError::Timeout {
            seconds: timeout.as_secs(),
        }
    } else {
        NodeError::ExecutionFailed(format!("{} request failed: {}", service, e))
    }
}

/// Pull a readable message out of common vendor error bodies
fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|json| {
            json.pointer("/error/message")
                .or_else(|| json.get("message"))
                .or_else(|| json.get("error"))
        })
        .map(|v| match v.as_str() {
            Some(s) => s.to_string(),
            None => v.to_string(),
        })
        .unwrap_or_else(|| body.trim().to_string())
}
