//! Shared JSON-over-HTTPS plumbing for the REST key variants.

use reqwest::RequestBuilder;
use serde_json::Value;

/// Sends a JSON request and returns the JSON body of a 2xx response.
///
/// Failures are flattened into a message; the caller attaches the key
/// identity and direction.
pub(crate) async fn send_json(request: RequestBuilder, body: &Value) -> Result<Value, String> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(format!("HTTP {status}: {}", text.trim()));
    }

    response
        .json()
        .await
        .map_err(|e| format!("invalid response body: {e}"))
}

/// Reads a string field from a JSON object by pointer.
pub(crate) fn string_at<'a>(value: &'a Value, pointer: &str) -> Result<&'a str, String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("response missing {pointer}"))
}
