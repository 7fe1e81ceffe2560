use std::time::Duration;
use thiserror::Error;

/// Failure of the web search collaborator. Fatal to the current turn.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search failed: {0}")]
    Request(String),

    #[error("Search failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Search failed: timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("Search failed: invalid response ({0})")]
    InvalidResponse(String),

    #[error("Search failed: {0} API key not configured")]
    MissingApiKey(&'static str),
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        SearchError::Request(err.to_string())
    }
}

/// Failure of the text generation collaborator, before or during streaming.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    Request(String),

    #[error("Generation failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Generation stream error: {0}")]
    Stream(String),

    #[error("Generation timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("Invalid generation response: {0}")]
    InvalidResponse(String),

    #[error("{0} API key not configured")]
    MissingApiKey(&'static str),
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        GenerationError::Request(err.to_string())
    }
}

/// Pull a human readable message out of a provider error body.
///
/// Handles `{"error": {"message": ..}}`, `{"error": ".."}` and `{"message": ..}`,
/// falling back to the (truncated) raw body.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = json_error_message(&json) {
            return message;
        }
    }
    let trimmed = body.trim();
    if trimmed.chars().count() > 200 {
        format!("{}...", trimmed.chars().take(200).collect::<String>())
    } else {
        trimmed.to_string()
    }
}

pub(crate) fn json_error_message(json: &serde_json::Value) -> Option<String> {
    match json.get("error") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(obj @ serde_json::Value::Object(_)) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .or_else(|| Some(obj.to_string())),
        _ => json
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
    }
}
