use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::stream::{decode_deltas, Frame};
use super::{DeltaStream, GenerationProvider, StreamDelta};
use crate::error::{extract_error_message, json_error_message, GenerationError};
use crate::state::ChatMessage;

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAIChunk {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    #[serde(default)]
    delta: OpenAIDelta,
}

#[derive(Deserialize, Default)]
struct OpenAIDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
}

/// Client for OpenAI-compatible chat completion APIs (OpenAI, Fireworks, ...).
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
}

impl OpenAIClient {
    pub fn new(base_url: &str, api_key: &str, model: &str, system_prompt: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            system_prompt,
        }
    }
}

#[async_trait]
impl GenerationProvider for OpenAIClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<DeltaStream, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut wire = Vec::with_capacity(messages.len() + 1);
        wire.push(OpenAIMessage {
            role: "system",
            content: &self.system_prompt,
        });
        wire.extend(messages.iter().map(|m| OpenAIMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        let request = OpenAIRequest {
            model: &self.model,
            messages: wire,
            stream: true,
        };

        debug!(model = %self.model, messages = messages.len(), "starting chat completion stream");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status,
                message: extract_error_message(&text),
            });
        }

        Ok(decode_deltas(response.bytes_stream(), parse_sse_line))
    }
}

/// Parse one Server-Sent Events line of a chat completion stream.
pub(crate) fn parse_sse_line(line: &str) -> Result<Frame, GenerationError> {
    let line = line.trim();

    // Blank separators, comments, and event/id fields carry no content
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(Frame::skip());
    };
    let data = data.trim_start();

    if data == "[DONE]" {
        return Ok(Frame::done());
    }

    let json: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| GenerationError::InvalidResponse(format!("invalid SSE JSON: {}", e)))?;

    if json.get("error").is_some() {
        let message = json_error_message(&json).unwrap_or_else(|| data.to_string());
        return Err(GenerationError::Stream(message));
    }

    let chunk: OpenAIChunk = serde_json::from_value(json)
        .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

    let mut deltas = Vec::new();
    if let Some(choice) = chunk.choices.into_iter().next() {
        if let Some(reasoning) = choice.delta.reasoning_content.filter(|r| !r.is_empty()) {
            deltas.push(StreamDelta::Reasoning(reasoning));
        }
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            deltas.push(StreamDelta::Text(content));
        }
    }

    Ok(Frame {
        deltas,
        done: false,
    })
}
