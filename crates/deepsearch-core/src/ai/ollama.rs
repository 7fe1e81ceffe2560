use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use anyhow::{Result, anyhow};
use tracing::debug;

use super::stream::{decode_deltas, Frame};
use super::{DeltaStream, GenerationProvider, StreamDelta};
use crate::error::{extract_error_message, GenerationError};
use crate::state::ChatMessage;

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaChatChunk {
    message: Option<OllamaChunkMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaChunkMessage {
    #[serde(default)]
    content: String,
    thinking: Option<String>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    system_prompt: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, system_prompt: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            system_prompt,
        }
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list models: {}", response.status()));
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        let model_names: Vec<String> = models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect();

        Ok(model_names)
    }
}

#[async_trait]
impl GenerationProvider for OllamaClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<DeltaStream, GenerationError> {
        let url = format!("{}/api/chat", self.base_url);

        let mut wire = Vec::with_capacity(messages.len() + 1);
        wire.push(OllamaMessage {
            role: "system",
            content: &self.system_prompt,
        });
        wire.extend(messages.iter().map(|m| OllamaMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        let request = OllamaChatRequest {
            model: &self.model,
            messages: wire,
            stream: true,
        };

        debug!(model = %self.model, messages = messages.len(), "starting ollama chat stream");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                GenerationError::Request(format!(
                    "{}. Make sure Ollama is running with: ollama serve",
                    e
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status,
                message: extract_error_message(&text),
            });
        }

        Ok(decode_deltas(response.bytes_stream(), parse_ndjson_line))
    }
}

/// Parse one newline-delimited JSON chunk of an Ollama chat stream.
pub(crate) fn parse_ndjson_line(line: &str) -> Result<Frame, GenerationError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Frame::skip());
    }

    let chunk: OllamaChatChunk = serde_json::from_str(line)
        .map_err(|e| GenerationError::InvalidResponse(format!("invalid Ollama chunk: {}", e)))?;

    if let Some(error) = chunk.error {
        return Err(GenerationError::Stream(error));
    }

    let mut deltas = Vec::new();
    if let Some(message) = chunk.message {
        if let Some(thinking) = message.thinking.filter(|t| !t.is_empty()) {
            deltas.push(StreamDelta::Reasoning(thinking));
        }
        if !message.content.is_empty() {
            deltas.push(StreamDelta::Text(message.content));
        }
    }

    Ok(Frame {
        deltas,
        done: chunk.done,
    })
}
