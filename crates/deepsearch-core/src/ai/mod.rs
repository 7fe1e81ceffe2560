//! Streaming text generation backends

pub mod ollama;
pub mod openai;
pub(crate) mod stream;

pub use ollama::OllamaClient;
pub use openai::OpenAIClient;

use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;

use crate::error::GenerationError;
use crate::state::ChatMessage;

/// One incremental unit of streamed output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDelta {
    /// Main reply text; may contain the inline reasoning markers
    Text(String),
    /// Out-of-band reasoning metadata some providers send alongside the text
    Reasoning(String),
}

/// Ordered deltas of one generation call. Ends on completion; an `Err` item is
/// the error signal and is always the last item.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta, GenerationError>> + Send>>;

/// Text generation collaborator.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Model identifier shown to the user
    fn model(&self) -> &str;

    /// Start a streaming completion over the full message history.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<DeltaStream, GenerationError>;
}

const ASSISTANT_INSTRUCTION: &str = "You are a helpful assistant that takes in the web for information and replies to the user with correct answer.";

/// The fixed system instruction every backend sends ahead of the history.
///
/// Without a `reply_language` the model mirrors the user's language.
pub fn system_instruction(reply_language: Option<&str>) -> String {
    match reply_language.map(str::trim).filter(|l| !l.is_empty()) {
        Some(language) => format!("{} Always reply in {}.", ASSISTANT_INSTRUCTION, language),
        None => format!(
            "{} Reply in the same language the user writes in.",
            ASSISTANT_INSTRUCTION
        ),
    }
}
