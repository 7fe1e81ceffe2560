pub mod ai;
pub mod citations;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod provider;
pub mod search;
pub mod splitter;
pub mod state;

// Re-export main types for convenience
pub use ai::{DeltaStream, GenerationProvider, OllamaClient, OpenAIClient, StreamDelta};
pub use citations::extract_citations;
pub use config::Config;
pub use context::format_search_context;
pub use dispatcher::{Dispatcher, SessionSnapshot, SubmitOutcome, Timeouts};
pub use error::{GenerationError, SearchError};
pub use provider::Provider;
pub use search::{SearchProvider, SearchRequest, SearchResult};
pub use splitter::{split, split_final, ParsedMessage};
pub use state::{ChatMessage, ChatRole, SessionState};
