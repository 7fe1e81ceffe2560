//! UI-agnostic session state types
//!
//! This module contains the data structures shared by every front end (the
//! terminal UI, the one-shot `ask` command) and doesn't depend on any specific
//! UI framework.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::search::SearchResult;

/// How many raw queries are remembered and forwarded to the search backend.
pub const MAX_PREVIOUS_QUERIES: usize = 3;

/// A chat message in the conversation sent to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

/// The role of a chat message sender
///
/// `System` messages carry injected search context and are never rendered as
/// chat bubbles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// Fixed-capacity FIFO of the most recent raw queries, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentQueries {
    queries: VecDeque<String>,
}

impl RecentQueries {
    pub fn push(&mut self, query: impl Into<String>) {
        if self.queries.len() == MAX_PREVIOUS_QUERIES {
            self.queries.pop_front();
        }
        self.queries.push_back(query.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.queries.iter()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.queries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// Per-session state observed by the rendering layer.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub is_searching: bool,
    pub is_generating: bool,
    pub search_results: Vec<SearchResult>,
    pub search_error: Option<String>,
    pub generation_error: Option<String>,
    pub previous_queries: RecentQueries,
    /// Cosmetic counter (0..=3) for the "Searching..." indicator
    pub loading_dots: u8,
}

impl SessionState {
    /// Reset everything except `previous_queries` and enter the searching phase.
    pub fn begin_turn(&mut self) {
        self.is_searching = true;
        self.is_generating = false;
        self.search_results.clear();
        self.search_error = None;
        self.generation_error = None;
        self.loading_dots = 0;
    }

    pub fn tick_loading_dots(&mut self) {
        if self.is_searching {
            self.loading_dots = (self.loading_dots + 1) % 4;
        }
    }

    pub fn loading_indicator(&self) -> String {
        ".".repeat(self.loading_dots as usize)
    }

    pub fn is_busy(&self) -> bool {
        self.is_searching || self.is_generating
    }
}
