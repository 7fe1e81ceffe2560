//! Query dispatcher
//!
//! Owns the per-session state machine (idle → searching → generating → idle)
//! and the message history. One submission runs the search, injects the
//! formatted search context, and hands the augmented history to the
//! generation backend; streamed deltas are appended by a background task.
//!
//! All mutations go through one mutex that is never held across an await.
//! Every submission gets a fresh turn id: starting a new turn aborts the
//! previous stream, and writes from a stale turn are dropped.

use futures_util::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, info, trace, warn};

use crate::ai::{GenerationProvider, StreamDelta};
use crate::config::Config;
use crate::context::format_search_context;
use crate::error::{GenerationError, SearchError};
use crate::search::{SearchProvider, SearchRequest};
use crate::splitter::{split, split_final, ParsedMessage};
use crate::state::{ChatMessage, ChatRole, SessionState};

/// Upper bounds for the two collaborator calls of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub search: Duration,
    /// Covers the whole stream, from request to the last delta
    pub generation: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            search: Duration::from_secs(30),
            generation: Duration::from_secs(60),
        }
    }
}

fn latest_split(messages: &[ChatMessage], streaming: bool) -> Option<ParsedMessage> {
    let message = messages.iter().rev().find(|m| m.role == ChatRole::Assistant)?;
    Some(if streaming {
        split(&message.content)
    } else {
        split_final(&message.content)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank query; nothing changed
    Ignored,
    /// Search failed; `search_error` holds the message
    SearchFailed,
    /// A newer submission took over before this one dispatched
    Superseded,
    /// The generation stream was started
    Dispatched { turn: u64 },
}

/// Point-in-time copy of the session for rendering.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub messages: Vec<ChatMessage>,
    pub turn: u64,
    /// A generation stream is still delivering deltas
    pub streaming: bool,
}

impl SessionSnapshot {
    /// Split of the newest assistant message, if any.
    pub fn latest_answer(&self) -> Option<ParsedMessage> {
        latest_split(&self.messages, self.streaming)
    }

    /// Messages shown as chat bubbles (injected context excluded).
    pub fn visible_messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(|m| m.role != ChatRole::System)
    }
}

struct Session {
    state: SessionState,
    messages: Vec<ChatMessage>,
    turn: u64,
    /// Index of the current turn's assistant message, created on the first delta
    assistant_idx: Option<usize>,
    stream: Option<AbortHandle>,
}

struct Shared {
    search: Arc<dyn SearchProvider>,
    generator: Mutex<Arc<dyn GenerationProvider>>,
    session: Mutex<Session>,
    revision: watch::Sender<u64>,
    timeouts: Timeouts,
}

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Shared>,
}

impl Dispatcher {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        generator: Arc<dyn GenerationProvider>,
        timeouts: Timeouts,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Shared {
                search,
                generator: Mutex::new(generator),
                session: Mutex::new(Session {
                    state: SessionState::default(),
                    messages: Vec::new(),
                    turn: 0,
                    assistant_idx: None,
                    stream: None,
                }),
                revision,
                timeouts,
            }),
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let search = config.build_search()?;
        let generator = config.build_generator(config.provider(), &config.model())?;
        Ok(Self::new(search, generator, config.timeouts()))
    }

    /// Receiver whose value increments on every session mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let session = self.lock();
        SessionSnapshot {
            state: session.state.clone(),
            messages: session.messages.clone(),
            turn: session.turn,
            streaming: session.stream.is_some(),
        }
    }

    pub fn latest_answer(&self) -> Option<ParsedMessage> {
        let session = self.lock();
        latest_split(&session.messages, session.stream.is_some())
    }

    pub fn generator(&self) -> Arc<dyn GenerationProvider> {
        self.inner
            .generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap the generation backend used by future turns.
    pub fn set_generator(&self, generator: Arc<dyn GenerationProvider>) {
        info!(model = generator.model(), "generation backend changed");
        *self
            .inner
            .generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = generator;
        self.notify();
    }

    /// Advance the cosmetic loading indicator.
    pub fn tick(&self) {
        let searching = {
            let mut session = self.lock();
            session.state.tick_loading_dots();
            session.state.is_searching
        };
        if searching {
            self.notify();
        }
    }

    /// Run one turn: search, augment the history, start the generation stream.
    ///
    /// Returns once the stream has been dispatched; deltas keep arriving in the
    /// background. Failures are recorded in the session state, never returned.
    pub async fn submit(&self, query: &str) -> SubmitOutcome {
        if query.trim().is_empty() {
            return SubmitOutcome::Ignored;
        }

        let (turn, request) = {
            let mut session = self.lock();
            session.turn += 1;
            if let Some(previous) = session.stream.take() {
                debug!(turn = session.turn - 1, "aborting superseded stream");
                previous.abort();
            }
            session.assistant_idx = None;
            session.state.begin_turn();
            let request = SearchRequest {
                query: query.to_string(),
                previous_queries: session.state.previous_queries.to_vec(),
            };
            (session.turn, request)
        };
        self.notify();
        info!(turn, query, "turn started");

        let limit = self.inner.timeouts.search;
        let searched = match tokio::time::timeout(limit, self.inner.search.search(&request)).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::Timeout(limit)),
        };

        let results = match searched {
            Ok(results) => results,
            Err(err) => {
                warn!(turn, error = %err, "search failed");
                {
                    let mut session = self.lock();
                    if session.turn != turn {
                        return SubmitOutcome::Superseded;
                    }
                    session.state.search_error = Some(err.to_string());
                    session.state.is_searching = false;
                    session.state.is_generating = false;
                }
                self.notify();
                return SubmitOutcome::SearchFailed;
            }
        };

        let generator = self.generator();
        let messages = {
            let mut session = self.lock();
            if session.turn != turn {
                debug!(turn, "turn superseded during search");
                return SubmitOutcome::Superseded;
            }
            info!(turn, results = results.len(), "search complete");

            let context = format_search_context(&results);
            session.state.search_results = results;
            session.state.is_searching = false;
            session.state.is_generating = true;

            if !context.is_empty() {
                session.messages.push(ChatMessage::system(context));
            }
            session.messages.push(ChatMessage::user(query));
            session.state.previous_queries.push(query);
            session.messages.clone()
        };
        self.notify();

        // The handle is stored under the same lock finish_turn takes, so a
        // fast stream cannot clear it before it is set.
        let mut session = self.lock();
        if session.turn != turn {
            return SubmitOutcome::Superseded;
        }
        let worker = self.clone();
        let task = tokio::spawn(async move {
            worker.run_generation(turn, generator, messages).await;
        });
        session.stream = Some(task.abort_handle());
        debug!(turn, "generation dispatched");
        SubmitOutcome::Dispatched { turn }
    }

    async fn run_generation(
        &self,
        turn: u64,
        generator: Arc<dyn GenerationProvider>,
        messages: Vec<ChatMessage>,
    ) {
        let limit = self.inner.timeouts.generation;
        let error = match tokio::time::timeout(limit, self.consume(turn, generator, messages)).await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(_) => Some(GenerationError::Timeout(limit)),
        };
        self.finish_turn(turn, error);
    }

    async fn consume(
        &self,
        turn: u64,
        generator: Arc<dyn GenerationProvider>,
        messages: Vec<ChatMessage>,
    ) -> Result<(), GenerationError> {
        let mut stream = generator.stream(&messages).await?;
        debug!(turn, model = generator.model(), "generation stream opened");

        while let Some(delta) = stream.next().await {
            match delta? {
                StreamDelta::Text(text) => {
                    if !self.append_delta(turn, &text) {
                        return Ok(());
                    }
                }
                StreamDelta::Reasoning(text) => {
                    trace!(turn, len = text.len(), "ignoring out-of-band reasoning frame");
                }
            }
        }
        Ok(())
    }

    /// Append streamed text to the turn's assistant message. Returns false when
    /// the turn has been superseded.
    fn append_delta(&self, turn: u64, text: &str) -> bool {
        {
            let mut guard = self.lock();
            let session = &mut *guard;
            if session.turn != turn {
                return false;
            }

            let idx = match session.assistant_idx {
                Some(idx) => idx,
                None => {
                    session.messages.push(ChatMessage::assistant(String::new()));
                    let idx = session.messages.len() - 1;
                    session.assistant_idx = Some(idx);
                    idx
                }
            };

            let Some(message) = session.messages.get_mut(idx) else {
                return false;
            };
            message.content.push_str(text);

            // Latched: once the answer is complete it stays complete for the turn
            if session.state.is_generating && split(&message.content).is_complete {
                debug!(turn, "answer complete");
                session.state.is_generating = false;
            }
        }
        self.notify();
        true
    }

    fn finish_turn(&self, turn: u64, error: Option<GenerationError>) {
        {
            let mut session = self.lock();
            if session.turn != turn {
                return;
            }
            session.stream = None;
            session.state.is_generating = false;
            match error {
                Some(err) => {
                    warn!(turn, error = %err, "generation failed");
                    session.state.generation_error = Some(err.to_string());
                }
                None => {
                    let chars = session
                        .assistant_idx
                        .and_then(|idx| session.messages.get(idx))
                        .map(|m| m.content.chars().count())
                        .unwrap_or(0);
                    info!(turn, chars, "generation finished");
                }
            }
        }
        self.notify();
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.inner.revision.send_modify(|rev| *rev += 1);
    }
}
