use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use std::path::PathBuf;
use tracing::{info, warn};

use deepsearch_core::ai::OllamaClient;
use deepsearch_core::{extract_citations, Config, Dispatcher, ParsedMessage, Provider, SessionSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Input,
    Sources,
    Thinking,
    Answer,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    // Query input
    pub query_input: String,
    pub query_cursor: usize, // cursor position in chars

    // Session
    pub dispatcher: Dispatcher,
    pub snapshot: SessionSnapshot,
    pub answer: Option<ParsedMessage>,
    pub cited: Vec<usize>,

    // Panels
    pub show_sources: bool,
    pub show_thinking: bool,
    pub sources_state: ListState,
    pub thinking_scroll: u16,
    pub answer_scroll: u16,
    /// Keep the answer pinned to its last line while it streams
    pub follow_answer: bool,
    pub thinking_height: u16,
    pub thinking_width: u16,
    pub answer_height: u16,
    pub answer_width: u16,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Model picker state
    pub show_model_picker: bool,
    pub available_models: Vec<String>,
    pub model_picker_state: ListState,

    // Transient footer message (copy confirmations, picker errors)
    pub status_message: Option<String>,

    // Panel areas for mouse hit-testing (updated during render)
    pub sources_area: Option<Rect>,
    pub thinking_area: Option<Rect>,
    pub answer_area: Option<Rect>,

    pub config: Config,
    pub config_path: PathBuf,
    pub current_provider: Provider,
    pub selected_model: String,
}

impl App {
    pub fn new(dispatcher: Dispatcher, config: Config, config_path: PathBuf) -> Self {
        let current_provider = config.provider();
        let selected_model = dispatcher.generator().model().to_string();
        let snapshot = dispatcher.snapshot();

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            focus: FocusPane::Input,

            query_input: String::new(),
            query_cursor: 0,

            dispatcher,
            snapshot,
            answer: None,
            cited: Vec::new(),

            show_sources: true,
            show_thinking: true,
            sources_state: ListState::default(),
            thinking_scroll: 0,
            answer_scroll: 0,
            follow_answer: true,
            thinking_height: 0,
            thinking_width: 0,
            answer_height: 0,
            answer_width: 0,

            animation_frame: 0,

            show_model_picker: false,
            available_models: Vec::new(),
            model_picker_state: ListState::default(),

            status_message: None,

            sources_area: None,
            thinking_area: None,
            answer_area: None,

            config,
            config_path,
            current_provider,
            selected_model,
        }
    }

    /// Pull the latest session state from the dispatcher.
    pub fn refresh(&mut self) {
        self.snapshot = self.dispatcher.snapshot();
        self.answer = self.snapshot.latest_answer();
        self.cited = match &self.answer {
            Some(answer) => extract_citations(
                &answer.final_response,
                self.snapshot.state.search_results.len(),
            ),
            None => Vec::new(),
        };

        let len = self.snapshot.state.search_results.len();
        match self.sources_state.selected() {
            _ if len == 0 => self.sources_state.select(None),
            Some(i) if i >= len => self.sources_state.select(Some(len - 1)),
            None => self.sources_state.select(Some(0)),
            Some(_) => {}
        }

        if self.follow_answer {
            self.scroll_answer_to_bottom();
            self.scroll_thinking_to_bottom();
        }
    }

    /// Hand the current input to the dispatcher. Blank input is ignored.
    pub fn submit_query(&mut self) {
        let query = self.query_input.trim().to_string();
        if query.is_empty() {
            return;
        }

        self.query_input.clear();
        self.query_cursor = 0;
        self.follow_answer = true;
        self.answer_scroll = 0;
        self.thinking_scroll = 0;
        self.status_message = None;

        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let outcome = dispatcher.submit(&query).await;
            info!(?outcome, "submission settled");
        });
    }

    pub fn is_busy(&self) -> bool {
        self.snapshot.state.is_busy() || self.snapshot.streaming
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        self.dispatcher.tick();
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn cycle_focus(&mut self) {
        let order = [
            FocusPane::Input,
            FocusPane::Sources,
            FocusPane::Thinking,
            FocusPane::Answer,
        ];
        let mut idx = order.iter().position(|f| *f == self.focus).unwrap_or(0);
        // Skip collapsed panels
        loop {
            idx = (idx + 1) % order.len();
            let next = order[idx];
            let visible = match next {
                FocusPane::Sources => self.show_sources,
                FocusPane::Thinking => self.show_thinking,
                _ => true,
            };
            if visible {
                self.focus = next;
                break;
            }
        }
        self.input_mode = if self.focus == FocusPane::Input {
            InputMode::Editing
        } else {
            InputMode::Normal
        };
    }

    pub fn toggle_sources(&mut self) {
        self.show_sources = !self.show_sources;
        if !self.show_sources && self.focus == FocusPane::Sources {
            self.focus = FocusPane::Answer;
        }
    }

    pub fn toggle_thinking(&mut self) {
        self.show_thinking = !self.show_thinking;
        if !self.show_thinking && self.focus == FocusPane::Thinking {
            self.focus = FocusPane::Answer;
        }
    }

    // Sources navigation
    pub fn sources_nav_down(&mut self) {
        let len = self.snapshot.state.search_results.len();
        if len > 0 {
            let i = self.sources_state.selected().unwrap_or(0);
            self.sources_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn sources_nav_up(&mut self) {
        let i = self.sources_state.selected().unwrap_or(0);
        self.sources_state.select(Some(i.saturating_sub(1)));
    }

    pub fn selected_source_url(&self) -> Option<&str> {
        self.sources_state
            .selected()
            .and_then(|i| self.snapshot.state.search_results.get(i))
            .map(|r| r.url.as_str())
    }

    pub fn scroll_down(&mut self, lines: u16) {
        match self.focus {
            FocusPane::Sources => {
                for _ in 0..lines {
                    self.sources_nav_down();
                }
            }
            FocusPane::Thinking => {
                self.thinking_scroll = self.thinking_scroll.saturating_add(lines);
            }
            FocusPane::Answer | FocusPane::Input => {
                self.answer_scroll = self.answer_scroll.saturating_add(lines);
            }
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        match self.focus {
            FocusPane::Sources => {
                for _ in 0..lines {
                    self.sources_nav_up();
                }
            }
            FocusPane::Thinking => {
                self.follow_answer = false;
                self.thinking_scroll = self.thinking_scroll.saturating_sub(lines);
            }
            FocusPane::Answer | FocusPane::Input => {
                self.follow_answer = false;
                self.answer_scroll = self.answer_scroll.saturating_sub(lines);
            }
        }
    }

    fn scroll_answer_to_bottom(&mut self) {
        let text = self
            .answer
            .as_ref()
            .map(|a| a.final_response.as_str())
            .unwrap_or("");
        let total = wrapped_line_count(text, self.answer_width);
        self.answer_scroll = total.saturating_sub(self.answer_height.max(1));
    }

    fn scroll_thinking_to_bottom(&mut self) {
        let text = self.answer.as_ref().map(|a| a.thinking.as_str()).unwrap_or("");
        let total = wrapped_line_count(text, self.thinking_width);
        self.thinking_scroll = total.saturating_sub(self.thinking_height.max(1));
    }

    // Model picker methods
    pub async fn open_model_picker(&mut self) {
        let models = match self.current_provider {
            Provider::Ollama => {
                let ollama = OllamaClient::new(
                    &self.config.ollama_url(),
                    &self.selected_model,
                    String::new(),
                );
                match ollama.list_models().await {
                    Ok(models) => models,
                    Err(e) => {
                        warn!(error = %e, "could not list ollama models");
                        self.status_message =
                            Some(format!("{}. Make sure Ollama is running: ollama serve", e));
                        return;
                    }
                }
            }
            provider => provider.hosted_models(),
        };

        if models.is_empty() {
            self.status_message = Some("No models found. Pull one with: ollama pull deepseek-r1".to_string());
            return;
        }

        let current = models.iter().position(|m| *m == self.selected_model).unwrap_or(0);
        self.available_models = models;
        self.model_picker_state.select(Some(current));
        self.show_model_picker = true;
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = self.available_models.len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        let Some(model) = self
            .model_picker_state
            .selected()
            .and_then(|i| self.available_models.get(i))
            .cloned()
        else {
            return;
        };
        self.show_model_picker = false;

        match self.config.build_generator(self.current_provider, &model) {
            Ok(generator) => {
                self.dispatcher.set_generator(generator);
                self.selected_model = model.clone();
                self.config.default_model = Some(model.clone());
                if let Err(e) = Config::save_default_model(&self.config_path, &model) {
                    warn!(error = %e, "could not persist model choice");
                }
            }
            Err(e) => self.status_message = Some(e.to_string()),
        }
    }
}

/// Lines `text` occupies when wrapped at `width` columns.
pub fn wrapped_line_count(text: &str, width: u16) -> u16 {
    // Use a sane default before the first render has measured the panel
    let wrap_width = if width > 0 { width as usize } else { 50 };
    let mut total: u16 = 0;
    for line in text.lines() {
        // Use character count, not byte length, for proper UTF-8 handling
        let char_count = line.chars().count();
        let rows = u16::try_from(char_count / wrap_width + 1).unwrap_or(u16::MAX);
        total = total.saturating_add(rows);
    }
    total
}
