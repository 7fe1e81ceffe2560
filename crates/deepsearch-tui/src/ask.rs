//! One-shot mode: run a single turn and stream it to stdout.

use anyhow::{anyhow, bail, Result};
use crossterm::style::Stylize;
use std::io::{self, Write};

use deepsearch_core::context::THINK_CLOSE;
use deepsearch_core::{extract_citations, Dispatcher, ParsedMessage, SubmitOutcome};

/// `text` minus a trailing start of the closing marker (`"</th"`), which may
/// still turn into the marker itself on the next delta.
fn hold_back_marker(text: &str) -> &str {
    (1..THINK_CLOSE.len())
        .rev()
        .find(|&len| text.ends_with(&THINK_CLOSE[..len]))
        .map_or(text, |len| text[..text.len() - len].trim_end())
}

/// Portion of `text` that extends what was already printed. Text that no
/// longer extends it yields nothing, so stdout never repeats itself.
fn unseen<'a>(text: &'a str, printed: &mut String) -> &'a str {
    match text.strip_prefix(printed.as_str()) {
        Some(rest) => {
            printed.push_str(rest);
            rest
        }
        None => "",
    }
}

/// What has been written so far for each region of the answer.
#[derive(Debug, Default)]
struct Progress {
    thinking: String,
    answer: String,
}

impl Progress {
    /// New thinking and answer text for `parsed`.
    fn advance(&mut self, parsed: &ParsedMessage) -> (String, String) {
        let thinking = if parsed.is_complete {
            parsed.thinking.as_str()
        } else {
            hold_back_marker(&parsed.thinking)
        };
        let fresh_thinking = unseen(thinking, &mut self.thinking).to_string();
        let fresh_answer = unseen(&parsed.final_response, &mut self.answer).to_string();
        (fresh_thinking, fresh_answer)
    }
}

pub async fn run(dispatcher: Dispatcher, query: &str) -> Result<()> {
    let mut revisions = dispatcher.subscribe();

    match dispatcher.submit(query).await {
        SubmitOutcome::Dispatched { .. } => {}
        SubmitOutcome::Ignored => bail!("Query is empty"),
        SubmitOutcome::SearchFailed | SubmitOutcome::Superseded => {
            let message = dispatcher
                .snapshot()
                .state
                .search_error
                .unwrap_or_else(|| "Search failed".to_string());
            return Err(anyhow!(message));
        }
    }

    let mut out = io::stdout();
    let results = dispatcher.snapshot().state.search_results;
    if results.is_empty() {
        writeln!(out, "{}", "No sources found.".dark_grey())?;
    } else {
        writeln!(out, "{}", "Sources".bold())?;
        for (i, result) in results.iter().enumerate() {
            writeln!(out, "  [{}] {}", i + 1, result.title.as_str().yellow())?;
            writeln!(out, "      {}", result.url.as_str().dark_grey())?;
        }
    }
    writeln!(out)?;

    let mut progress = Progress::default();

    loop {
        let snapshot = dispatcher.snapshot();
        if let Some(parsed) = snapshot.latest_answer() {
            let had_thinking = !progress.thinking.is_empty();
            let had_answer = !progress.answer.is_empty();
            let (thinking, answer) = progress.advance(&parsed);

            if !thinking.is_empty() {
                if !had_thinking {
                    writeln!(out, "{}", "Thinking".bold())?;
                }
                write!(out, "{}", thinking.as_str().dark_grey())?;
            }
            if !answer.is_empty() {
                if !had_answer {
                    if !progress.thinking.is_empty() {
                        writeln!(out, "\n")?;
                    }
                    writeln!(out, "{}", "Answer".bold())?;
                }
                write!(out, "{}", answer)?;
            }
            out.flush()?;
        }

        if !snapshot.streaming {
            writeln!(out)?;
            if let Some(error) = snapshot.state.generation_error {
                bail!(error);
            }
            let cited = extract_citations(&progress.answer, results.len());
            if !cited.is_empty() {
                let list: Vec<String> = cited.iter().map(|i| format!("[{}]", i)).collect();
                writeln!(out, "{} {}", "Cited:".bold(), list.join(" "))?;
            }
            return Ok(());
        }

        if revisions.changed().await.is_err() {
            return Ok(());
        }
    }
}
