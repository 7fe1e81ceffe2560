//! Streaming response splitter
//!
//! The assistant's reply arrives as one growing text buffer in which the
//! reasoning trace is wrapped in `<think>…</think>` and followed by the final
//! answer. [`split`] is re-evaluated over the whole buffer on every delta:
//! markers can straddle chunk boundaries, so no parser state is carried over.

use crate::context::{THINK_CLOSE, THINK_OPEN};

/// Reasoning and answer regions derived from an assistant message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMessage {
    pub thinking: String,
    pub final_response: String,
    /// True once the closing marker was seen, or the reply carries no markers
    pub is_complete: bool,
}

/// Partition accumulated assistant text into thinking and final answer.
///
/// - closing marker present: split at its first occurrence; the part before it
///   (first opening marker removed, trimmed) is thinking, the trimmed rest is
///   the answer, complete.
/// - only the opening marker: everything is thinking, incomplete.
/// - no markers: the text is already the answer, complete. A reply that so far
///   is blank or consists only of the beginning of the opening marker (`"<th"`)
///   is reported as incomplete and empty until more text arrives.
pub fn split(content: &str) -> ParsedMessage {
    if let Some((thinking, rest)) = content.split_once(THINK_CLOSE) {
        return ParsedMessage {
            thinking: thinking.replacen(THINK_OPEN, "", 1).trim().to_string(),
            final_response: rest.trim().to_string(),
            is_complete: true,
        };
    }

    if content.contains(THINK_OPEN) {
        return ParsedMessage {
            thinking: content.replacen(THINK_OPEN, "", 1).trim().to_string(),
            final_response: String::new(),
            is_complete: false,
        };
    }

    if may_open_reasoning(content) {
        return ParsedMessage::default();
    }

    plain_answer(content)
}

/// [`split`] for a reply whose stream has ended. Text held back because it
/// might still have become an opening marker is the answer after all.
pub fn split_final(content: &str) -> ParsedMessage {
    if content.contains(THINK_OPEN) || content.contains(THINK_CLOSE) {
        return split(content);
    }
    plain_answer(content)
}

fn plain_answer(content: &str) -> ParsedMessage {
    ParsedMessage {
        thinking: String::new(),
        final_response: content.to_string(),
        is_complete: true,
    }
}

/// Blank so far, or only the start of the opening marker.
fn may_open_reasoning(content: &str) -> bool {
    let head = content.trim_start();
    head.len() < THINK_OPEN.len() && THINK_OPEN.starts_with(head)
}
