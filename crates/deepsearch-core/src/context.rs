//! Search context formatting
//!
//! Turns ranked search results into the instruction block injected as a
//! `system` message ahead of the user's question. The instructions ask the
//! model to wrap its reasoning in [`THINK_OPEN`]/[`THINK_CLOSE`], which is the
//! contract [`crate::splitter::split`] parses.

use crate::search::SearchResult;

/// Opening reasoning marker
pub const THINK_OPEN: &str = "<think>";
/// Closing reasoning marker; text after it is the final answer
pub const THINK_CLOSE: &str = "</think>";

/// Format search results into a single prompt block.
///
/// Returns an empty string when there are no results, so callers never send a
/// blank instruction block.
pub fn format_search_context(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let sources = results
        .iter()
        .enumerate()
        .map(|(i, result)| format_source(i + 1, result))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("Web Search Results:\n\n{}\n\n{}", sources, answer_instructions())
}

fn format_source(index: usize, result: &SearchResult) -> String {
    let mut block = format!(
        "Source [{}]:\nTitle: {}\nURL: {}\n",
        index, result.title, result.url
    );

    if let Some(author) = result.author.as_deref().filter(|a| !a.is_empty()) {
        block.push_str(&format!("Author: {}\n", author));
    }
    if let Some(date) = result.published_date.as_deref().filter(|d| !d.is_empty()) {
        block.push_str(&format!("Date: {}\n", date));
    }

    block.push_str(&format!("Content: {}\n---", result.text));
    block
}

fn answer_instructions() -> String {
    format!(
        concat!(
            "Instructions: Based on the above search results, please provide an answer to the user's query. ",
            "When referencing information, cite the source number in brackets like [1], [2], etc. ",
            "Use simple english and simple words. ",
            "Most important: Before coming to the final answer, think out loud, and think step by step. ",
            "Think deeply, and review your steps, do 3-5 steps of thinking. ",
            "Wrap the thinking in {open} tags. Start with {open} and end with {close} and then the final answer."
        ),
        open = THINK_OPEN,
        close = THINK_CLOSE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(title: &str, url: &str, text: &str) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            url: url.to_string(),
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_results_format_to_empty_text() {
        assert_eq!(format_search_context(&[]), "");
    }

    #[test]
    fn test_sources_are_numbered_in_input_order() {
        let results = vec![
            result("First", "http://a", "alpha"),
            result("Second", "http://b", "beta"),
            result("Third", "http://c", "gamma"),
        ];
        let context = format_search_context(&results);

        assert!(context.starts_with("Web Search Results:\n\n"));
        assert_eq!(context.matches("Source [").count(), 3);

        let first = context.find("Source [1]:\nTitle: First\nURL: http://a\n").unwrap();
        let second = context.find("Source [2]:\nTitle: Second\nURL: http://b\n").unwrap();
        let third = context.find("Source [3]:\nTitle: Third\nURL: http://c\n").unwrap();
        assert!(first < second && second < third);
        assert_eq!(context.matches("\n---").count(), 3);
    }

    #[test]
    fn test_optional_author_and_date_lines() {
        let mut with_meta = result("Answer", "http://x", "It is a number.");
        with_meta.author = Some("Douglas".to_string());
        with_meta.published_date = Some("1979-10-12".to_string());
        let mut blank_author = result("Other", "http://y", "text");
        blank_author.author = Some(String::new());

        let context = format_search_context(&[with_meta, blank_author]);

        assert!(context.contains(
            "Source [1]:\nTitle: Answer\nURL: http://x\nAuthor: Douglas\nDate: 1979-10-12\nContent: It is a number.\n---"
        ));
        assert!(context.contains("Source [2]:\nTitle: Other\nURL: http://y\nContent: text\n---"));
        assert_eq!(context.matches("Author:").count(), 1);
    }

    #[test]
    fn test_instructions_carry_citation_style_and_markers() {
        let context = format_search_context(&[result("T", "http://t", "body")]);
        let instructions = &context[context.find("Instructions:").unwrap()..];

        assert!(instructions.contains("in brackets like [1], [2]"));
        assert!(instructions.contains("3-5 steps of thinking"));
        assert!(instructions.contains("Start with <think> and end with </think> and then the final answer."));
    }
}
