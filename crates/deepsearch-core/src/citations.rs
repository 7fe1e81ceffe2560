use regex::Regex;
use std::sync::OnceLock;

fn citation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[(\d+(?:\s*,\s*\d+)*)\]").expect("valid citation pattern")
    })
}

/// Distinct bracketed source indices (`[2]`, `[1, 3]`) cited in an answer,
/// in order of first appearance and limited to `1..=source_count`.
pub fn extract_citations(answer: &str, source_count: usize) -> Vec<usize> {
    let mut cited = Vec::new();

    for caps in citation_pattern().captures_iter(answer) {
        for number in caps[1].split(',') {
            if let Ok(index) = number.trim().parse::<usize>() {
                if (1..=source_count).contains(&index) && !cited.contains(&index) {
                    cited.push(index);
                }
            }
        }
    }

    cited
}
