// src/classify/normalize.rs
//! Signal-style normalization.
//!
//! Headlines and raw social posts are rewritten into one short shape before the
//! model sees them, so both phrasings classify the same way:
//! single line, no trailing punctuation, at most 16 words, and a neutral
//! attribution prefix when the text does not already read as a report.

pub const MAX_WORDS: usize = 16;
pub const ELLIPSIS: &str = "...";
pub const ATTRIBUTION_PREFIX: &str = "Reports indicate: ";

const REPORT_CUES: &[&str] = &[
    "report",
    "says",
    "said",
    "according to",
    "breaking",
    "officials",
    "authorities",
    "confirmed",
    "update",
    "alert",
    "warning",
];

/// True if the text already carries attribution or report phrasing.
pub fn reads_as_report(text: &str) -> bool {
    let lower = text.to_lowercase();
    REPORT_CUES.iter().any(|cue| lower.contains(cue))
}

pub fn to_signal_style(text: &str) -> String {
    // Single line, collapsed whitespace.
    let words: Vec<&str> = text.split_whitespace().collect();
    let truncated = words.len() > MAX_WORDS;
    let mut out = words
        .into_iter()
        .take(MAX_WORDS)
        .collect::<Vec<_>>()
        .join(" ");

    while let Some(last) = out.chars().last() {
        if matches!(last, '.' | '!' | '?' | ',' | ';' | ':' | '-') {
            out.pop();
        } else {
            break;
        }
    }
    let out = out.trim_end().to_string();
    if out.is_empty() {
        return out;
    }

    let mut out = if truncated {
        format!("{out}{ELLIPSIS}")
    } else {
        out
    };
    if !reads_as_report(&out) {
        out.insert_str(0, ATTRIBUTION_PREFIX);
    }
    out
}
