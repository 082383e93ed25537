// src/classify/names.rs
//! Named-entity exclusion for the rescue pass.
//!
//! Disaster words double as surnames and given names ("Storm Reid",
//! "Dr. Flood"). A keyword occurrence counts as part of a person's name when:
//! - it follows an honorific or title (`Mr`, `Dr`, `Sen`, `President`, ...), or
//! - it is capitalized, sits next to another capitalized word that is not the
//!   first word of the text, and the text is sentence case (so Title Case
//!   headlines are not mistaken for names).

use once_cell::sync::Lazy;
use regex::Regex;

const HONORIFICS: &[&str] = &[
    "mr", "mrs", "ms", "miss", "dr", "prof", "sen", "senator", "rep", "gov", "governor",
    "president", "minister", "coach", "judge", "mayor", "sir", "lady", "st",
];

static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?u)[\w']+").expect("word regex"));

#[derive(Debug, Clone)]
struct Word<'a> {
    text: &'a str,
    start: usize,
    end: usize,
}

fn words(text: &str) -> Vec<Word<'_>> {
    RE_WORD
        .find_iter(text)
        .map(|m| Word {
            text: m.as_str(),
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

fn is_capitalized(w: &str) -> bool {
    let mut chars = w.chars();
    match chars.next() {
        Some(c) if c.is_uppercase() => chars.any(|c| c.is_lowercase()),
        _ => false,
    }
}

/// Share of capitalized words is low enough that capitals carry meaning.
fn is_sentence_case(ws: &[Word<'_>]) -> bool {
    if ws.len() < 3 {
        return false;
    }
    let caps = ws.iter().filter(|w| is_capitalized(w.text)).count();
    (caps as f32) / (ws.len() as f32) < 0.5
}

/// True if the byte span `[start, end)` of `text` is part of a person's name.
pub fn is_part_of_name(text: &str, start: usize, end: usize) -> bool {
    let ws = words(text);
    let Some(idx) = ws.iter().position(|w| w.start <= start && end <= w.end) else {
        return false;
    };

    if idx > 0 {
        let prev = ws[idx - 1].text.to_ascii_lowercase();
        if HONORIFICS.contains(&prev.as_str()) {
            return true;
        }
    }

    if !is_capitalized(ws[idx].text) || !is_sentence_case(&ws) {
        return false;
    }
    let neighbour_is_name = |j: usize| j > 0 && is_capitalized(ws[j].text);
    (idx > 0 && neighbour_is_name(idx - 1)) || (idx + 1 < ws.len() && neighbour_is_name(idx + 1))
}
