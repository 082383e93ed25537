//! # Consensus Engine
//! Pure scoring: how much independent sources corroborate an event, and how
//! fresh it is. No I/O, no locks; callers pass a store snapshot.
//!
//! ```text
//! recency_bonus = max(0, 40 - age_minutes)
//! confidence    = min(100, trust_weight + consensus_boost + recency_bonus)
//! ```

use crate::event::EventRecord;

/// Keywords whose presence in both titles adds to similarity.
pub const DISASTER_KEYWORDS: &[&str] = &["fire", "flood", "blast", "explosion"];
pub const KEYWORD_BOOST: f64 = 0.18;
/// Pairs must be strictly above this to corroborate.
pub const SIMILARITY_THRESHOLD: f64 = 0.55;
/// Corroboration saturates here.
pub const MAX_CONSENSUS_BOOST: u8 = 60;
pub const RECENCY_WINDOW_MINUTES: i64 = 40;

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Lexical similarity in `[0, 1]` with a same-topic boost.
///
/// Base is the larger of character-bigram Sørensen–Dice and normalized
/// Levenshtein; each disaster keyword found in both strings adds
/// [`KEYWORD_BOOST`].
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let base = strsim::sorensen_dice(&a, &b).max(strsim::normalized_levenshtein(&a, &b));

    let shared = DISASTER_KEYWORDS
        .iter()
        .filter(|k| a.contains(*k) && b.contains(*k))
        .count();
    (base + KEYWORD_BOOST * shared as f64).clamp(0.0, 1.0)
}

/// Weight of one corroborating record by its age.
fn decay_weight(age_secs: f64) -> f64 {
    if age_secs <= 3_600.0 {
        1.0
    } else if age_secs <= 4.0 * 3_600.0 {
        0.8
    } else {
        0.6
    }
}

/// Corroboration score in `0..=60` for `target` against `pool` at time `now`.
///
/// Counts every other well-formed record with the same category whose title
/// is similar enough. Malformed records are skipped, not fatal.
pub fn consensus_boost(target: &EventRecord, pool: &[EventRecord], now: f64) -> u8 {
    let mut sum = 0.0f64;
    for other in pool {
        if !other.is_well_formed() {
            tracing::debug!(id = %other.id, "skipping malformed record in consensus scan");
            continue;
        }
        if other.id == target.id || other.category != target.category {
            continue;
        }
        if similarity(&target.title, &other.title) > SIMILARITY_THRESHOLD {
            sum += decay_weight((now - other.timestamp).max(0.0));
        }
    }
    let boost = (sum * 20.0).min(MAX_CONSENSUS_BOOST as f64);
    boost as u8
}

/// `max(0, 40 - age_minutes)` with whole minutes. Future timestamps count as
/// age zero.
pub fn recency_bonus(event_ts: f64, now: f64) -> u8 {
    let age_secs = if event_ts.is_finite() {
        (now - event_ts).max(0.0)
    } else {
        f64::INFINITY
    };
    let age_minutes = (age_secs / 60.0).floor();
    let bonus = (RECENCY_WINDOW_MINUTES as f64 - age_minutes).max(0.0);
    bonus as u8
}

pub fn final_confidence(trust_weight: u8, consensus: u8, recency: u8) -> u8 {
    let total = trust_weight.min(100) as u32 + consensus as u32 + recency as u32;
    total.min(100) as u8
}

/// Full recomputation for `target` against a snapshot.
pub fn score(target: &EventRecord, pool: &[EventRecord], now: f64) -> u8 {
    final_confidence(
        target.trust_weight,
        consensus_boost(target, pool, now),
        recency_bonus(target.timestamp, now),
    )
}
