// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval skip gate and relevance scoring.

use std::collections::HashSet;

/// Relevance a candidate must clear when no category floor applies,
/// and the baseline subtracted when weighting section budgets.
pub const DEFAULT_RELEVANCE_FLOOR: f32 = 0.15;

/// Closed list of phatic openers that carry no retrieval signal.
const PHATIC_OPENERS: &[&str] = &[
    "gm", "gn", "hi", "hey", "heya", "yo", "sup", "hello", "lol", "lmao", "haha", "ok",
    "okay", "k", "kk", "nice", "cool", "thanks", "thx", "ty", "brb", "hmm", "yeah", "yep",
    "nope", "bye",
];

/// Decide whether to skip retrieval entirely for this turn.
///
/// Low-signal turns waste budget and surface irrelevant memory.
/// Question-shaped or event-shaped text (digits, @, ?) is never
/// skipped regardless of length.
pub fn should_skip_retrieval(query: &str) -> bool {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return true;
    }
    let has_signal = trimmed.chars().any(|c| c.is_ascii_digit())
        || trimmed.contains('@')
        || trimmed.contains('?');
    if has_signal {
        return false;
    }
    let bare = trimmed
        .trim_end_matches(['!', '.', ','])
        .to_lowercase();
    if PHATIC_OPENERS.contains(&bare.as_str()) {
        return true;
    }
    trimmed.chars().count() < 4
}

/// Lowercased alphanumeric tokens of at least three characters.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Fraction of query tokens found in the candidate, in [0, 1].
pub fn token_overlap(query_tokens: &HashSet<String>, content: &str) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let content_tokens = tokenize(content);
    let matched = query_tokens
        .iter()
        .filter(|t| content_tokens.contains(*t))
        .count();
    matched as f32 / query_tokens.len() as f32
}

/// Relevance of a candidate at `rank` in the store's own ranking.
///
/// A highly ranked candidate gets partial credit even with zero
/// lexical overlap, but overlap dominates when present.
pub fn relevance_score(query_tokens: &HashSet<String>, content: &str, rank: usize) -> f32 {
    let overlap = token_overlap(query_tokens, content);
    let rank_credit = 0.5 * (1.0 / (rank as f32 + 1.0));
    overlap.max(rank_credit)
}

/// Whether any token of `item` appears in `recent_tokens`.
///
/// Used to prune structured fields the person has moved past: a
/// concern nobody has mentioned in the recent episode window is
/// stale.
pub fn overlaps_recent(item: &str, recent_tokens: &HashSet<String>) -> bool {
    tokenize(item).iter().any(|t| recent_tokens.contains(t))
}
