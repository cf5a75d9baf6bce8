// src/normalize.rs
//! # Topic Normalizer & Matcher
//! Canonicalizes free-text topic labels into comparable keys and
//! fuzzy-matches near-duplicates. Pure string work, no I/O.
//!
//! Matching pipeline: lowercase → whole-string synonyms → strip
//! non-alphanumerics → collapse whitespace → token-boundary synonyms.
//! Similarity is Jaccard overlap over stop-word-filtered token sets with
//! small bonuses for containment and a shared leading token.

use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};

/// Two labels at or above this similarity are treated as the same topic.
pub const SIMILARITY_THRESHOLD: f64 = 0.78;

/// Whole-string rewrites applied before punctuation stripping.
const PHRASE_SYNONYMS: &[(&str, &str)] = &[
    ("jan 6th", "january 6"),
    ("january 6th", "january 6"),
    ("j6", "january 6"),
    ("the supreme court", "supreme court"),
    ("the economy", "economy"),
];

/// Per-token expansions applied after tokenization. Values may contain
/// spaces and re-split into multiple tokens.
const TOKEN_SYNONYMS: &[(&str, &str)] = &[
    ("jan", "january"),
    ("feb", "february"),
    ("aug", "august"),
    ("sept", "september"),
    ("oct", "october"),
    ("nov", "november"),
    ("dec", "december"),
    ("gov", "government"),
    ("govt", "government"),
    ("admin", "administration"),
    ("dept", "department"),
    ("dems", "democrats"),
    ("gop", "republicans"),
    ("scotus", "supreme court"),
    ("potus", "president"),
    ("vp", "vice president"),
    ("doj", "justice department"),
];

/// Words ignored when comparing topics. Besides articles/prepositions this
/// includes generic coverage filler so label variants like "X Hearing" and
/// "X Investigation" land in the same bucket.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "of", "in", "on", "for", "to", "and", "or", "with",
    "about", "over", "under", "at", "by", "from", "into", "vs", "versus",
    "his", "her", "their", "its", "latest", "recent", "hearing", "hearings",
    "investigation", "investigations", "inquiry", "debate", "discussion",
    "controversy", "coverage", "update", "updates", "news", "story",
    "scandal", "saga", "situation", "talk", "talks", "report", "reports",
];

fn re_non_alnum() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9\s]+").unwrap())
}

fn re_ws() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn token_synonyms() -> &'static HashMap<&'static str, &'static str> {
    static MAP: OnceCell<HashMap<&'static str, &'static str>> = OnceCell::new();
    MAP.get_or_init(|| TOKEN_SYNONYMS.iter().copied().collect())
}

fn stop_words() -> &'static BTreeSet<&'static str> {
    static SET: OnceCell<BTreeSet<&'static str>> = OnceCell::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

/// Normalize a free-text label into a canonical key.
pub fn normalize(label: &str) -> String {
    let mut out = label.to_lowercase();

    for (from, to) in PHRASE_SYNONYMS {
        if out.trim() == *from {
            out = to.to_string();
            break;
        }
    }

    out = re_non_alnum().replace_all(&out, " ").to_string();
    out = re_ws().replace_all(&out, " ").trim().to_string();

    // Token-boundary synonym expansion, then one more collapse since
    // expansions can introduce spaces.
    let expanded: Vec<&str> = out
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(|t| *token_synonyms().get(t).unwrap_or(&t))
        .collect();
    expanded.join(" ")
}

/// Stop-word-filtered, sorted, deduplicated tokens of a normalized key.
pub fn tokenize(key: &str) -> Vec<String> {
    let stop = stop_words();
    let mut toks: Vec<String> = key
        .split_whitespace()
        .filter(|t| !stop.contains(t))
        .map(|t| t.to_string())
        .collect();
    toks.sort();
    toks.dedup();
    toks
}

/// Similarity of two normalized keys in 0..=1.
///
/// Jaccard overlap of token sets, +0.1 if one string contains the other,
/// +0.05 if the first (sorted) tokens match; capped at 1.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let ta = tokenize(a);
    let tb = tokenize(b);

    let mut score = if ta.is_empty() && tb.is_empty() {
        // Both keys were pure stop words; fall back to the raw strings.
        0.0
    } else {
        let sa: BTreeSet<&str> = ta.iter().map(|s| s.as_str()).collect();
        let sb: BTreeSet<&str> = tb.iter().map(|s| s.as_str()).collect();
        let inter = sa.intersection(&sb).count() as f64;
        let union = sa.union(&sb).count() as f64;
        if union > 0.0 { inter / union } else { 0.0 }
    };

    if a.contains(b) || b.contains(a) {
        score += 0.1;
    }
    if let (Some(fa), Some(fb)) = (ta.first(), tb.first()) {
        if fa == fb {
            score += 0.05;
        }
    }
    score.min(1.0)
}

/// Merge `key` into the first existing bucket scoring at or above the
/// threshold, scanning in insertion order; otherwise keep `key` as a new
/// bucket. Callers must feed buckets in a chronologically stable order for
/// reproducible aggregation.
pub fn canonicalize(key: &str, existing_keys: &[String]) -> String {
    for existing in existing_keys {
        if similarity(key, existing) >= SIMILARITY_THRESHOLD {
            return existing.clone();
        }
    }
    key.to_string()
}
