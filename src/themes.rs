// src/themes.rs
//! Evidence-derived phrasing for narrative shifts. Presentation-adjacent
//! text generation kept behind pure functions so it can be swapped or tested
//! without touching the ranking/delta engines.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::types::{DeltaResult, Movement, RankedIssue};

/// At most this many shift sentences per report.
const SHIFT_CAP: usize = 8;

/// Theme phrases are clipped to one short clause.
const THEME_MAX_CHARS: usize = 80;

fn re_lead_in() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:well|look|so|i mean|i think|you know|honestly|frankly)[,\s]+")
            .unwrap()
    })
}

fn re_ws() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Pick a short representative phrase from evidence quotes.
///
/// Heuristic: first quote with at least four words, conversational lead-ins
/// stripped, clipped at the first sentence boundary or 80 chars.
pub fn headline_theme(quotes: &[String]) -> Option<String> {
    for quote in quotes {
        let cleaned = re_ws().replace_all(quote.trim(), " ");
        let cleaned = re_lead_in().replace(&cleaned, "").to_string();
        if cleaned.split_whitespace().count() < 4 {
            continue;
        }

        let clause: String = match cleaned.find(['.', '!', '?', ';']) {
            Some(pos) if pos >= 12 => cleaned[..pos].to_string(),
            _ => cleaned,
        };
        let clipped = clip_chars(clause.trim(), THEME_MAX_CHARS);
        if !clipped.is_empty() {
            return Some(clipped);
        }
    }
    None
}

/// One sentence for a notable delta; `None` for unremarkable ones.
pub fn describe_delta(delta: &DeltaResult) -> Option<String> {
    let name = &delta.issue.issue_name;
    let base = match delta.movement {
        Movement::New => format!("\"{name}\" entered the conversation this period"),
        Movement::Up => format!(
            "Sentiment on \"{name}\" rose {:.0} points week over week",
            delta.sentiment_delta.unwrap_or(0.0)
        ),
        Movement::Down => format!(
            "Sentiment on \"{name}\" fell {:.0} points week over week",
            delta.sentiment_delta.unwrap_or(0.0).abs()
        ),
        Movement::Unchanged => return None,
    };

    match headline_theme(&delta.issue.evidence_quotes) {
        Some(theme) => Some(format!("{base}: \"{theme}\"")),
        None => Some(base),
    }
}

/// Assemble the report's narrative-shift lines from deltas and dropped prior
/// issues, capped for readability.
pub fn narrative_shifts(deltas: &[DeltaResult], dropped: &[RankedIssue]) -> Vec<String> {
    let mut out: Vec<String> = deltas.iter().filter_map(describe_delta).collect();
    for issue in dropped {
        out.push(format!(
            "\"{}\" dropped out of the top issues",
            issue.issue_name
        ));
    }
    out.truncate(SHIFT_CAP);
    out
}

fn clip_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let clipped: String = s.chars().take(max).collect();
    match clipped.rfind(' ') {
        Some(pos) if pos > max / 2 => clipped[..pos].to_string(),
        _ => clipped,
    }
}
