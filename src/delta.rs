// src/delta.rs
//! # Delta Engine
//! Matches current-period ranked issues against the prior period and
//! classifies movement. Pure function of its inputs; narrative phrasing for
//! these deltas lives in `themes`, not here.

use std::collections::BTreeSet;

use crate::normalize::{similarity, SIMILARITY_THRESHOLD};
use crate::types::{DeltaResult, Movement, RankedIssue};

/// Sentiment moves smaller than this (with a small prominence move) count as
/// unchanged.
const SENTIMENT_UNCHANGED_BAND: f64 = 5.0;
const PROMINENCE_UNCHANGED_BAND: f64 = 0.10;

/// Only the prior top 5 can be reported as dropped.
const DROPPED_CAP: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct DeltaOutcome {
    pub deltas: Vec<DeltaResult>,
    pub dropped: Vec<RankedIssue>,
}

/// Compute movement for every current issue against the prior ranking.
///
/// Exact key matches win immediately; otherwise the highest-similarity prior
/// issue at or above the topic threshold is used. `prior` is expected in
/// rank order (as produced by the ranking engine).
pub fn compute_deltas(current: &[RankedIssue], prior: &[RankedIssue]) -> DeltaOutcome {
    let mut matched_prior_keys: BTreeSet<String> = BTreeSet::new();
    let mut deltas = Vec::with_capacity(current.len());

    for issue in current {
        let matched = best_prior_match(issue, prior);

        let delta = match matched {
            Some((prior_issue, confidence)) => {
                matched_prior_keys.insert(prior_issue.normalized_key.clone());
                let sentiment_delta = issue.avg_sentiment - prior_issue.avg_sentiment;
                let prominence_delta = issue.avg_prominence - prior_issue.avg_prominence;
                let movement = classify(sentiment_delta, prominence_delta);
                DeltaResult {
                    issue: issue.clone(),
                    matched_prior: Some(prior_issue.clone()),
                    sentiment_delta: Some(sentiment_delta),
                    prominence_delta: Some(prominence_delta),
                    movement,
                    match_confidence: confidence,
                }
            }
            None => DeltaResult {
                issue: issue.clone(),
                matched_prior: None,
                sentiment_delta: None,
                prominence_delta: None,
                movement: Movement::New,
                match_confidence: 0.0,
            },
        };
        deltas.push(delta);
    }

    let dropped: Vec<RankedIssue> = prior
        .iter()
        .take(DROPPED_CAP)
        .filter(|p| !matched_prior_keys.contains(&p.normalized_key))
        .cloned()
        .collect();

    DeltaOutcome { deltas, dropped }
}

fn best_prior_match<'a>(
    issue: &RankedIssue,
    prior: &'a [RankedIssue],
) -> Option<(&'a RankedIssue, f64)> {
    if let Some(exact) = prior
        .iter()
        .find(|p| p.normalized_key == issue.normalized_key)
    {
        return Some((exact, 1.0));
    }

    let mut best: Option<(&RankedIssue, f64)> = None;
    for p in prior {
        let score = similarity(&issue.normalized_key, &p.normalized_key);
        if score < SIMILARITY_THRESHOLD {
            continue;
        }
        if best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((p, score));
        }
    }
    best
}

fn classify(sentiment_delta: f64, prominence_delta: f64) -> Movement {
    if sentiment_delta.abs() < SENTIMENT_UNCHANGED_BAND
        && prominence_delta.abs() < PROMINENCE_UNCHANGED_BAND
    {
        Movement::Unchanged
    } else if sentiment_delta > 0.0 {
        Movement::Up
    } else {
        Movement::Down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn issue(key: &str, sentiment: f64, prominence: f64) -> RankedIssue {
        RankedIssue {
            issue_name: key.to_string(),
            normalized_key: key.to_string(),
            avg_sentiment: sentiment,
            avg_confidence: 0.8,
            avg_prominence: prominence,
            episode_count: 3,
            rank_score: 0.5,
            sentiment_values: vec![sentiment],
            item_ids: vec!["e1".to_string()],
            evidence_quotes: vec![],
            latest_date: Utc.with_ymd_and_hms(2026, 3, 7, 0, 0, 0).unwrap(),
            recency_days: 0,
        }
    }

    #[test]
    fn matched_issue_moving_up() {
        let current = vec![issue("border security", 55.0, 0.5)];
        let prior = vec![issue("border security", 40.0, 0.5)];
        let out = compute_deltas(&current, &prior);

        let d = &out.deltas[0];
        assert_eq!(d.movement, Movement::Up);
        assert!((d.sentiment_delta.unwrap() - 15.0).abs() < 1e-9);
        assert_eq!(d.match_confidence, 1.0);
        assert!(out.dropped.is_empty());
    }

    #[test]
    fn unmatched_issue_is_new() {
        let current = vec![issue("crypto regulation", 60.0, 0.4)];
        let prior = vec![issue("border security", 40.0, 0.5)];
        let out = compute_deltas(&current, &prior);

        assert_eq!(out.deltas[0].movement, Movement::New);
        assert!(out.deltas[0].matched_prior.is_none());
        assert_eq!(out.deltas[0].match_confidence, 0.0);
    }

    #[test]
    fn small_moves_are_unchanged() {
        let current = vec![issue("inflation", 52.0, 0.45)];
        let prior = vec![issue("inflation", 50.0, 0.40)];
        let out = compute_deltas(&current, &prior);
        assert_eq!(out.deltas[0].movement, Movement::Unchanged);
    }

    #[test]
    fn negative_sentiment_move_is_down() {
        let current = vec![issue("inflation", 30.0, 0.4)];
        let prior = vec![issue("inflation", 50.0, 0.4)];
        let out = compute_deltas(&current, &prior);
        assert_eq!(out.deltas[0].movement, Movement::Down);
    }

    #[test]
    fn fuzzy_match_carries_similarity_confidence() {
        let current = vec![issue("border wall construction", 50.0, 0.5)];
        let prior = vec![issue("border wall", 40.0, 0.5)];
        let out = compute_deltas(&current, &prior);

        let d = &out.deltas[0];
        assert!(d.matched_prior.is_some());
        assert!(d.match_confidence >= SIMILARITY_THRESHOLD && d.match_confidence < 1.0);
        assert_eq!(d.movement, Movement::Up);
    }

    #[test]
    fn dropped_is_prior_top_five_never_matched() {
        let current = vec![issue("inflation", 50.0, 0.4)];
        let prior: Vec<RankedIssue> = (0..8)
            .map(|i| issue(&format!("prior topic {i}"), 50.0, 0.4))
            .collect();
        let out = compute_deltas(&current, &prior);

        assert_eq!(out.dropped.len(), 5);
        assert!(out
            .dropped
            .iter()
            .all(|d| d.normalized_key.starts_with("prior topic")));
    }
}
