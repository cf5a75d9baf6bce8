// src/ranking.rs
//! # Ranking Engine
//! Pure, testable aggregation of per-episode topic mentions into ranked
//! issues for one period. No I/O, no side effects; suitable for unit tests
//! and offline evaluation.
//!
//! Determinism: input is re-sorted chronologically (ties broken by episode
//! id) before bucket canonicalization, so callers may pass items in any
//! fetch order and still get identical buckets.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::normalize::{canonicalize, normalize};
use crate::types::{EpisodeInsight, RankedIssue};

/// Rank-score weights: frequency, prominence, consistency, recency.
const W_FREQUENCY: f64 = 0.35;
const W_PROMINENCE: f64 = 0.30;
const W_CONSISTENCY: f64 = 0.20;
const W_RECENCY: f64 = 0.15;

/// Recency decay constant in days (e^-t/7 halves roughly every 5 days).
const RECENCY_DECAY_DAYS: f64 = 7.0;

/// Evidence quotes kept per bucket.
const EVIDENCE_CAP: usize = 12;

/// Strict filtering only kicks in once a period has this many episodes.
const STRICT_FILTER_MIN_ITEMS: usize = 6;

const MIN_PROMINENCE: f64 = 0.2;

#[derive(Debug)]
struct Bucket {
    key: String,
    name: String,
    sentiments: Vec<f64>,
    confidences: Vec<f64>,
    prominences: Vec<f64>,
    quotes: Vec<String>,
    item_ids: Vec<String>,
    latest_date: DateTime<Utc>,
}

impl Bucket {
    fn new(key: String, name: String, date: DateTime<Utc>) -> Self {
        Self {
            key,
            name,
            sentiments: Vec::new(),
            confidences: Vec::new(),
            prominences: Vec::new(),
            quotes: Vec::new(),
            item_ids: Vec::new(),
            latest_date: date,
        }
    }
}

/// Aggregate all topic mentions across `items` into ranked issues.
///
/// Steps: chronological sort → normalize/canonicalize each mention against
/// buckets built so far → per-bucket averages and consistency → weighted
/// rank score → ordering → three-tier filter fallback.
pub fn rank(items: &[EpisodeInsight]) -> Vec<RankedIssue> {
    if items.is_empty() {
        return Vec::new();
    }

    // 1) Ascending publish date; id tie-break keeps same-day batches stable.
    let mut sorted: Vec<&EpisodeInsight> = items.iter().collect();
    sorted.sort_by(|a, b| {
        a.published_date
            .cmp(&b.published_date)
            .then_with(|| a.id.cmp(&b.id))
    });
    let latest_input_date = sorted[sorted.len() - 1].published_date;

    // 2) Bucket accumulation with insertion-order canonicalization.
    let mut buckets: Vec<Bucket> = Vec::new();
    let mut keys: Vec<String> = Vec::new();

    for item in &sorted {
        for mention in &item.topics {
            let key = normalize(&mention.topic_label);
            if key.is_empty() {
                continue;
            }
            let canon = canonicalize(&key, &keys);
            let idx = match buckets.iter().position(|b| b.key == canon) {
                Some(i) => i,
                None => {
                    keys.push(canon.clone());
                    buckets.push(Bucket::new(
                        canon,
                        mention.topic_label.trim().to_string(),
                        item.published_date,
                    ));
                    buckets.len() - 1
                }
            };

            let b = &mut buckets[idx];
            b.sentiments.push(mention.sentiment);
            b.confidences.push(mention.confidence);
            b.prominences.push(mention.prominence);
            for q in &mention.evidence_quotes {
                if b.quotes.len() >= EVIDENCE_CAP {
                    break;
                }
                b.quotes.push(q.clone());
            }
            if !b.item_ids.contains(&item.id) {
                b.item_ids.push(item.id.clone());
            }
            if item.published_date > b.latest_date {
                b.latest_date = item.published_date;
            }
        }
    }

    // 3) + 4) Per-bucket metrics and the weighted rank score.
    let max_count = buckets
        .iter()
        .map(|b| b.item_ids.len())
        .max()
        .unwrap_or(1)
        .max(1);

    let mut ranked: Vec<RankedIssue> = buckets
        .into_iter()
        .map(|b| {
            let avg_sentiment = mean(&b.sentiments);
            let avg_confidence = mean(&b.confidences);
            let avg_prominence = mean(&b.prominences);
            let consistency = (1.0 - stddev(&b.sentiments) / 50.0).clamp(0.0, 1.0);
            let recency_days = recency_days(latest_input_date, b.latest_date);

            let freq = b.item_ids.len() as f64 / max_count as f64;
            let rank_score = W_FREQUENCY * freq
                + W_PROMINENCE * avg_prominence
                + W_CONSISTENCY * consistency
                + W_RECENCY * (-(recency_days as f64) / RECENCY_DECAY_DAYS).exp();

            RankedIssue {
                issue_name: b.name,
                normalized_key: b.key,
                avg_sentiment,
                avg_confidence,
                avg_prominence,
                episode_count: b.item_ids.len(),
                rank_score,
                sentiment_values: b.sentiments,
                item_ids: b.item_ids,
                evidence_quotes: b.quotes,
                latest_date: b.latest_date,
                recency_days,
            }
        })
        .collect();

    // 5) Score descending; ties by fresher recency, then key order.
    ranked.sort_by(|a, b| {
        b.rank_score
            .partial_cmp(&a.rank_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.recency_days.cmp(&b.recency_days))
            .then_with(|| a.normalized_key.cmp(&b.normalized_key))
    });

    // 6) Graceful degradation: strict → relaxed → unfiltered. Sparse weeks
    // produce noisy extractions and an empty ranking is worse than a
    // lower-confidence one.
    apply_filter_tiers(ranked, items.len())
}

fn apply_filter_tiers(ranked: Vec<RankedIssue>, item_count: usize) -> Vec<RankedIssue> {
    if item_count >= STRICT_FILTER_MIN_ITEMS {
        let strict: Vec<RankedIssue> = ranked
            .iter()
            .filter(|r| r.episode_count >= 2 && r.avg_prominence > MIN_PROMINENCE)
            .cloned()
            .collect();
        if !strict.is_empty() {
            return strict;
        }
    }

    let relaxed: Vec<RankedIssue> = ranked
        .iter()
        .filter(|r| r.episode_count >= 1 && r.avg_prominence > MIN_PROMINENCE)
        .cloned()
        .collect();
    if !relaxed.is_empty() {
        return relaxed;
    }

    tracing::debug!(
        buckets = ranked.len(),
        items = item_count,
        "ranking filters yielded nothing; returning unfiltered list"
    );
    ranked
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

fn recency_days(latest_input: DateTime<Utc>, bucket_latest: DateTime<Utc>) -> i64 {
    let secs = (latest_input - bucket_latest).num_seconds();
    ((secs as f64 / 86_400.0).round() as i64).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TopicMention, SCHEMA_VERSION};
    use chrono::TimeZone;

    fn day(offset: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::days(offset)
    }

    fn mention(label: &str, sentiment: f64, prominence: f64) -> TopicMention {
        TopicMention {
            topic_label: label.to_string(),
            sentiment,
            confidence: 0.8,
            prominence,
            evidence_quotes: vec![format!("quote about {label}")],
        }
    }

    fn episode(id: &str, offset: i64, topics: Vec<TopicMention>) -> EpisodeInsight {
        EpisodeInsight {
            id: id.to_string(),
            source_name: "The Daily Rundown".to_string(),
            title: format!("Episode {id}"),
            published_date: day(offset),
            topics,
            overall_sentiment: 50.0,
            is_focus_subject: true,
            key_quotes: vec![],
            schema_version: SCHEMA_VERSION,
            processed_at: day(offset),
            model_id: "test-model".to_string(),
        }
    }

    #[test]
    fn order_independence() {
        let items = vec![
            episode("a", 0, vec![mention("Border Security", 40.0, 0.5)]),
            episode("b", 1, vec![mention("Inflation", 30.0, 0.6)]),
            episode("c", 2, vec![mention("Border Wall", 45.0, 0.4)]),
            episode("d", 2, vec![mention("Inflation Fears", 25.0, 0.5)]),
        ];
        let mut reversed = items.clone();
        reversed.reverse();

        let keys_a: Vec<String> = rank(&items).into_iter().map(|r| r.normalized_key).collect();
        let keys_b: Vec<String> = rank(&reversed)
            .into_iter()
            .map(|r| r.normalized_key)
            .collect();
        assert_eq!(keys_a, keys_b);
    }

    #[test]
    fn near_duplicate_topics_merge_into_one_issue() {
        let items = vec![
            episode("a", 0, vec![mention("Jan 6 Hearing", 35.0, 0.6)]),
            episode("b", 1, vec![mention("January 6 Investigation", 45.0, 0.5)]),
        ];
        let ranked = rank(&items);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].episode_count, 2);
        assert_eq!(ranked[0].item_ids, vec!["a".to_string(), "b".to_string()]);
        assert!((ranked[0].avg_sentiment - 40.0).abs() < 1e-9);
    }

    #[test]
    fn single_sparse_item_still_yields_a_ranking() {
        let items = vec![episode("solo", 0, vec![mention("Farm Bill", 50.0, 0.3)])];
        let ranked = rank(&items);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].episode_count, 1);
    }

    #[test]
    fn unfiltered_fallback_when_everything_is_low_prominence() {
        let items = vec![episode("solo", 0, vec![mention("Farm Bill", 50.0, 0.05)])];
        let ranked = rank(&items);
        assert_eq!(ranked.len(), 1, "empty result is worse than low confidence");
    }

    #[test]
    fn strict_filter_drops_singletons_on_busy_weeks() {
        let mut items: Vec<EpisodeInsight> = (0..6)
            .map(|i| {
                episode(
                    &format!("e{i}"),
                    i,
                    vec![mention("Government Shutdown", 30.0, 0.6)],
                )
            })
            .collect();
        items.push(episode("odd", 3, vec![mention("Celebrity Gossip", 70.0, 0.9)]));

        let ranked = rank(&items);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].normalized_key, "government shutdown");
    }

    #[test]
    fn evidence_quotes_are_capped() {
        let quotes: Vec<String> = (0..20).map(|i| format!("q{i}")).collect();
        let items = vec![episode(
            "a",
            0,
            vec![TopicMention {
                topic_label: "Inflation".to_string(),
                sentiment: 40.0,
                confidence: 0.9,
                prominence: 0.5,
                evidence_quotes: quotes,
            }],
        )];
        let ranked = rank(&items);
        assert_eq!(ranked[0].evidence_quotes.len(), 12);
    }

    #[test]
    fn recency_days_counts_from_newest_input() {
        let items = vec![
            episode("old", 0, vec![mention("Old Topic", 50.0, 0.5)]),
            episode("new", 6, vec![mention("Fresh Topic", 50.0, 0.5)]),
        ];
        let ranked = rank(&items);
        let old = ranked
            .iter()
            .find(|r| r.normalized_key == "old topic")
            .unwrap();
        let fresh = ranked
            .iter()
            .find(|r| r.normalized_key == "fresh topic")
            .unwrap();
        assert_eq!(old.recency_days, 6);
        assert_eq!(fresh.recency_days, 0);
        assert!(fresh.rank_score > old.rank_score);
    }

    #[test]
    fn rank_score_stays_roughly_unit_interval() {
        let items = vec![
            episode("a", 0, vec![mention("Inflation", 50.0, 1.0)]),
            episode("b", 0, vec![mention("Inflation", 50.0, 1.0)]),
        ];
        let ranked = rank(&items);
        assert!(ranked[0].rank_score > 0.9 && ranked[0].rank_score <= 1.0 + 1e-9);
    }
}
