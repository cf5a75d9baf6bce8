// src/composer.rs
//! # Period Composer
//! Assembles one period's externally visible report: ranked issues, deltas
//! against the prior period, narrative shifts and quality flags.
//!
//! Caching note: only the decision to skip re-deriving issue identity is
//! cached. On a hit we still re-fetch live items and re-run the pure
//! ranking/delta engines (cheap and deterministic) instead of trusting
//! possibly-stale derived text; what a hit skips is persisting a fresh
//! aggregate and pruning.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::cache::{aggregate_is_valid, prune_aggregates};
use crate::config::AnalysisConfig;
use crate::delta::compute_deltas;
use crate::ranking::rank;
use crate::store::DynStore;
use crate::themes::narrative_shifts;
use crate::types::{
    AggregatedIssue, Coverage, EpisodeInsight, HallucinationRisk, PeriodAggregate, PeriodReport,
    QualityFlags, RankedIssue,
};

/// Issue rows persisted per aggregate.
const AGGREGATE_TOP_ISSUES: usize = 10;

/// Coverage tiers by item count.
const COVERAGE_PARTIAL_MIN: usize = 2;
const COVERAGE_FULL_MIN: usize = 5;

/// Hallucination-risk tiers by mean topic confidence.
const RISK_HIGH_BELOW: f64 = 0.45;
const RISK_ELEVATED_BELOW: f64 = 0.65;

pub struct Composer {
    store: DynStore,
    config: AnalysisConfig,
}

impl Composer {
    pub fn new(store: DynStore, config: AnalysisConfig) -> Self {
        Self {
            store,
            config: config.clamped(),
        }
    }

    /// Build the report for `period_start..period_end` with deltas against
    /// `prior_start..prior_end`. Failures surface to the caller and are not
    /// retried here.
    pub async fn compose(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        prior_start: DateTime<Utc>,
        prior_end: DateTime<Utc>,
    ) -> Result<PeriodReport> {
        ensure_metrics_described();

        let live = self
            .store
            .episodes_in_range(period_start, period_end)
            .await
            .context("loading current period items")?;
        let prior_items = self
            .store
            .episodes_in_range(prior_start, prior_end)
            .await
            .context("loading prior period items")?;

        let from_cache = match self.store.get_aggregate(period_start).await? {
            Some(cached) => aggregate_is_valid(&cached, &live, self.config.schema_version),
            None => false,
        };
        if from_cache {
            counter!("aggregate_cache_hits_total").increment(1);
            debug!(%period_start, "aggregate cache hit");
        } else {
            counter!("aggregate_cache_misses_total").increment(1);
        }

        // Pure recompute either way; identity is cheap to re-derive.
        let issues = rank(&live);
        let prior_ranked = rank(&prior_items);
        let outcome = compute_deltas(&issues, &prior_ranked);
        let shifts = narrative_shifts(&outcome.deltas, &outcome.dropped);
        let quality = quality_flags(&live);
        let computed_at = Utc::now();

        if !from_cache {
            let aggregate = PeriodAggregate {
                period_start,
                period_end,
                item_ids: live.iter().map(|e| e.id.clone()).collect(),
                top_issues: condense(&issues),
                computed_at,
                schema_version: self.config.schema_version,
            };
            self.store
                .put_aggregate(&aggregate)
                .await
                .context("persisting period aggregate")?;

            // Pruning is best-effort and must not fail the compose.
            if let Err(e) = prune_aggregates(&self.store, self.config.keep_periods).await {
                warn!(error = %e, "aggregate pruning failed");
            }
        }

        info!(
            %period_start,
            items = live.len(),
            issues = issues.len(),
            from_cache,
            "period report composed"
        );

        Ok(PeriodReport {
            period_start,
            period_end,
            issues,
            deltas: outcome.deltas,
            dropped: outcome.dropped,
            narrative_shifts: shifts,
            quality,
            item_count: live.len(),
            from_cache,
            computed_at,
        })
    }
}

fn condense(issues: &[RankedIssue]) -> Vec<AggregatedIssue> {
    issues
        .iter()
        .take(AGGREGATE_TOP_ISSUES)
        .map(|r| AggregatedIssue {
            issue_name: r.issue_name.clone(),
            normalized_key: r.normalized_key.clone(),
            rank_score: r.rank_score,
            avg_sentiment: r.avg_sentiment,
            episode_count: r.episode_count,
        })
        .collect()
}

/// Coverage from item count, hallucination risk from mean topic confidence.
pub fn quality_flags(items: &[EpisodeInsight]) -> QualityFlags {
    let coverage = if items.len() < COVERAGE_PARTIAL_MIN {
        Coverage::Minimal
    } else if items.len() < COVERAGE_FULL_MIN {
        Coverage::Partial
    } else {
        Coverage::Full
    };

    let confidences: Vec<f64> = items
        .iter()
        .flat_map(|e| e.topics.iter().map(|t| t.confidence))
        .collect();
    let mean_confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    let hallucination_risk = if mean_confidence < RISK_HIGH_BELOW {
        HallucinationRisk::High
    } else if mean_confidence < RISK_ELEVATED_BELOW {
        HallucinationRisk::Elevated
    } else {
        HallucinationRisk::Low
    };

    QualityFlags {
        hallucination_risk,
        coverage,
        mean_confidence,
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "aggregate_cache_hits_total",
            "Period composes served by a valid cached aggregate."
        );
        describe_counter!(
            "aggregate_cache_misses_total",
            "Period composes that recomputed and persisted an aggregate."
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TopicMention, SCHEMA_VERSION};
    use chrono::TimeZone;

    fn item_with_confidence(id: &str, confidence: f64) -> EpisodeInsight {
        EpisodeInsight {
            id: id.to_string(),
            source_name: "s".to_string(),
            title: "t".to_string(),
            published_date: Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap(),
            topics: vec![TopicMention {
                topic_label: "Topic".to_string(),
                sentiment: 50.0,
                confidence,
                prominence: 0.5,
                evidence_quotes: vec![],
            }],
            overall_sentiment: 50.0,
            is_focus_subject: false,
            key_quotes: vec![],
            schema_version: SCHEMA_VERSION,
            processed_at: Utc::now(),
            model_id: "m".to_string(),
        }
    }

    #[test]
    fn coverage_tiers_follow_item_count() {
        let one = vec![item_with_confidence("a", 0.9)];
        assert_eq!(quality_flags(&one).coverage, Coverage::Minimal);

        let three: Vec<_> = (0..3)
            .map(|i| item_with_confidence(&format!("e{i}"), 0.9))
            .collect();
        assert_eq!(quality_flags(&three).coverage, Coverage::Partial);

        let five: Vec<_> = (0..5)
            .map(|i| item_with_confidence(&format!("e{i}"), 0.9))
            .collect();
        assert_eq!(quality_flags(&five).coverage, Coverage::Full);
    }

    #[test]
    fn risk_tiers_follow_mean_confidence() {
        let low = vec![item_with_confidence("a", 0.3)];
        assert_eq!(quality_flags(&low).hallucination_risk, HallucinationRisk::High);

        let mid = vec![item_with_confidence("a", 0.55)];
        assert_eq!(
            quality_flags(&mid).hallucination_risk,
            HallucinationRisk::Elevated
        );

        let high = vec![item_with_confidence("a", 0.9)];
        assert_eq!(quality_flags(&high).hallucination_risk, HallucinationRisk::Low);
    }

    #[test]
    fn empty_period_flags_minimal_and_high_risk() {
        let q = quality_flags(&[]);
        assert_eq!(q.coverage, Coverage::Minimal);
        assert_eq!(q.hallucination_risk, HallucinationRisk::High);
        assert_eq!(q.mean_confidence, 0.0);
    }
}
