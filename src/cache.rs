// src/cache.rs
//! # Aggregate Cache Manager
//! Validity rules for persisted period aggregates and best-effort pruning of
//! the cache window. Invalidation is never an error, just a recompute.

use std::collections::BTreeSet;

use anyhow::Result;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::store::DynStore;
use crate::types::{EpisodeInsight, PeriodAggregate};

/// An aggregate may be reused only while:
/// * its own schema version is current,
/// * its item-id set has identical cardinality and membership to the live
///   date-range query, and
/// * every live item itself carries the current schema version.
pub fn aggregate_is_valid(
    aggregate: &PeriodAggregate,
    live_items: &[EpisodeInsight],
    schema_version: u32,
) -> bool {
    if aggregate.schema_version != schema_version {
        debug!(
            cached = aggregate.schema_version,
            current = schema_version,
            "aggregate invalid: schema version mismatch"
        );
        return false;
    }

    let cached_ids: BTreeSet<&str> = aggregate.item_ids.iter().map(|s| s.as_str()).collect();
    let live_ids: BTreeSet<&str> = live_items.iter().map(|e| e.id.as_str()).collect();
    if cached_ids != live_ids {
        debug!(
            cached = cached_ids.len(),
            live = live_ids.len(),
            "aggregate invalid: item set changed"
        );
        return false;
    }

    if let Some(outdated) = live_items
        .iter()
        .find(|e| e.schema_version != schema_version)
    {
        debug!(id = %outdated.id, "aggregate invalid: item has outdated schema");
        return false;
    }

    true
}

/// Drop the oldest aggregates (by `period_start`) until at most `keep`
/// remain. Pruning is best-effort: a failed delete is logged and the rest of
/// the candidates are still attempted. Returns the number deleted.
pub async fn prune_aggregates(store: &DynStore, keep: usize) -> Result<usize> {
    ensure_metrics_described();

    let aggregates = store.list_aggregates().await?;
    if aggregates.len() <= keep {
        return Ok(0);
    }

    let excess = aggregates.len() - keep;
    let mut deleted = 0usize;
    // list_aggregates is ascending by period_start, so the head is oldest.
    for victim in aggregates.iter().take(excess) {
        match store.delete_aggregate(victim.period_start).await {
            Ok(()) => deleted += 1,
            Err(e) => {
                warn!(
                    period_start = %victim.period_start,
                    error = %e,
                    "pruning aggregate failed; continuing"
                );
            }
        }
    }
    counter!("aggregate_pruned_total").increment(deleted as u64);
    debug!(deleted, keep, "aggregate cache pruned");
    Ok(deleted)
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "aggregate_pruned_total",
            "Period aggregates evicted by the cache window."
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InsightStore, MemoryStore};
    use crate::types::SCHEMA_VERSION;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn start_of_week(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap() + Duration::weeks(n)
    }

    fn aggregate(week: i64, ids: &[&str]) -> PeriodAggregate {
        PeriodAggregate {
            period_start: start_of_week(week),
            period_end: start_of_week(week + 1),
            item_ids: ids.iter().map(|s| s.to_string()).collect(),
            top_issues: vec![],
            computed_at: Utc::now(),
            schema_version: SCHEMA_VERSION,
        }
    }

    fn item(id: &str, schema_version: u32) -> EpisodeInsight {
        EpisodeInsight {
            id: id.to_string(),
            source_name: "s".to_string(),
            title: "t".to_string(),
            published_date: start_of_week(0),
            topics: vec![],
            overall_sentiment: 50.0,
            is_focus_subject: false,
            key_quotes: vec![],
            schema_version,
            processed_at: Utc::now(),
            model_id: "m".to_string(),
        }
    }

    #[test]
    fn valid_aggregate_passes() {
        let agg = aggregate(0, &["a", "b"]);
        let live = vec![item("a", SCHEMA_VERSION), item("b", SCHEMA_VERSION)];
        assert!(aggregate_is_valid(&agg, &live, SCHEMA_VERSION));
    }

    #[test]
    fn schema_bump_invalidates() {
        let agg = aggregate(0, &["a"]);
        let live = vec![item("a", SCHEMA_VERSION)];
        assert!(!aggregate_is_valid(&agg, &live, SCHEMA_VERSION + 1));
    }

    #[test]
    fn outdated_item_schema_invalidates() {
        let agg = aggregate(0, &["a", "b"]);
        let live = vec![item("a", SCHEMA_VERSION), item("b", SCHEMA_VERSION - 1)];
        assert!(!aggregate_is_valid(&agg, &live, SCHEMA_VERSION));
    }

    #[test]
    fn changed_item_set_invalidates_both_directions() {
        let agg = aggregate(0, &["a", "b"]);
        assert!(!aggregate_is_valid(
            &agg,
            &[item("a", SCHEMA_VERSION)],
            SCHEMA_VERSION
        ));
        let live = vec![
            item("a", SCHEMA_VERSION),
            item("b", SCHEMA_VERSION),
            item("c", SCHEMA_VERSION),
        ];
        assert!(!aggregate_is_valid(&agg, &live, SCHEMA_VERSION));
    }

    #[tokio::test]
    async fn pruning_keeps_most_recent_fifty_two() {
        let store: DynStore = Arc::new(MemoryStore::new());
        for week in 0..60 {
            store.put_aggregate(&aggregate(week, &["a"])).await.unwrap();
        }

        let deleted = prune_aggregates(&store, 52).await.unwrap();
        assert_eq!(deleted, 8);

        let left = store.list_aggregates().await.unwrap();
        assert_eq!(left.len(), 52);
        // Oldest survivors are weeks 8..=59.
        assert_eq!(left[0].period_start, start_of_week(8));
        assert_eq!(left.last().unwrap().period_start, start_of_week(59));
    }
}
