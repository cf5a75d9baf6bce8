//! Integration tests for the period composer and the aggregate cache:
//! miss-then-hit behavior, invalidation on item-set and schema changes,
//! best-effort pruning, and end-to-end delta/narrative content.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use podcast_trend_analyzer::{
    AnalysisConfig, Composer, EpisodeInsight, InsightStore, MemoryStore, Movement,
    PeriodAggregate, TopicMention, SCHEMA_VERSION,
};

fn prior_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 23, 0, 0, 0).unwrap()
}

fn period_start() -> DateTime<Utc> {
    prior_start() + Duration::weeks(1)
}

fn period_end() -> DateTime<Utc> {
    period_start() + Duration::weeks(1)
}

fn insight(id: &str, published: DateTime<Utc>, topic: &str, sentiment: f64) -> EpisodeInsight {
    EpisodeInsight {
        id: id.to_string(),
        source_name: "The Daily Rundown".to_string(),
        title: format!("on {topic}"),
        published_date: published,
        topics: vec![TopicMention {
            topic_label: topic.to_string(),
            sentiment,
            confidence: 0.9,
            prominence: 0.5,
            evidence_quotes: vec![format!("we spent a long time talking about {topic}")],
        }],
        overall_sentiment: sentiment,
        is_focus_subject: false,
        key_quotes: vec![],
        schema_version: SCHEMA_VERSION,
        processed_at: Utc::now(),
        model_id: "mock".to_string(),
    }
}

/// Prior week: inflation (x2, sentiment 40) and border security (x2).
/// Current week: inflation (x2, sentiment 60) and a brand-new supreme court
/// story; border security vanishes.
async fn seed_two_weeks(store: &MemoryStore) {
    let p = prior_start();
    for ep in [
        insight("prior-1", p + Duration::days(1), "Inflation", 40.0),
        insight("prior-2", p + Duration::days(2), "Inflation", 40.0),
        insight("prior-3", p + Duration::days(3), "Border Security", 50.0),
        insight("prior-4", p + Duration::days(4), "Border Security", 50.0),
    ] {
        store.put_episode(&ep).await.unwrap();
    }

    let c = period_start();
    for ep in [
        insight("cur-1", c + Duration::days(1), "Inflation", 60.0),
        insight("cur-2", c + Duration::days(2), "Inflation", 60.0),
        insight("cur-3", c + Duration::days(3), "Supreme Court", 45.0),
    ] {
        store.put_episode(&ep).await.unwrap();
    }
}

fn composer(store: Arc<MemoryStore>) -> Composer {
    Composer::new(store, AnalysisConfig::default())
}

#[tokio::test]
async fn first_compose_misses_then_hits() {
    let store = Arc::new(MemoryStore::new());
    seed_two_weeks(&store).await;
    let composer = composer(store.clone());

    let first = composer
        .compose(period_start(), period_end(), prior_start(), period_start())
        .await
        .unwrap();
    assert!(!first.from_cache);

    let persisted = store.get_aggregate(period_start()).await.unwrap().unwrap();
    assert_eq!(persisted.item_ids.len(), 3);
    assert!(!persisted.top_issues.is_empty());

    let second = composer
        .compose(period_start(), period_end(), prior_start(), period_start())
        .await
        .unwrap();
    assert!(second.from_cache);
    // A hit still carries the full recomputed report.
    assert_eq!(second.issues.len(), first.issues.len());
    assert_eq!(second.item_count, 3);
}

#[tokio::test]
async fn new_item_in_range_invalidates_the_aggregate() {
    let store = Arc::new(MemoryStore::new());
    seed_two_weeks(&store).await;
    let composer = composer(store.clone());

    composer
        .compose(period_start(), period_end(), prior_start(), period_start())
        .await
        .unwrap();

    let late = insight(
        "cur-4",
        period_start() + Duration::days(5),
        "Crypto Regulation",
        55.0,
    );
    store.put_episode(&late).await.unwrap();

    let report = composer
        .compose(period_start(), period_end(), prior_start(), period_start())
        .await
        .unwrap();
    assert!(!report.from_cache);
    assert_eq!(report.item_count, 4);

    // The refreshed aggregate covers the new item set.
    let persisted = store.get_aggregate(period_start()).await.unwrap().unwrap();
    assert!(persisted.item_ids.contains(&"cur-4".to_string()));
}

#[tokio::test]
async fn outdated_item_schema_invalidates_the_aggregate() {
    let store = Arc::new(MemoryStore::new());
    seed_two_weeks(&store).await;
    let composer = composer(store.clone());

    composer
        .compose(period_start(), period_end(), prior_start(), period_start())
        .await
        .unwrap();

    let mut old = store.get_episode("cur-2").await.unwrap().unwrap();
    old.schema_version = SCHEMA_VERSION - 1;
    store.put_episode(&old).await.unwrap();

    let report = composer
        .compose(period_start(), period_end(), prior_start(), period_start())
        .await
        .unwrap();
    assert!(!report.from_cache, "stale item schema must force a recompute");
}

#[tokio::test]
async fn compose_prunes_beyond_the_retention_window() {
    let store = Arc::new(MemoryStore::new());
    seed_two_weeks(&store).await;

    // Six old aggregates, all older than the current period.
    for week in 1..=6 {
        let start = period_start() - Duration::weeks(week);
        store
            .put_aggregate(&PeriodAggregate {
                period_start: start,
                period_end: start + Duration::weeks(1),
                item_ids: vec![format!("old-{week}")],
                top_issues: vec![],
                computed_at: Utc::now(),
                schema_version: SCHEMA_VERSION,
            })
            .await
            .unwrap();
    }

    let config = AnalysisConfig {
        keep_periods: 3,
        ..Default::default()
    };
    let composer = Composer::new(store.clone(), config);
    composer
        .compose(period_start(), period_end(), prior_start(), period_start())
        .await
        .unwrap();

    let left = store.list_aggregates().await.unwrap();
    assert_eq!(left.len(), 3);
    // The freshly persisted aggregate is the newest and must survive.
    assert_eq!(left.last().unwrap().period_start, period_start());
}

#[tokio::test]
async fn report_carries_movements_dropped_and_quality() {
    let store = Arc::new(MemoryStore::new());
    seed_two_weeks(&store).await;
    let composer = composer(store);

    let report = composer
        .compose(period_start(), period_end(), prior_start(), period_start())
        .await
        .unwrap();

    let inflation = report
        .deltas
        .iter()
        .find(|d| d.issue.normalized_key == "inflation")
        .expect("inflation ranked");
    assert_eq!(inflation.movement, Movement::Up);
    assert!((inflation.sentiment_delta.unwrap() - 20.0).abs() < 1e-9);

    let court = report
        .deltas
        .iter()
        .find(|d| d.issue.normalized_key == "supreme court")
        .expect("supreme court ranked");
    assert_eq!(court.movement, Movement::New);

    assert!(report
        .dropped
        .iter()
        .any(|d| d.normalized_key == "border security"));
    assert!(!report.narrative_shifts.is_empty());

    // 3 items => partial coverage; confidence 0.9 => low risk.
    use podcast_trend_analyzer::types::{Coverage, HallucinationRisk};
    assert_eq!(report.quality.coverage, Coverage::Partial);
    assert_eq!(report.quality.hallucination_risk, HallucinationRisk::Low);
}
