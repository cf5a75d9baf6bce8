//! Demo that runs the full pipeline over fixture episodes: discover two
//! weeks, analyze with the mock provider, then compose the current week's
//! report against the prior one (stdout/log only).

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use podcast_trend_analyzer::orchestrator::ProgressFn;
use podcast_trend_analyzer::{
    AnalysisConfig, Composer, FixtureDiscovery, MemoryStore, MockAnalyzer, Orchestrator,
    ProcessOptions,
};

const FIXTURE: &str = r#"[
    {"id":"ep-101","source_name":"The Daily Rundown","title":"Inflation Numbers","published_date":"2026-02-24T08:00:00Z"},
    {"id":"ep-102","source_name":"Beltway Banter","title":"Inflation Fears","published_date":"2026-02-26T08:00:00Z"},
    {"id":"ep-103","source_name":"The Daily Rundown","title":"Border Security","published_date":"2026-02-27T08:00:00Z"},
    {"id":"ep-201","source_name":"The Daily Rundown","title":"Inflation Numbers","published_date":"2026-03-03T08:00:00Z"},
    {"id":"ep-202","source_name":"Beltway Banter","title":"Supreme Court Ruling","published_date":"2026-03-04T08:00:00Z"},
    {"id":"ep-203","source_name":"Pod Save Something","title":"Supreme Court Term","published_date":"2026-03-05T08:00:00Z"}
]"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(
        Arc::new(FixtureDiscovery::from_fixture(FIXTURE)?),
        Arc::new(MockAnalyzer::default()),
        store.clone(),
        AnalysisConfig::default(),
    );

    let prior_start = Utc.with_ymd_and_hms(2026, 2, 23, 0, 0, 0).unwrap();
    let period_start = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
    let period_end = Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap();

    let progress: ProgressFn = Arc::new(|completed, total, id, was_cached| {
        println!("  [{completed}/{total}] {id} (cached: {was_cached})");
    });

    for (start, end, label) in [
        (prior_start, period_start, "prior week"),
        (period_start, period_end, "current week"),
    ] {
        println!("processing {label}...");
        let result = orchestrator
            .process(
                start,
                end,
                ProcessOptions {
                    progress: Some(progress.clone()),
                    ..Default::default()
                },
            )
            .await?;
        println!(
            "  analyzed {} / cached {} / failed {}",
            result.stats.newly_analyzed, result.stats.cached, result.stats.failed
        );
    }

    let composer = Composer::new(store, AnalysisConfig::default());
    let report = composer
        .compose(period_start, period_end, prior_start, period_start)
        .await?;

    println!("\ntop issues for week of {}:", report.period_start.date_naive());
    for (i, issue) in report.issues.iter().enumerate() {
        println!(
            "  {}. {} (score {:.2}, sentiment {:.0}, {} episodes)",
            i + 1,
            issue.issue_name,
            issue.rank_score,
            issue.avg_sentiment,
            issue.episode_count
        );
    }
    println!("\nnarrative shifts:");
    for shift in &report.narrative_shifts {
        println!("  - {shift}");
    }
    println!(
        "\nquality: coverage {:?}, risk {:?} (mean confidence {:.2})",
        report.quality.coverage, report.quality.hallucination_risk, report.quality.mean_confidence
    );

    Ok(())
}
