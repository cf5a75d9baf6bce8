// src/orchestrator.rs
//! # Parallel Orchestrator
//! Discovers episodes for a period, partitions them into cached/stale/new,
//! and analyzes the uncached set on a bounded worker pool. Every completed
//! analysis is persisted immediately so partial progress survives
//! cancellation or a crash; per-item failures never stop sibling workers.
//!
//! Progress contract: cached items are replayed synchronously, in order,
//! before any new-item notification; completion counts are monotonically
//! increasing but worker notifications race and do not follow submission
//! order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::analyzer::DynAnalyzer;
use crate::config::AnalysisConfig;
use crate::discovery::DynDiscovery;
use crate::store::DynStore;
use crate::types::{
    EpisodeInsight, EpisodeMetadata, ProcessError, ProcessResult, ProcessStats,
};

/// Cooperative cancellation flag, polled between units of work. In-flight
/// analyzer calls are allowed to finish and still get persisted.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

/// `(completed, total, current_id, was_cached)`
pub type ProgressFn = Arc<dyn Fn(usize, usize, &str, bool) + Send + Sync>;
/// `(total, cached, new)` fired once categorization completes.
pub type DiscoveryFn = Arc<dyn Fn(usize, usize, usize) + Send + Sync>;

/// Per-invocation options; anything left `None` falls back to the config
/// the orchestrator was built with.
#[derive(Clone, Default)]
pub struct ProcessOptions {
    pub concurrency: Option<usize>,
    pub force_reprocess: bool,
    pub staleness_days: Option<u32>,
    pub progress: Option<ProgressFn>,
    pub on_discovery: Option<DiscoveryFn>,
    pub cancel: Option<CancelToken>,
}

enum WorkerOutcome {
    Done(EpisodeInsight),
    Failed(ProcessError),
}

pub struct Orchestrator {
    discovery: DynDiscovery,
    analyzer: DynAnalyzer,
    store: DynStore,
    config: AnalysisConfig,
}

impl Orchestrator {
    pub fn new(
        discovery: DynDiscovery,
        analyzer: DynAnalyzer,
        store: DynStore,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            discovery,
            analyzer,
            store,
            config: config.clamped(),
        }
    }

    /// Analyze one period. Discovery errors are fatal; everything per-item
    /// is tolerated and reported in the stats.
    pub async fn process(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        opts: ProcessOptions,
    ) -> Result<ProcessResult> {
        ensure_metrics_described();
        let started = Instant::now();

        // 1) Discovery; an empty period short-circuits with zero stats.
        let discovered = self
            .discovery
            .discover(period_start, period_end)
            .await
            .with_context(|| {
                format!("discovery failed for {period_start}..{period_end}")
            })?;
        if discovered.is_empty() {
            info!(%period_start, %period_end, "nothing discovered for period");
            return Ok(ProcessResult::empty());
        }
        let total = discovered.len();

        // 2) Partition into cached vs pending.
        let staleness_days = opts.staleness_days.or(self.config.staleness_days);
        let mut cached: Vec<EpisodeInsight> = Vec::new();
        let mut pending: Vec<EpisodeMetadata> = Vec::new();
        for meta in discovered {
            if opts.force_reprocess {
                pending.push(meta);
                continue;
            }
            match self.store.get_episode(&meta.id).await? {
                Some(insight)
                    if insight.schema_version == self.config.schema_version
                        && !is_stale(&insight, staleness_days, Utc::now()) =>
                {
                    cached.push(insight)
                }
                _ => pending.push(meta),
            }
        }
        if let Some(cb) = &opts.on_discovery {
            cb(total, cached.len(), pending.len());
        }
        info!(
            total,
            cached = cached.len(),
            new = pending.len(),
            force = opts.force_reprocess,
            "episode categorization complete"
        );

        // 3) Replay cached progress in order, before any new work starts.
        let completed = Arc::new(AtomicUsize::new(0));
        for insight in &cached {
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(cb) = &opts.progress {
                cb(done, total, &insight.id, true);
            }
        }
        counter!("analysis_cache_hits_total").increment(cached.len() as u64);

        // 4) Bounded worker pool over a shared queue.
        let cancel = opts.cancel.clone().unwrap_or_default();
        let width = opts
            .concurrency
            .unwrap_or(self.config.concurrency)
            .clamp(crate::config::MIN_CONCURRENCY, crate::config::MAX_CONCURRENCY)
            .min(pending.len().max(1));

        let (newly_analyzed, errors) = if pending.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            self.run_pool(pending, width, total, completed, cancel, opts.progress.clone())
                .await?
        };

        counter!("analysis_completed_total").increment(newly_analyzed.len() as u64);
        counter!("analysis_failed_total").increment(errors.len() as u64);
        gauge!("process_last_run_ts").set(Utc::now().timestamp() as f64);

        // 5) Assemble: cached first (replay order), then fresh results.
        let stats = ProcessStats {
            total,
            cached: cached.len(),
            newly_analyzed: newly_analyzed.len(),
            failed: errors.len(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            total = stats.total,
            cached = stats.cached,
            newly_analyzed = stats.newly_analyzed,
            failed = stats.failed,
            duration_ms = stats.duration_ms,
            "process run finished"
        );

        let mut items = cached;
        items.extend(newly_analyzed);
        Ok(ProcessResult {
            items,
            stats,
            errors,
        })
    }

    async fn run_pool(
        &self,
        pending: Vec<EpisodeMetadata>,
        width: usize,
        total: usize,
        completed: Arc<AtomicUsize>,
        cancel: CancelToken,
        progress: Option<ProgressFn>,
    ) -> Result<(Vec<EpisodeInsight>, Vec<ProcessError>)> {
        let queue: Arc<Mutex<VecDeque<EpisodeMetadata>>> =
            Arc::new(Mutex::new(pending.into_iter().collect()));
        let (tx, mut rx) = mpsc::unbounded_channel::<WorkerOutcome>();
        let schema_version = self.config.schema_version;

        let mut workers = Vec::with_capacity(width);
        for _ in 0..width {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let analyzer = Arc::clone(&self.analyzer);
            let store = Arc::clone(&self.store);
            let cancel = cancel.clone();
            let completed = Arc::clone(&completed);
            let progress = progress.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    // Cancellation gates the next unit, not in-flight calls.
                    if cancel.is_cancelled() {
                        break;
                    }
                    let next = {
                        let mut q = queue.lock().expect("work queue mutex poisoned");
                        q.pop_front()
                    };
                    let Some(meta) = next else { break };

                    let outcome = match analyzer.analyze(&meta, schema_version).await {
                        Ok(insight) => match store.put_episode(&insight).await {
                            Ok(()) => WorkerOutcome::Done(insight),
                            Err(e) => {
                                warn!(id = %meta.id, error = %e, "persisting insight failed");
                                WorkerOutcome::Failed(ProcessError {
                                    id: meta.id.clone(),
                                    message: format!("persist: {e:#}"),
                                })
                            }
                        },
                        Err(e) => {
                            warn!(id = %meta.id, error = %e, "episode analysis failed");
                            WorkerOutcome::Failed(ProcessError {
                                id: meta.id.clone(),
                                message: format!("{e:#}"),
                            })
                        }
                    };

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(cb) = &progress {
                        cb(done, total, &meta.id, false);
                    }
                    if tx.send(outcome).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut newly_analyzed = Vec::new();
        let mut errors = Vec::new();
        while let Some(outcome) = rx.recv().await {
            match outcome {
                WorkerOutcome::Done(insight) => newly_analyzed.push(insight),
                WorkerOutcome::Failed(err) => errors.push(err),
            }
        }
        for handle in workers {
            handle.await.context("analysis worker panicked")?;
        }

        Ok((newly_analyzed, errors))
    }
}

/// Age-based staleness against `processed_at`; `None` disables the check.
fn is_stale(insight: &EpisodeInsight, staleness_days: Option<u32>, now: DateTime<Utc>) -> bool {
    match staleness_days {
        Some(days) => now - insight.processed_at > Duration::days(days as i64),
        None => false,
    }
}

/// One-time metrics registration (so series show up for exporters).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "analysis_completed_total",
            "Episodes analyzed successfully."
        );
        describe_counter!("analysis_failed_total", "Episode analysis failures.");
        describe_counter!(
            "analysis_cache_hits_total",
            "Episodes served from the item cache."
        );
        describe_gauge!(
            "process_last_run_ts",
            "Unix ts when the orchestrator last finished a run."
        );
    });
}
