// src/types.rs
//! Core data model shared by the orchestrator, the ranking/delta engines and
//! the period composer. Plain serde structs; all timestamps are UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bump whenever the extraction logic or the insight shape changes; stored
/// insights and aggregates carrying an older version are recomputed.
pub const SCHEMA_VERSION: u32 = 3;

/// Lightweight episode identity produced by a discovery adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpisodeMetadata {
    pub id: String,
    pub source_name: String,
    pub title: String,
    pub published_date: DateTime<Utc>,
    /// Optional pointer to transcript/audio for the analyzer.
    #[serde(default)]
    pub content_ref: Option<String>,
}

/// One extracted topic within one episode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicMention {
    pub topic_label: String,
    /// 0..=100, 50 is neutral.
    pub sentiment: f64,
    /// 0..=1 extraction confidence.
    pub confidence: f64,
    /// 0..=1 share of the episode spent on the topic.
    pub prominence: f64,
    #[serde(default)]
    pub evidence_quotes: Vec<String>,
}

/// Fully analyzed episode, persisted keyed by `id` and overwritten on
/// reprocessing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpisodeInsight {
    pub id: String,
    pub source_name: String,
    pub title: String,
    pub published_date: DateTime<Utc>,
    pub topics: Vec<TopicMention>,
    /// 0..=100 whole-episode sentiment.
    pub overall_sentiment: f64,
    pub is_focus_subject: bool,
    #[serde(default)]
    pub key_quotes: Vec<String>,
    pub schema_version: u32,
    pub processed_at: DateTime<Utc>,
    pub model_id: String,
}

/// One aggregated issue in a period ranking. Derived, never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedIssue {
    /// Display label (first label seen for the bucket).
    pub issue_name: String,
    /// Canonical bucket key; unique within one ranking call.
    pub normalized_key: String,
    pub avg_sentiment: f64,
    pub avg_confidence: f64,
    pub avg_prominence: f64,
    pub episode_count: usize,
    pub rank_score: f64,
    pub sentiment_values: Vec<f64>,
    pub item_ids: Vec<String>,
    pub evidence_quotes: Vec<String>,
    pub latest_date: DateTime<Utc>,
    /// Days between the newest item in the input and the newest mention of
    /// this issue. 0 for issues touched by the most recent episode.
    pub recency_days: i64,
}

/// Movement of an issue versus the prior period.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Movement {
    Up,
    Down,
    New,
    Unchanged,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeltaResult {
    pub issue: RankedIssue,
    pub matched_prior: Option<RankedIssue>,
    /// `None` means no prior data.
    pub sentiment_delta: Option<f64>,
    pub prominence_delta: Option<f64>,
    pub movement: Movement,
    /// 1.0 for exact key matches, the similarity score for fuzzy matches,
    /// 0.0 for new issues.
    pub match_confidence: f64,
}

/// Condensed issue row stored inside a `PeriodAggregate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatedIssue {
    pub issue_name: String,
    pub normalized_key: String,
    pub rank_score: f64,
    pub avg_sentiment: f64,
    pub episode_count: usize,
}

/// Persisted per-period cache row. Valid only while every referenced item
/// still exists with a current schema version and the id set matches the
/// live date-range query exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeriodAggregate {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub item_ids: Vec<String>,
    pub top_issues: Vec<AggregatedIssue>,
    pub computed_at: DateTime<Utc>,
    pub schema_version: u32,
}

/// One recorded per-item analysis failure. Non-fatal by design.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessError {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProcessStats {
    pub total: usize,
    pub cached: usize,
    pub newly_analyzed: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Ephemeral output of one orchestrator run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProcessResult {
    pub items: Vec<EpisodeInsight>,
    pub stats: ProcessStats,
    pub errors: Vec<ProcessError>,
}

impl ProcessResult {
    /// Zero-stats result for ranges where discovery found nothing.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Coverage {
    Minimal,
    Partial,
    Full,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HallucinationRisk {
    Low,
    Elevated,
    High,
}

/// Report-level quality indicators derived from the underlying insights.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityFlags {
    pub hallucination_risk: HallucinationRisk,
    pub coverage: Coverage,
    pub mean_confidence: f64,
}

/// Externally visible payload for one period; the presentation layer renders
/// this as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeriodReport {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub issues: Vec<RankedIssue>,
    pub deltas: Vec<DeltaResult>,
    /// Prior top issues that vanished from the current ranking (max 5).
    pub dropped: Vec<RankedIssue>,
    pub narrative_shifts: Vec<String>,
    pub quality: QualityFlags,
    pub item_count: usize,
    pub from_cache: bool,
    pub computed_at: DateTime<Utc>,
}
