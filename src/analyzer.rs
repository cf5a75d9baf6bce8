// src/analyzer.rs
//! # Episode Analyzer
//! Collaborator seam for the external AI analysis call. The orchestrator
//! only sees the trait; retry/backoff and error classification live here,
//! inside the collaborator, not in the worker pool.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::{EpisodeInsight, EpisodeMetadata, TopicMention};

/// Turns one episode's identity/metadata into a fully scored insight.
#[async_trait]
pub trait EpisodeAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        metadata: &EpisodeMetadata,
        schema_version: u32,
    ) -> Result<EpisodeInsight>;

    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynAnalyzer = Arc<dyn EpisodeAnalyzer>;

/// Analyzer wiring, usually loaded as part of `AnalysisConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub enabled: bool,
    /// "openai" is the only real provider for now.
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Attempts per episode including the first call.
    pub max_attempts: Option<u32>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: None,
            model: None,
            max_attempts: Some(3),
        }
    }
}

/// Factory: build an analyzer according to config and environment.
///
/// * If `ANALYZER_TEST_MODE=mock`, returns the deterministic mock.
/// * Else if disabled, returns a client that fails every call.
/// * Else builds the configured provider.
pub fn build_analyzer(config: &AnalyzerConfig) -> DynAnalyzer {
    if std::env::var("ANALYZER_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockAnalyzer::default());
    }
    if !config.enabled {
        return Arc::new(DisabledAnalyzer);
    }
    match config.provider.as_deref() {
        Some("openai") => Arc::new(OpenAiAnalyzer::new(
            config.model.as_deref(),
            config.max_attempts.unwrap_or(3),
        )),
        _ => Arc::new(DisabledAnalyzer),
    }
}

/// Clamp AI outputs into their documented ranges before anything downstream
/// sees them.
fn clamp_insight(mut insight: EpisodeInsight) -> EpisodeInsight {
    insight.overall_sentiment = insight.overall_sentiment.clamp(0.0, 100.0);
    for t in &mut insight.topics {
        t.sentiment = t.sentiment.clamp(0.0, 100.0);
        t.confidence = t.confidence.clamp(0.0, 1.0);
        t.prominence = t.prominence.clamp(0.0, 1.0);
    }
    insight
}

// ------------------------------------------------------------
// OpenAI provider
// ------------------------------------------------------------

/// Chat-completions provider. Requires `OPENAI_API_KEY`. Non-2xx statuses,
/// transport errors and unparseable payloads are retried with doubling
/// backoff up to `max_attempts`.
pub struct OpenAiAnalyzer {
    http: reqwest::Client,
    api_key: String,
    model: String,
    max_attempts: u32,
}

impl OpenAiAnalyzer {
    pub fn new(model_override: Option<&str>, max_attempts: u32) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent("podcast-trend-analyzer/0.1 (+github.com/lumlich/podcast-trend-analyzer)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(45))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model: model_override.unwrap_or("gpt-4o-mini").to_string(),
            max_attempts: max_attempts.max(1),
        }
    }

    async fn fetch_once(
        &self,
        metadata: &EpisodeMetadata,
        schema_version: u32,
    ) -> Result<EpisodeInsight> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let sys = "You extract discussion topics from podcast episodes. Respond with JSON only: \
                   {\"topics\":[{\"topic_label\":str,\"sentiment\":0-100,\"confidence\":0-1,\
                   \"prominence\":0-1,\"evidence_quotes\":[str]}],\"overall_sentiment\":0-100,\
                   \"is_focus_subject\":bool,\"key_quotes\":[str]}";
        let user = format!(
            "Source: {}\nTitle: {}\nPublished: {}\nContent: {}",
            metadata.source_name,
            metadata.title,
            metadata.published_date.to_rfc3339(),
            metadata.content_ref.as_deref().unwrap_or("(title only)"),
        );

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: sys,
                },
                Msg {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.2,
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("analysis request failed")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("analysis request returned status {status}");
        }
        let body: Resp = resp.json().await.context("reading analysis response")?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");

        let raw: RawInsight =
            serde_json::from_str(content.trim()).context("parsing analysis payload")?;
        Ok(clamp_insight(raw.into_insight(metadata, schema_version, &self.model)))
    }
}

/// Payload shape the model is asked to produce.
#[derive(Debug, Deserialize)]
struct RawInsight {
    #[serde(default)]
    topics: Vec<TopicMention>,
    #[serde(default = "neutral_sentiment")]
    overall_sentiment: f64,
    #[serde(default)]
    is_focus_subject: bool,
    #[serde(default)]
    key_quotes: Vec<String>,
}

fn neutral_sentiment() -> f64 {
    50.0
}

impl RawInsight {
    fn into_insight(
        self,
        metadata: &EpisodeMetadata,
        schema_version: u32,
        model_id: &str,
    ) -> EpisodeInsight {
        EpisodeInsight {
            id: metadata.id.clone(),
            source_name: metadata.source_name.clone(),
            title: metadata.title.clone(),
            published_date: metadata.published_date,
            topics: self.topics,
            overall_sentiment: self.overall_sentiment,
            is_focus_subject: self.is_focus_subject,
            key_quotes: self.key_quotes,
            schema_version,
            processed_at: Utc::now(),
            model_id: model_id.to_string(),
        }
    }
}

#[async_trait]
impl EpisodeAnalyzer for OpenAiAnalyzer {
    async fn analyze(
        &self,
        metadata: &EpisodeMetadata,
        schema_version: u32,
    ) -> Result<EpisodeInsight> {
        if self.api_key.is_empty() {
            bail!("OPENAI_API_KEY is not set");
        }

        let mut backoff = Duration::from_millis(500);
        let mut last_err = anyhow!("no attempts made");
        for attempt in 1..=self.max_attempts {
            match self.fetch_once(metadata, schema_version).await {
                Ok(insight) => return Ok(insight),
                Err(e) => {
                    tracing::warn!(
                        id = %metadata.id,
                        attempt,
                        error = %e,
                        "episode analysis attempt failed"
                    );
                    last_err = e;
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
        Err(last_err.context(format!(
            "analysis failed after {} attempts",
            self.max_attempts
        )))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

// ------------------------------------------------------------
// Disabled + mock analyzers
// ------------------------------------------------------------

/// Fails every call; used when no provider is configured.
pub struct DisabledAnalyzer;

#[async_trait]
impl EpisodeAnalyzer for DisabledAnalyzer {
    async fn analyze(
        &self,
        metadata: &EpisodeMetadata,
        _schema_version: u32,
    ) -> Result<EpisodeInsight> {
        bail!("analyzer disabled; cannot analyze {}", metadata.id)
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic analyzer for tests and the demo: one topic derived from the
/// title, scores derived from a stable hash of the id.
#[derive(Debug, Clone)]
pub struct MockAnalyzer {
    pub model_id: String,
}

impl Default for MockAnalyzer {
    fn default() -> Self {
        Self {
            model_id: "mock-model".to_string(),
        }
    }
}

#[async_trait]
impl EpisodeAnalyzer for MockAnalyzer {
    async fn analyze(
        &self,
        metadata: &EpisodeMetadata,
        schema_version: u32,
    ) -> Result<EpisodeInsight> {
        let h = stable_hash(&metadata.id);
        let sentiment = 35.0 + (h % 31) as f64; // 35..=65
        let insight = EpisodeInsight {
            id: metadata.id.clone(),
            source_name: metadata.source_name.clone(),
            title: metadata.title.clone(),
            published_date: metadata.published_date,
            topics: vec![TopicMention {
                topic_label: metadata.title.clone(),
                sentiment,
                confidence: 0.9,
                prominence: 0.5,
                evidence_quotes: vec![format!("They spent most of the hour on {}.", metadata.title)],
            }],
            overall_sentiment: sentiment,
            is_focus_subject: true,
            key_quotes: vec![],
            schema_version,
            processed_at: Utc::now(),
            model_id: self.model_id.clone(),
        };
        Ok(clamp_insight(insight))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

fn stable_hash(s: &str) -> u64 {
    // FNV-1a; DefaultHasher is not guaranteed stable across runs.
    let mut h: u64 = 0xcbf29ce484222325;
    for b in s.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}
