// src/config.rs
//! Explicit configuration for the analysis pipeline. Constructed once and
//! passed into the orchestrator/composer; nothing here is global state.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analyzer::AnalyzerConfig;
use crate::types::SCHEMA_VERSION;

pub const DEFAULT_CONFIG_PATH: &str = "config/analysis.toml";
pub const ENV_CONFIG_PATH: &str = "ANALYSIS_CONFIG_PATH";
pub const ENV_CONCURRENCY: &str = "ANALYSIS_CONCURRENCY";

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 20;

/// How many period aggregates the cache keeps (one year of weeks).
pub const DEFAULT_KEEP_PERIODS: usize = 52;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Bounded worker-pool width, clamped to 1..=20.
    pub concurrency: usize,
    /// Insights older than this are reanalyzed; `None` disables staleness.
    pub staleness_days: Option<u32>,
    /// Aggregates retained by the cache manager, most recent first.
    pub keep_periods: usize,
    /// Current extraction schema; bump to invalidate stored insights.
    pub schema_version: u32,
    pub analyzer: AnalyzerConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            staleness_days: None,
            keep_periods: DEFAULT_KEEP_PERIODS,
            schema_version: SCHEMA_VERSION,
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AnalysisConfig = toml::from_str(s).context("parsing analysis config")?;
        Ok(cfg.clamped())
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading analysis config at {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Resolve config the usual way:
    /// 1) `$ANALYSIS_CONFIG_PATH`
    /// 2) `config/analysis.toml`
    /// 3) built-in defaults
    /// with `$ANALYSIS_CONCURRENCY` overriding the pool width afterwards.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to a non-existent path"));
            }
            Self::from_path(&pb)?
        } else {
            let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
            if fallback.exists() {
                Self::from_path(&fallback)?
            } else {
                Self::default()
            }
        };

        if let Some(n) = std::env::var(ENV_CONCURRENCY)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            cfg.concurrency = n;
        }
        Ok(cfg.clamped())
    }

    /// Pin every field into its documented range.
    pub fn clamped(mut self) -> Self {
        self.concurrency = self.concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        self.keep_periods = self.keep_periods.max(1);
        self
    }
}
