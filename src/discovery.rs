// src/discovery.rs
//! Discovery seam: given a period boundary, return lightweight metadata for
//! episodes published inside it. Real feeds live behind this trait outside
//! the crate; `FixtureDiscovery` serves tests and demos from embedded JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::EpisodeMetadata;

#[async_trait]
pub trait DiscoveryAdapter: Send + Sync {
    /// Metadata for episodes with `start <= published_date < end`, ascending
    /// by publish date. Errors are fatal for the calling process run.
    async fn discover(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EpisodeMetadata>>;

    fn name(&self) -> &'static str;
}

pub type DynDiscovery = Arc<dyn DiscoveryAdapter>;

/// Fixture-backed adapter built from a JSON array of `EpisodeMetadata`.
pub struct FixtureDiscovery {
    episodes: Vec<EpisodeMetadata>,
}

impl FixtureDiscovery {
    pub fn new(episodes: Vec<EpisodeMetadata>) -> Self {
        Self { episodes }
    }

    pub fn from_fixture(json: &str) -> Result<Self> {
        let episodes: Vec<EpisodeMetadata> =
            serde_json::from_str(json).context("parsing discovery fixture")?;
        Ok(Self::new(episodes))
    }
}

#[async_trait]
impl DiscoveryAdapter for FixtureDiscovery {
    async fn discover(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EpisodeMetadata>> {
        let mut out: Vec<EpisodeMetadata> = self
            .episodes
            .iter()
            .filter(|e| e.published_date >= start && e.published_date < end)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.published_date
                .cmp(&b.published_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
