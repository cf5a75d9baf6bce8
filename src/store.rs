// src/store.rs
//! # Insight Store
//! Keyed persistence seam for episode insights and period aggregates. Two
//! logical collections with independent keys: episodes by id (with a
//! publish-date range query) and aggregates by period start.
//!
//! `MemoryStore` backs tests and demos; `JsonFileStore` keeps one JSON
//! document per key with tmp-file + rename writes, so every put is
//! independently atomic and partial progress survives a crash.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{EpisodeInsight, PeriodAggregate};

/// Storage contract consumed by the orchestrator and composer.
///
/// Range semantics are half-open: `episodes_in_range(start, end)` returns
/// insights with `start <= published_date < end`.
#[async_trait]
pub trait InsightStore: Send + Sync {
    async fn get_episode(&self, id: &str) -> Result<Option<EpisodeInsight>>;
    async fn put_episode(&self, insight: &EpisodeInsight) -> Result<()>;
    async fn episode_exists(&self, id: &str) -> Result<bool> {
        Ok(self.get_episode(id).await?.is_some())
    }
    async fn episodes_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EpisodeInsight>>;
    async fn count_episodes(&self) -> Result<usize>;
    async fn delete_episode(&self, id: &str) -> Result<()>;

    async fn get_aggregate(&self, period_start: DateTime<Utc>)
        -> Result<Option<PeriodAggregate>>;
    async fn put_aggregate(&self, aggregate: &PeriodAggregate) -> Result<()>;
    /// All cached aggregates, ascending by `period_start`.
    async fn list_aggregates(&self) -> Result<Vec<PeriodAggregate>>;
    async fn delete_aggregate(&self, period_start: DateTime<Utc>) -> Result<()>;
}

/// Shared trait object used for injection.
pub type DynStore = Arc<dyn InsightStore>;

// ------------------------------------------------------------
// In-memory store
// ------------------------------------------------------------

/// Mutex-guarded maps; plenty for tests, demos and single-process runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    episodes: Mutex<HashMap<String, EpisodeInsight>>,
    aggregates: Mutex<BTreeMap<DateTime<Utc>, PeriodAggregate>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InsightStore for MemoryStore {
    async fn get_episode(&self, id: &str) -> Result<Option<EpisodeInsight>> {
        let map = self.episodes.lock().expect("episode map mutex poisoned");
        Ok(map.get(id).cloned())
    }

    async fn put_episode(&self, insight: &EpisodeInsight) -> Result<()> {
        let mut map = self.episodes.lock().expect("episode map mutex poisoned");
        map.insert(insight.id.clone(), insight.clone());
        Ok(())
    }

    async fn episodes_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EpisodeInsight>> {
        let map = self.episodes.lock().expect("episode map mutex poisoned");
        let mut out: Vec<EpisodeInsight> = map
            .values()
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

    async fn count_episodes(&self) -> Result<usize> {
        Ok(self.episodes.lock().expect("episode map mutex poisoned").len())
    }

    async fn delete_episode(&self, id: &str) -> Result<()> {
        self.episodes
            .lock()
            .expect("episode map mutex poisoned")
            .remove(id);
        Ok(())
    }

    async fn get_aggregate(
        &self,
        period_start: DateTime<Utc>,
    ) -> Result<Option<PeriodAggregate>> {
        let map = self.aggregates.lock().expect("aggregate map mutex poisoned");
        Ok(map.get(&period_start).cloned())
    }

    async fn put_aggregate(&self, aggregate: &PeriodAggregate) -> Result<()> {
        let mut map = self.aggregates.lock().expect("aggregate map mutex poisoned");
        map.insert(aggregate.period_start, aggregate.clone());
        Ok(())
    }

    async fn list_aggregates(&self) -> Result<Vec<PeriodAggregate>> {
        let map = self.aggregates.lock().expect("aggregate map mutex poisoned");
        Ok(map.values().cloned().collect())
    }

    async fn delete_aggregate(&self, period_start: DateTime<Utc>) -> Result<()> {
        self.aggregates
            .lock()
            .expect("aggregate map mutex poisoned")
            .remove(&period_start);
        Ok(())
    }
}

// ------------------------------------------------------------
// File-backed store
// ------------------------------------------------------------

/// One pretty-printed JSON file per key under `<root>/episodes` and
/// `<root>/aggregates`. Filenames are hex-hashed keys, so arbitrary episode
/// ids (URLs, GUIDs) never leak into path syntax.
pub struct JsonFileStore {
    episodes_dir: PathBuf,
    aggregates_dir: PathBuf,
}

impl JsonFileStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let episodes_dir = root.join("episodes");
        let aggregates_dir = root.join("aggregates");
        tokio::fs::create_dir_all(&episodes_dir)
            .await
            .with_context(|| format!("creating {}", episodes_dir.display()))?;
        tokio::fs::create_dir_all(&aggregates_dir)
            .await
            .with_context(|| format!("creating {}", aggregates_dir.display()))?;
        Ok(Self {
            episodes_dir,
            aggregates_dir,
        })
    }

    fn episode_path(&self, id: &str) -> PathBuf {
        self.episodes_dir.join(format!("{}.json", file_key(id)))
    }

    fn aggregate_path(&self, period_start: DateTime<Utc>) -> PathBuf {
        self.aggregates_dir
            .join(format!("{}.json", period_start.timestamp()))
    }
}

fn file_key(id: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value).context("serializing document")?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &json)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(s) => {
            let value = serde_json::from_str(&s)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

/// Read every JSON document in a directory, skipping tmp leftovers.
async fn read_dir_json<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut out = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("listing {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(value) = read_json(&path).await? {
            out.push(value);
        }
    }
    Ok(out)
}

#[async_trait]
impl InsightStore for JsonFileStore {
    async fn get_episode(&self, id: &str) -> Result<Option<EpisodeInsight>> {
        read_json(&self.episode_path(id)).await
    }

    async fn put_episode(&self, insight: &EpisodeInsight) -> Result<()> {
        write_json(&self.episode_path(&insight.id), insight).await
    }

    async fn episode_exists(&self, id: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(&self.episode_path(id)).await?)
    }

    async fn episodes_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EpisodeInsight>> {
        let mut out: Vec<EpisodeInsight> = read_dir_json(&self.episodes_dir)
            .await?
            .into_iter()
            .filter(|e: &EpisodeInsight| e.published_date >= start && e.published_date < end)
            .collect();
        out.sort_by(|a, b| {
            a.published_date
                .cmp(&b.published_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(out)
    }

    async fn count_episodes(&self) -> Result<usize> {
        let all: Vec<EpisodeInsight> = read_dir_json(&self.episodes_dir).await?;
        Ok(all.len())
    }

    async fn delete_episode(&self, id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.episode_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("deleting episode document"),
        }
    }

    async fn get_aggregate(
        &self,
        period_start: DateTime<Utc>,
    ) -> Result<Option<PeriodAggregate>> {
        read_json(&self.aggregate_path(period_start)).await
    }

    async fn put_aggregate(&self, aggregate: &PeriodAggregate) -> Result<()> {
        write_json(&self.aggregate_path(aggregate.period_start), aggregate).await
    }

    async fn list_aggregates(&self) -> Result<Vec<PeriodAggregate>> {
        let mut out: Vec<PeriodAggregate> = read_dir_json(&self.aggregates_dir).await?;
        out.sort_by_key(|a| a.period_start);
        Ok(out)
    }

    async fn delete_aggregate(&self, period_start: DateTime<Utc>) -> Result<()> {
        match tokio::fs::remove_file(self.aggregate_path(period_start)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("deleting aggregate document"),
        }
    }
}
