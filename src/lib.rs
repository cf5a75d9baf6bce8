// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod analyzer;
pub mod cache;
pub mod composer;
pub mod config;
pub mod delta;
pub mod discovery;
pub mod normalize;
pub mod orchestrator;
pub mod ranking;
pub mod store;
pub mod themes;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::analyzer::{build_analyzer, DynAnalyzer, EpisodeAnalyzer, MockAnalyzer};
pub use crate::composer::Composer;
pub use crate::config::AnalysisConfig;
pub use crate::delta::compute_deltas;
pub use crate::discovery::{DiscoveryAdapter, DynDiscovery, FixtureDiscovery};
pub use crate::orchestrator::{CancelToken, Orchestrator, ProcessOptions};
pub use crate::ranking::rank;
pub use crate::store::{DynStore, InsightStore, JsonFileStore, MemoryStore};
pub use crate::types::{
    DeltaResult, EpisodeInsight, EpisodeMetadata, Movement, PeriodAggregate, PeriodReport,
    ProcessResult, RankedIssue, TopicMention, SCHEMA_VERSION,
};
