//! The per-shard indexing core (§3, §4.8, §4.9): batches writes, commits
//! them durably, and refreshes a reader so committed documents become
//! queryable, plus the manager that maps `indexName:shardId` to shards.

pub mod analyzer;
pub mod config;
pub mod engine;
pub mod filter;
pub mod manager;
pub mod shard;
pub mod stats;
pub mod stop_signal;

pub use analyzer::{Analyzer, AnalyzerCache, AnalyzerSettings, KeywordAnalyzer, StandardAnalyzer};
pub use config::{BatchDefaults, IndexConfig};
pub use engine::{create_shard_engine, EngineError, EngineResult, MemoryEngine, SearchEngine, SearchHit, SearchResult};
pub use filter::{apply_udf_filter, UdfFilter, UDF_MARKER};
pub use manager::ShardManager;
pub use shard::{BatchConfig, Shard, ShardLifecycle, DEFAULT_PAGE_SIZE};
pub use stats::BatchStats;
pub use stop_signal::StopSignal;
