//! Maps `indexName:shardId` to [`Shard`] and owns the startup discovery
//! protocol (§4.9, §6 on-disk layout).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use shardql_core::error::{CoreError, CoreResult};

use crate::filter::UdfFilter;
use crate::shard::{BatchConfig, Shard, ShardLifecycle};

fn shard_key(index_name: &str, shard_id: u32) -> String {
    format!("{index_name}:{shard_id}")
}

/// One discovered `<DataDir>/<indexName>/shard_<N>` directory.
struct DiscoveredShard {
    index_name: String,
    shard_id: u32,
    path: PathBuf,
}

fn parse_shard_dir_name(name: &str) -> Option<u32> {
    name.strip_prefix("shard_")?.parse::<u32>().ok()
}

/// Walks `data_dir` collecting `<indexName>/shard_<N>` entries. Unparseable
/// `shard_*` names are skipped with a warning; non-`shard_*` entries are
/// skipped silently (they are not part of this layout).
fn discover(data_dir: &Path) -> Vec<DiscoveredShard> {
    let index_dirs = match fs::read_dir(data_dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .collect::<Vec<_>>(),
        Err(e) => {
            log::warn!("cannot read data dir {}: {e}", data_dir.display());
            return Vec::new();
        }
    };

    index_dirs
        .par_iter()
        .flat_map(|index_entry| {
            let index_name = index_entry.file_name().to_string_lossy().into_owned();
            let shard_entries = match fs::read_dir(index_entry.path()) {
                Ok(entries) => entries.filter_map(|e| e.ok()).collect::<Vec<_>>(),
                Err(e) => {
                    log::warn!(
                        "cannot read index dir {}: {e}",
                        index_entry.path().display()
                    );
                    return Vec::new();
                }
            };
            shard_entries
                .into_iter()
                .filter_map(|entry| {
                    if !entry.path().is_dir() {
                        return None;
                    }
                    let name = entry.file_name().to_string_lossy().into_owned();
                    match parse_shard_dir_name(&name) {
                        Some(shard_id) => Some(DiscoveredShard {
                            index_name: index_name.clone(),
                            shard_id,
                            path: entry.path(),
                        }),
                        None => {
                            log::warn!(
                                "skipping unparseable shard directory {}",
                                entry.path().display()
                            );
                            None
                        }
                    }
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Mapping from `indexName:shardId` to a live [`Shard`] (§3). Enforces
/// `len(shards) <= max_shards` and serializes structural map mutations
/// behind one lock, kept separate from any individual Shard's own lock.
pub struct ShardManager {
    data_dir: PathBuf,
    max_shards: usize,
    udf: Option<Arc<dyn UdfFilter>>,
    shards: parking_lot::RwLock<HashMap<String, Arc<Shard>>>,
}

impl ShardManager {
    pub fn new(data_dir: impl Into<PathBuf>, max_shards: usize) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_shards,
            udf: None,
            shards: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    pub fn with_udf(mut self, udf: Arc<dyn UdfFilter>) -> Self {
        self.udf = Some(udf);
        self
    }

    /// Discovers existing shards under the data directory and starts each
    /// one in `Started` state with default analyzer settings and batch
    /// config. Discovery of independent index directories runs in parallel.
    pub fn start(&self) {
        let found = discover(&self.data_dir);
        let mut shards = self.shards.write();
        for d in found {
            let key = shard_key(&d.index_name, d.shard_id);
            if shards.contains_key(&key) {
                log::warn!("skipping duplicate shard {key}");
                continue;
            }
            let shard = match Shard::open(
                d.index_name.clone(),
                d.shard_id,
                &d.path,
                true,
                BatchConfig::default(),
                self.udf.clone(),
            ) {
                Ok(s) => Arc::new(s),
                Err(e) => {
                    log::warn!("failed to open discovered shard {key}: {e}");
                    continue;
                }
            };
            shard.start();
            shards.insert(key, shard);
        }
    }

    /// Creates a fresh shard directory under the data directory and starts
    /// it. Rejects if the key already exists or the manager is at capacity.
    pub fn create_shard(&self, index_name: &str, shard_id: u32) -> CoreResult<Arc<Shard>> {
        let key = shard_key(index_name, shard_id);
        let mut shards = self.shards.write();
        if shards.contains_key(&key) {
            return Err(CoreError::invalid(format!("shard {key} already exists")));
        }
        if shards.len() >= self.max_shards {
            return Err(CoreError::CapacityExceeded {
                max: self.max_shards,
            });
        }
        let path = self.data_dir.join(index_name).join(format!("shard_{shard_id}"));
        create_shard_dir(&path).map_err(CoreError::engine)?;
        let shard = Arc::new(Shard::open(
            index_name,
            shard_id,
            &path,
            true,
            BatchConfig::default(),
            self.udf.clone(),
        )?);
        shard.start();
        shards.insert(key, shard.clone());
        Ok(shard)
    }

    /// Closes and removes a shard from the map.
    pub fn delete_shard(&self, index_name: &str, shard_id: u32) -> CoreResult<()> {
        let key = shard_key(index_name, shard_id);
        let shard = {
            let mut shards = self.shards.write();
            shards.remove(&key)
        };
        match shard {
            Some(s) => s.close(),
            None => Err(CoreError::not_found(format!("shard {key}"))),
        }
    }

    pub fn get(&self, index_name: &str, shard_id: u32) -> Option<Arc<Shard>> {
        self.shards.read().get(&shard_key(index_name, shard_id)).cloned()
    }

    /// Closes every shard, logging per-shard failures but never stopping
    /// early because of one.
    pub fn stop(&self) {
        let shards = self.shards.write();
        for (key, shard) in shards.iter() {
            if shard.lifecycle() == ShardLifecycle::Closed {
                continue;
            }
            if let Err(e) = shard.close() {
                log::warn!("shard {key} failed to close cleanly: {e}");
            }
        }
    }

    pub fn listing(&self) -> Vec<Arc<Shard>> {
        self.shards.read().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.shards.read().len()
    }
}

#[cfg(unix)]
fn create_shard_dir(path: &Path) -> Result<(), crate::engine::EngineError> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(path)
        .map_err(|e| crate::engine::EngineError::new(e.to_string()))
}

#[cfg(not(unix))]
fn create_shard_dir(path: &Path) -> Result<(), crate::engine::EngineError> {
    std::fs::create_dir_all(path).map_err(|e| crate::engine::EngineError::new(e.to_string()))
}
