//! Block cache
//!
//! Blocks addressed by hash never change, so a backward history walk can
//! reuse them across runs. Entries are JSON files named after the block hash
//! and expire after a TTL.

use crate::chain::Block;
use crate::Result;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;

/// On-disk cache of blocks keyed by hash
#[derive(Debug, Clone)]
pub struct BlockCache {
    cache_dir: PathBuf,
    ttl: Duration,
}

impl BlockCache {
    /// Create a new cache instance
    pub fn new(ttl: Duration, cache_dir: Option<PathBuf>) -> Self {
        let cache_dir = cache_dir.unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("iou-netting")
        });

        Self { cache_dir, ttl }
    }

    fn get_cache_path(&self, hash: &str) -> PathBuf {
        self.cache_dir
            .join(format!("block_{}.json", hash.trim_start_matches("0x").to_lowercase()))
    }

    async fn is_cache_valid(&self, path: &Path) -> bool {
        match fs::metadata(path).await {
            Ok(metadata) => match metadata.modified() {
                Ok(modified) => SystemTime::now()
                    .duration_since(modified)
                    .map(|elapsed| elapsed < self.ttl)
                    .unwrap_or(false),
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    async fn ensure_cache_dir(&self) -> Result<()> {
        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir)
                .await
                .map_err(crate::Error::Io)?;
        }
        Ok(())
    }

    /// Get a block from cache
    pub async fn get_block(&self, hash: &str) -> Option<Block> {
        let path = self.get_cache_path(hash);

        if self.is_cache_valid(&path).await {
            match fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(block) => {
                        tracing::debug!("Cache hit for block {}", hash);
                        return Some(block);
                    }
                    Err(e) => tracing::warn!("Failed to deserialize cached block: {}", e),
                },
                Err(e) => tracing::warn!("Failed to read cached block: {}", e),
            }
        }
        None
    }

    /// Save a block to cache
    pub async fn save_block(&self, block: &Block) {
        if let Err(e) = self.ensure_cache_dir().await {
            tracing::warn!("Failed to create cache directory: {}", e);
            return;
        }

        let path = self.get_cache_path(&block.hash);

        match serde_json::to_string(block) {
            Ok(json) => {
                if let Err(e) = fs::write(&path, json).await {
                    tracing::warn!("Failed to write block to cache: {}", e);
                }
            }
            Err(e) => tracing::warn!("Failed to serialize block: {}", e),
        }
    }
}
