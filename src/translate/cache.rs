use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, H5pError};

/// Default on-disk location, relative to the working directory
pub const DEFAULT_CACHE_DIR: &str = ".h5p-translator/cache/translations";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationCacheEntry {
    pub source_text: String,
    pub source_language: String,
    pub target_language: String,
    pub translation: String,
    pub backend: String,
    pub model: String,
    pub cached_at: DateTime<Utc>,
}

/// Identifies one model call for caching purposes
#[derive(Debug, Clone, Copy)]
pub struct CacheKey<'a> {
    pub text: &'a str,
    pub source_language: &'a str,
    pub target_language: &'a str,
    pub backend: &'a str,
    pub model: &'a str,
    pub format: &'a str,
}

impl CacheKey<'_> {
    pub fn digest(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.text.hash(&mut hasher);
        self.source_language.hash(&mut hasher);
        self.target_language.hash(&mut hasher);
        self.backend.hash(&mut hasher);
        self.model.hash(&mut hasher);
        self.format.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheInfo {
    pub entries: usize,
    pub total_size: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

/// Persistent translation cache, one JSON file per model call
pub struct TranslationCache {
    dir: PathBuf,
}

impl TranslationCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("Failed to create translation cache directory: {}", e);
        }
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, digest: &str) -> PathBuf {
        self.dir.join(format!("{}.json", digest))
    }

    /// Load a translation from the cache
    pub async fn load(&self, key: &CacheKey<'_>) -> Result<Option<String>> {
        let digest = key.digest();
        let cache_file = self.entry_path(&digest);

        if !cache_file.exists() {
            return Ok(None);
        }

        match tokio::fs::read_to_string(&cache_file).await {
            Ok(content) => match serde_json::from_str::<TranslationCacheEntry>(&content) {
                // A digest collision must not return another text's translation
                Ok(entry) if entry.source_text == key.text => {
                    debug!("Translation cache hit: {} (cached {})", digest, entry.cached_at);
                    Ok(Some(entry.translation))
                }
                Ok(_) => Ok(None),
                Err(e) => {
                    warn!("Failed to parse translation cache entry: {}", e);
                    Ok(None)
                }
            },
            Err(_) => Ok(None),
        }
    }

    /// Save a translation to the cache
    pub async fn save(&self, key: &CacheKey<'_>, translation: &str) -> Result<()> {
        let entry = TranslationCacheEntry {
            source_text: key.text.to_string(),
            source_language: key.source_language.to_string(),
            target_language: key.target_language.to_string(),
            translation: translation.to_string(),
            backend: key.backend.to_string(),
            model: key.model.to_string(),
            cached_at: Utc::now(),
        };

        let digest = key.digest();
        let content = serde_json::to_string_pretty(&entry)
            .map_err(|e| H5pError::Cache(format!("Failed to serialize translation cache: {}", e)))?;

        if let Err(e) = tokio::fs::write(self.entry_path(&digest), content).await {
            warn!("Failed to write translation cache: {}", e);
        } else {
            debug!("Saved translation to cache: {}", digest);
        }

        Ok(())
    }

    /// List cache entries, newest first
    pub async fn list(&self) -> Result<Vec<TranslationCacheEntry>> {
        let mut entries: Vec<TranslationCacheEntry> = self
            .read_entries()
            .await?
            .into_iter()
            .map(|(_, entry, _)| entry)
            .collect();

        entries.sort_by(|a, b| b.cached_at.cmp(&a.cached_at));
        Ok(entries)
    }

    /// Remove every cache entry
    pub async fn clear(&self) -> Result<u64> {
        let mut count = 0;
        for (path, _, _) in self.read_entries().await? {
            if tokio::fs::remove_file(&path).await.is_ok() {
                count += 1;
            }
        }
        info!("Cleared {} translation cache entries", count);
        Ok(count)
    }

    /// Remove entries cached more than `days` days ago
    pub async fn clean_older_than(&self, days: u64) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(days as i64);
        let mut count = 0;
        for (path, entry, _) in self.read_entries().await? {
            if entry.cached_at < cutoff && tokio::fs::remove_file(&path).await.is_ok() {
                count += 1;
            }
        }
        info!("Removed {} translation cache entries older than {} days", count, days);
        Ok(count)
    }

    pub async fn info(&self) -> Result<CacheInfo> {
        let mut info = CacheInfo::default();
        for (_, entry, size) in self.read_entries().await? {
            info.entries += 1;
            info.total_size += size;
            info.oldest_entry = Some(info.oldest_entry.map_or(entry.cached_at, |t| t.min(entry.cached_at)));
            info.newest_entry = Some(info.newest_entry.map_or(entry.cached_at, |t| t.max(entry.cached_at)));
        }
        Ok(info)
    }

    async fn read_entries(&self) -> Result<Vec<(PathBuf, TranslationCacheEntry, u64)>> {
        let mut entries = Vec::new();

        let Ok(mut dir_entries) = tokio::fs::read_dir(&self.dir).await else {
            return Ok(entries);
        };

        while let Some(entry) = dir_entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            if let Ok(cache_entry) = serde_json::from_str::<TranslationCacheEntry>(&content) {
                entries.push((path, cache_entry, content.len() as u64));
            }
        }

        Ok(entries)
    }
}
