//! Last-known-good quote cache
//!
//! One JSON object keyed by commodity display name. Entries never expire: a
//! cached value is used whenever fresh collection fails, whatever its age.
//! The file is loaded wholesale, mutated in memory and rewritten wholesale.

use crate::domain::CommodityQuote;
use crate::infrastructure::collection_error::{CollectionError, CollectionResult};
use anyhow::{Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Timestamp format for `cachedAt`
pub const CACHED_AT_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Persisted last successful value for one commodity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub value: f64,
    pub source: String,
    pub cached_at: String,
    pub method: String,
}

impl CacheEntry {
    /// Quote reused from this entry, marked as cached
    #[must_use]
    pub fn to_quote(&self, name: &str) -> CommodityQuote {
        CommodityQuote {
            name: name.to_string(),
            value: Some(self.value),
            source: format!("{} [cache {}]", self.source, self.cached_at),
            from_cache: true,
            method: self.method.clone(),
        }
    }
}

pub type CacheMap = BTreeMap<String, CacheEntry>;

/// In-memory copy of the cache taken at the start of a run
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    entries: CacheMap,
}

impl CacheSnapshot {
    #[must_use]
    pub const fn new(entries: CacheMap) -> Self {
        Self { entries }
    }

    pub fn lookup(&self, name: &str) -> CollectionResult<CommodityQuote> {
        self.entries
            .get(name)
            .map(|entry| entry.to_quote(name))
            .ok_or_else(|| CollectionError::CacheMiss {
                commodity: name.to_string(),
            })
    }

    #[must_use]
    pub fn entries(&self) -> &CacheMap {
        &self.entries
    }
}

/// File-backed cache store
pub struct QuoteCache {
    path: PathBuf,
    timezone: Tz,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl QuoteCache {
    pub fn new(path: impl Into<PathBuf>, timezone: Tz) -> Self {
        Self {
            path: path.into(),
            timezone,
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the whole cache. Missing or unreadable files count as empty.
    pub async fn load(&self) -> CacheMap {
        match self.read_file().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("⚠️ Ignoring unreadable cache {:?}: {:#}", self.path, e);
                CacheMap::new()
            }
        }
    }

    pub async fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot::new(self.load().await)
    }

    pub async fn lookup(&self, name: &str) -> CollectionResult<CommodityQuote> {
        self.snapshot().await.lookup(name)
    }

    async fn read_file(&self) -> Result<CacheMap> {
        if !self.path.exists() {
            debug!("No cache file at {:?}", self.path);
            return Ok(CacheMap::new());
        }
        let content = fs::read_to_string(&self.path)
            .await
            .context("Failed to read cache file")?;
        if content.trim().is_empty() {
            return Ok(CacheMap::new());
        }
        serde_json::from_str(&content).context("Cache file is not valid JSON")
    }

    /// Write every fresh quote back in one batch.
    ///
    /// Cached and missing quotes are skipped. Returns how many entries were
    /// written; nothing touches the file when there is nothing fresh.
    pub async fn store_fresh(&self, quotes: &[CommodityQuote]) -> Result<usize> {
        let fresh: Vec<&CommodityQuote> = quotes.iter().filter(|q| q.is_fresh()).collect();
        if fresh.is_empty() {
            debug!("No fresh quotes to cache");
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await;
        let cached_at = Utc::now().with_timezone(&self.timezone).format(CACHED_AT_FORMAT).to_string();

        for quote in &fresh {
            let Some(value) = quote.value else { continue };
            entries.insert(
                quote.name.clone(),
                CacheEntry {
                    value,
                    source: quote.source.clone(),
                    cached_at: cached_at.clone(),
                    method: quote.method.clone(),
                },
            );
        }

        self.write_file(&entries).await?;
        info!("💾 Cached {} fresh quote(s) to {:?}", fresh.len(), self.path);
        Ok(fresh.len())
    }

    /// Temp file then rename, so a crash never leaves a truncated cache
    async fn write_file(&self, entries: &CacheMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create cache directory")?;
        }

        let content = serde_json::to_string_pretty(entries).context("Failed to serialize cache")?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content)
            .await
            .with_context(|| format!("Failed to write {tmp_path:?}"))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace {:?}", self.path))?;
        Ok(())
    }
}
