//! File-backed result cache.
//!
//! One JSON file per (entity, data kind). Entries past `max_age` are still
//! returned, marked stale, so a caller can tell an expired entry from a
//! missing one. Unreadable entries are treated as misses. Reads and writes go
//! through `tokio::fs` so they never block a runtime worker.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use crate::clock::Clock;
use crate::errors::CacheError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    MarketData,
    Indicators,
    News,
    Documents,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarketData => "market_data",
            Self::Indicators => "indicators",
            Self::News => "news",
            Self::Documents => "documents",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub entity_id: String,
    pub kind: DataKind,
}

impl CacheKey {
    pub fn new(entity_id: impl Into<String>, kind: DataKind) -> Self {
        Self {
            entity_id: entity_id.into(),
            kind,
        }
    }

    /// `{entity}_{kind}.json`, with path-hostile characters replaced.
    pub fn file_name(&self) -> String {
        let entity: String = self
            .entity_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '&' | '^' | '=') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}_{}.json", entity, self.kind)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry<T> {
    entity_id: String,
    data_kind: DataKind,
    written_at: DateTime<Utc>,
    payload: T,
}

/// A cache hit.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedValue<T> {
    pub value: T,
    pub written_at: DateTime<Utc>,
    /// Whether the entry is younger than the cache's max age.
    pub fresh: bool,
}

pub struct ResultCache {
    dir: PathBuf,
    max_age: Duration,
    clock: Arc<dyn Clock>,
}

impl ResultCache {
    /// Open a cache rooted at `dir`, creating the directory if needed.
    ///
    /// Called once at startup, outside the ingestion hot path.
    pub fn new(
        dir: impl Into<PathBuf>,
        max_age: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            max_age,
            clock,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    fn is_fresh(&self, written_at: DateTime<Utc>) -> bool {
        let age = self.clock.now().signed_duration_since(written_at);
        match age.to_std() {
            Ok(age) => age <= self.max_age,
            // Written "in the future" by a skewed clock.
            Err(_) => true,
        }
    }

    /// Read an entry, fresh or stale. Missing and corrupt entries are misses.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<CachedValue<T>> {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Cache miss for {} {}", key.entity_id, key.kind);
                return None;
            }
            Err(e) => {
                warn!(
                    "CacheCorrupt: cannot read {} ({}): {}",
                    path.display(),
                    key.kind,
                    e
                );
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    "CacheCorrupt: ignoring {} entry for {}: {}",
                    key.kind, key.entity_id, e
                );
                return None;
            }
        };
        if entry.entity_id != key.entity_id || entry.data_kind != key.kind {
            warn!(
                "CacheCorrupt: {} holds {} {} instead of {} {}",
                path.display(),
                entry.entity_id,
                entry.data_kind,
                key.entity_id,
                key.kind
            );
            return None;
        }

        let fresh = self.is_fresh(entry.written_at);
        debug!(
            "Cache hit for {} {} ({})",
            key.entity_id,
            key.kind,
            if fresh { "fresh" } else { "stale" }
        );
        Some(CachedValue {
            value: entry.payload,
            written_at: entry.written_at,
            fresh,
        })
    }

    /// Fresh entries only.
    pub async fn lookup_fresh<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        self.get(key)
            .await
            .filter(|hit| hit.fresh)
            .map(|hit| hit.value)
    }

    /// Write an entry atomically: readers see the old file or the new one,
    /// never a partial write.
    pub async fn put<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<(), CacheError> {
        let body = serde_json::to_vec_pretty(&CacheEntry {
            entity_id: key.entity_id.clone(),
            data_kind: key.kind,
            written_at: self.clock.now(),
            payload: value,
        })?;

        let path = self.path_for(key);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", key.file_name(), Uuid::new_v4().simple()));
        fs::write(&tmp, body).await.map_err(|source| CacheError::Io {
            path: tmp.clone(),
            source,
        })?;
        if let Err(source) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CacheError::Io { path, source });
        }
        debug!("Cached {} for {}", key.kind, key.entity_id);
        Ok(())
    }

    pub async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use serde_json::json;

    fn setup(max_age: Duration) -> (tempfile::TempDir, Arc<ManualClock>, ResultCache) {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let cache = ResultCache::new(dir.path(), max_age, clock.clone()).unwrap();
        (dir, clock, cache)
    }

    #[tokio::test]
    async fn test_put_then_get_is_fresh() {
        let (_dir, _clock, cache) = setup(Duration::from_secs(3600));
        let key = CacheKey::new("AAPL", DataKind::MarketData);
        cache.put(&key, &json!({"close": 189.5})).await.unwrap();

        let hit: CachedValue<serde_json::Value> = cache.get(&key).await.unwrap();
        assert!(hit.fresh);
        assert_eq!(hit.value["close"], 189.5);
        assert!(cache.path_for(&key).ends_with("AAPL_market_data.json"));
    }

    #[tokio::test]
    async fn test_stale_entry_is_returned_but_not_fresh() {
        let (_dir, clock, cache) = setup(Duration::from_secs(3600));
        let key = CacheKey::new("AAPL", DataKind::News);
        cache.put(&key, &vec!["a", "b"]).await.unwrap();
        clock.advance(chrono::Duration::seconds(3601));

        let hit: CachedValue<Vec<String>> = cache.get(&key).await.unwrap();
        assert!(!hit.fresh);
        assert_eq!(hit.value.len(), 2);
        assert!(cache.lookup_fresh::<Vec<String>>(&key).await.is_none());
        // Reads never delete stale entries.
        assert!(cache.path_for(&key).exists());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let (_dir, _clock, cache) = setup(Duration::from_secs(3600));
        let key = CacheKey::new("TCS.NS", DataKind::Indicators);
        std::fs::write(cache.path_for(&key), "{ not json").unwrap();

        assert!(cache.get::<serde_json::Value>(&key).await.is_none());

        cache.put(&key, &json!({"rsi": 55.0})).await.unwrap();
        assert!(cache.get::<serde_json::Value>(&key).await.is_some());
    }

    #[tokio::test]
    async fn test_payload_of_wrong_shape_is_a_miss() {
        let (_dir, _clock, cache) = setup(Duration::from_secs(3600));
        let key = CacheKey::new("AAPL", DataKind::MarketData);
        cache.put(&key, &"just a string").await.unwrap();
        assert!(cache.get::<Vec<u32>>(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_missing_entry_is_a_miss() {
        let (_dir, _clock, cache) = setup(Duration::from_secs(3600));
        let key = CacheKey::new("MSFT", DataKind::Documents);
        assert!(cache.get::<serde_json::Value>(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let (_dir, _clock, cache) = setup(Duration::from_secs(3600));
        let key = CacheKey::new("MSFT", DataKind::News);
        cache.put(&key, &1u32).await.unwrap();
        cache.invalidate(&key).await.unwrap();
        assert!(cache.get::<u32>(&key).await.is_none());
        cache.invalidate(&key).await.unwrap();
    }

    #[test]
    fn test_file_name_sanitizes_entity() {
        let key = CacheKey::new("M&M.NS/../x", DataKind::News);
        assert_eq!(key.file_name(), "M&M.NS_.._x_news.json");
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let (dir, _clock, cache) = setup(Duration::from_secs(3600));
        let key = CacheKey::new("AAPL", DataKind::MarketData);
        cache.put(&key, &1u32).await.unwrap();
        cache.put(&key, &2u32).await.unwrap();
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(cache.get::<u32>(&key).await.unwrap().value, 2);
    }
}
