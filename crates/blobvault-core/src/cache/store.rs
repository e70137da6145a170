//! Cache store implementation
//!
//! Pairs a near "cache" store with a far "origin" store and keeps one
//! `cache_rows` row per digest recording which side currently holds a copy.
//! Small blobs land in the cache and are pushed to the origin by `flush`
//! (or the background task); blobs larger than the cache go straight to the
//! origin. Reads fill the cache from the origin on miss.

use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use async_trait::async_trait;
use blobvault_db::{cache_rows, CacheRow, Database};
use blobvault_storage::{BlobInfo, BlobStore, ByteStream, Digest, Spooled, StoreError};

use super::policy::EvictionPolicy;

/// Configuration for the cache store
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum total bytes held in the cache. Zero disables caching: every
    /// blob goes straight to the origin.
    pub max_size: u64,
    /// Eviction policy
    pub policy: EvictionPolicy,
    /// Blobs above this size are preferred eviction victims (1 MiB).
    pub large_threshold: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1024 * 1024 * 1024, // 1 GiB
            policy: EvictionPolicy::Lru,
            large_threshold: 1024 * 1024,
        }
    }
}

/// Tiered cache/origin store pair with eviction and synchronization.
///
/// The row table is the source of truth for what is where; the derived
/// `SUM(content_length) WHERE is_cached` is the cache occupancy, so the
/// size invariant survives crashes and concurrent writers without a
/// counter to keep honest.
pub struct CacheStore {
    cache: Arc<dyn BlobStore>,
    origin: Arc<dyn BlobStore>,
    db: Database,
    config: CacheConfig,
}

impl CacheStore {
    pub fn new(
        cache: Arc<dyn BlobStore>,
        origin: Arc<dyn BlobStore>,
        db: Database,
        config: CacheConfig,
    ) -> Self {
        info!(
            "Initializing cache store (max_size: {} bytes, policy: {})",
            config.max_size,
            config.policy.as_str()
        );
        Self {
            cache,
            origin,
            db,
            config,
        }
    }

    /// Current cache occupancy in bytes.
    pub async fn cached_size(&self) -> Result<u64, StoreError> {
        let mut conn = self.db.acquire().await?;
        Ok(cache_rows::cached_size(&mut conn).await? as u64)
    }

    /// Copy a cached blob to the origin and mark it stored. No-op when
    /// already stored; fails when the blob is not cached.
    pub async fn push(&self, digest: &Digest) -> Result<(), StoreError> {
        let mut conn = self.db.acquire().await?;
        let row = cache_rows::get(&mut conn, digest.as_str())
            .await?
            .ok_or_else(|| StoreError::NotFound(digest.clone()))?;
        if row.is_stored {
            return Ok(());
        }
        if !row.is_cached {
            return Err(StoreError::NotFound(digest.clone()));
        }

        let spooled = Spooled::from_stream(self.cache.open(digest).await?).await?;
        // Spooling recomputed the digest anyway; catch on-disk rot before
        // publishing it to the origin.
        if spooled.digest() != digest {
            return Err(StoreError::Integrity(format!(
                "cached copy of {} hashes to {}",
                digest,
                spooled.digest()
            )));
        }
        self.origin.add(&spooled).await?;
        cache_rows::set_stored(&mut conn, digest.as_str(), true).await?;
        debug!("Pushed blob {} to origin", digest);
        Ok(())
    }

    /// Fill the cache from the origin. No-op when already cached; fails
    /// with `NotFound` when the origin has no copy either.
    pub async fn pull(&self, digest: &Digest) -> Result<(), StoreError> {
        let mut conn = self.db.acquire().await?;
        let row = cache_rows::get(&mut conn, digest.as_str())
            .await?
            .ok_or_else(|| StoreError::NotFound(digest.clone()))?;
        if row.is_cached {
            return Ok(());
        }
        if !row.is_stored {
            return Err(StoreError::NotFound(digest.clone()));
        }

        let spooled = Spooled::from_stream(self.origin.open(digest).await?).await?;
        self.ensure_space(&mut conn, spooled.content_length()).await?;
        self.cache.add(&spooled).await?;
        cache_rows::set_cached(&mut conn, digest.as_str(), true).await?;
        debug!("Pulled blob {} into cache", digest);
        Ok(())
    }

    /// Push every cached blob that has not reached the origin yet. Errors
    /// are reported per digest and do not stop the sweep; returns the
    /// number pushed.
    pub async fn flush(&self) -> Result<usize, StoreError> {
        let digests = {
            let mut conn = self.db.acquire().await?;
            cache_rows::unpushed(&mut conn).await?
        };
        let mut pushed = 0;
        for digest in digests {
            let digest = Digest::from_str(&digest)?;
            match self.push(&digest).await {
                Ok(()) => pushed += 1,
                Err(e) => warn!("Failed to push {}: {}", digest, e),
            }
        }
        Ok(pushed)
    }

    fn bypasses_cache(&self, content_length: u64) -> bool {
        self.config.max_size == 0 || content_length > self.config.max_size
    }

    /// Make room for `incoming` more bytes, evicting if necessary.
    async fn ensure_space(
        &self,
        conn: &mut blobvault_db::SqliteConnection,
        incoming: u64,
    ) -> Result<(), StoreError> {
        let current = cache_rows::cached_size(conn).await? as u64;
        let need = (current + incoming).saturating_sub(self.config.max_size);
        if need > 0 {
            self.evict(conn, need).await?;
        }
        Ok(())
    }

    /// Reclaim at least `need` bytes of cache space.
    ///
    /// Only blobs that already reached the origin are candidates; unpushed
    /// data is never dropped. Two passes: large blobs first, then the rest,
    /// each in the policy's preferred order.
    async fn evict(
        &self,
        conn: &mut blobvault_db::SqliteConnection,
        need: u64,
    ) -> Result<(), StoreError> {
        let order = self.config.policy.order();
        let mut remaining = need as i64;
        let mut victims: Vec<CacheRow> = Vec::new();

        for min_length in [self.config.large_threshold as i64, 0] {
            if remaining <= 0 {
                break;
            }
            for row in cache_rows::eviction_candidates(conn, min_length, order).await? {
                if remaining <= 0 {
                    break;
                }
                if victims.iter().any(|v| v.digest == row.digest) {
                    continue;
                }
                remaining -= row.content_length;
                victims.push(row);
            }
        }

        if remaining > 0 {
            return Err(StoreError::CacheFull {
                needed: remaining as u64,
            });
        }

        for row in victims {
            debug!("Evicting blob {} from cache", row.digest);
            let digest = Digest::from_str(&row.digest)?;
            self.cache.delete(&digest).await?;
            cache_rows::set_cached(conn, &row.digest, false).await?;
            // A row that was never pushed and is no longer cached is dead.
            cache_rows::delete_if_orphan(conn, &row.digest).await?;
            metrics::counter!("blobvault_cache_evictions_total").increment(1);
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for CacheStore {
    async fn open(&self, digest: &Digest) -> Result<ByteStream, StoreError> {
        let row = {
            let mut conn = self.db.acquire().await?;
            let row = cache_rows::get(&mut conn, digest.as_str())
                .await?
                .ok_or_else(|| StoreError::NotFound(digest.clone()))?;
            cache_rows::touch(&mut conn, digest.as_str()).await?;
            row
        };

        if row.is_cached {
            match self.cache.open(digest).await {
                Ok(stream) => {
                    metrics::counter!("blobvault_cache_hits_total").increment(1);
                    return Ok(stream);
                }
                Err(StoreError::NotFound(_)) => {
                    // The row lied: the cached copy was removed behind our
                    // back. Repair the flag and fall through to the origin.
                    warn!("Cache row set but backend misses blob: {}", digest);
                    let mut conn = self.db.acquire().await?;
                    cache_rows::set_cached(&mut conn, digest.as_str(), false).await?;
                    cache_rows::delete_if_orphan(&mut conn, digest.as_str()).await?;
                }
                Err(e) => return Err(e),
            }
        }

        metrics::counter!("blobvault_cache_misses_total").increment(1);
        if self.bypasses_cache(row.content_length as u64) {
            // Oversized blobs are served from the origin, never cached.
            return self.origin.open(digest).await;
        }
        self.pull(digest).await?;
        self.cache.open(digest).await
    }

    async fn add(&self, blob: &Spooled) -> Result<BlobInfo, StoreError> {
        let info = blob.info().clone();
        let mut conn = self.db.acquire().await?;
        cache_rows::insert_if_absent(&mut conn, info.digest.as_str(), info.content_length as i64)
            .await?;
        let row = cache_rows::get(&mut conn, info.digest.as_str())
            .await?
            .ok_or_else(|| StoreError::NotFound(info.digest.clone()))?;

        if self.bypasses_cache(info.content_length) {
            if !row.is_stored {
                self.origin.add(blob).await?;
                cache_rows::set_stored(&mut conn, info.digest.as_str(), true).await?;
            }
        } else if !row.is_cached {
            self.ensure_space(&mut conn, info.content_length).await?;
            self.cache.add(blob).await?;
            cache_rows::set_cached(&mut conn, info.digest.as_str(), true).await?;

            // Concurrent adds can overshoot between the space check and the
            // write; restore the size invariant now rather than eventually.
            let current = cache_rows::cached_size(&mut conn).await? as u64;
            if current > self.config.max_size {
                match self.evict(&mut conn, current - self.config.max_size).await {
                    Ok(()) | Err(StoreError::CacheFull { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
        } else if !row.is_stored {
            // Already cached, not yet pushed: flush (or the background
            // task) will take it to the origin.
            debug!("Blob {} awaiting push", info.digest);
        }
        Ok(info)
    }

    async fn has(&self, digest: &Digest) -> Result<bool, StoreError> {
        let mut conn = self.db.acquire().await?;
        Ok(cache_rows::get(&mut conn, digest.as_str()).await?.is_some())
    }

    async fn get_info(&self, digest: &Digest) -> Result<Option<BlobInfo>, StoreError> {
        let row = {
            let mut conn = self.db.acquire().await?;
            cache_rows::get(&mut conn, digest.as_str()).await?
        };
        match row {
            Some(row) => Ok(Some(BlobInfo {
                digest: digest.clone(),
                content_length: row.content_length as u64,
            })),
            // The origin may hold digests this table has never seen.
            None => self.origin.get_info(digest).await,
        }
    }

    async fn delete(&self, digest: &Digest) -> Result<(), StoreError> {
        if self.cache.has(digest).await? {
            self.cache.delete(digest).await?;
        }
        if self.origin.has(digest).await? {
            self.origin.delete(digest).await?;
        }
        let mut conn = self.db.acquire().await?;
        cache_rows::delete(&mut conn, digest.as_str()).await?;
        Ok(())
    }

    async fn iter(&self) -> Result<Vec<Digest>, StoreError> {
        let mut conn = self.db.acquire().await?;
        cache_rows::all_digests(&mut conn)
            .await?
            .into_iter()
            .map(|d| Digest::from_str(&d))
            .collect()
    }

    async fn clear(&self) -> Result<(), StoreError> {
        for digest in self.iter().await? {
            self.delete(&digest).await?;
        }
        Ok(())
    }
}


/// Spawn a background task that pushes unstored cache entries to the origin
/// periodically.
pub fn spawn_flush_task(
    cache: Arc<CacheStore>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    use tokio::time::{interval, Duration};

    info!(
        "Starting background cache flush task (interval: {} seconds)",
        interval_secs
    );

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(interval_secs));

        // Skip the first tick (which fires immediately)
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match cache.flush().await {
                Ok(pushed) => {
                    if pushed > 0 {
                        info!("Background flush pushed {} blobs", pushed);
                    }
                }
                Err(e) => {
                    warn!("Error during background flush: {}", e);
                }
            }
        }
    })
}
