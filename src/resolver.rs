//! Cached Asset Resolver
//!
//! Resolves a splat ID to a display-ready descriptor. Lookups go local-path
//! entry → metadata entry → API, and every successful lookup tries to mirror
//! the asset so later renders are served from local storage.
//!
//! Failures are returned, never raised: a mirror failure degrades to the
//! remote URL, and API failures are not cached so the next render retries.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{ApiError, Envelope, SplatBackend, SplatRecord};
use crate::cache::{CacheStore, MirrorStore};
use crate::config::CacheConfig;

/// Prefix shared by every key the resolver writes
pub const CACHE_PREFIX: &str = "gv_splat_";

/// Thumbnail shown when a splat has none
pub const FALLBACK_THUMBNAIL_URL: &str =
    "https://staging.green-view.nl/images/splat-placeholder.png";

/// Display-ready description of a splat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplatDescriptor {
    /// Local URL when mirrored, remote storage URL otherwise
    pub src: String,
    pub title: String,
    pub thumbnail_url: String,
    pub animate: bool,
}

impl SplatDescriptor {
    /// Assemble a descriptor, substituting the fallback thumbnail
    pub fn assemble(src: &str, title: &str, thumbnail_url: Option<&str>, animate: bool) -> Self {
        let thumbnail_url = thumbnail_url
            .filter(|t| !t.is_empty())
            .unwrap_or(FALLBACK_THUMBNAIL_URL);
        Self {
            src: src.to_string(),
            title: title.to_string(),
            thumbnail_url: thumbnail_url.to_string(),
            animate,
        }
    }
}

/// Value of a local-path entry: the mirrored URL plus what the fast path
/// needs to build a descriptor without the metadata entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MirroredEntry {
    local_url: String,
    title: String,
    thumbnail_url: Option<String>,
}

/// Counts returned by a global clear
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearStats {
    pub entries: usize,
    pub files: usize,
}

fn metadata_key(id: u64) -> String {
    format!("{}data_{}", CACHE_PREFIX, id)
}

fn local_key(id: u64) -> String {
    format!("{}local_{}", CACHE_PREFIX, id)
}

/// Resolves splat IDs through the two-tier cache and the local mirror
pub struct SplatResolver {
    backend: Arc<dyn SplatBackend>,
    store: Arc<dyn CacheStore>,
    mirror: MirrorStore,
    metadata_ttl: Duration,
    mirror_ttl: Duration,
}

impl SplatResolver {
    /// Create a resolver over explicit collaborators
    pub fn new(
        backend: Arc<dyn SplatBackend>,
        store: Arc<dyn CacheStore>,
        mirror: MirrorStore,
        config: &CacheConfig,
    ) -> Self {
        Self {
            backend,
            store,
            mirror,
            metadata_ttl: config.metadata_ttl,
            mirror_ttl: config.mirror_ttl,
        }
    }

    /// Resolve a splat ID to a descriptor
    ///
    /// ID 0 is rejected before any cache or network access.
    pub async fn resolve(&self, id: u64, animate: bool) -> Result<SplatDescriptor, ApiError> {
        if id == 0 {
            return Err(ApiError::invalid_id());
        }

        if let Some(entry) = self.cached_mirror(id) {
            debug!(id = id, "Resolved from mirror entry");
            return Ok(SplatDescriptor::assemble(
                &entry.local_url,
                &entry.title,
                entry.thumbnail_url.as_deref(),
                animate,
            ));
        }

        let record = match self.cached_metadata(id) {
            Some(record) => record,
            None => self.fetch(id).await?,
        };

        let src = match self.mirror_record(id, &record).await {
            Some(local_url) => local_url,
            None => record.storage_url.clone(),
        };

        Ok(SplatDescriptor::assemble(
            &src,
            &record.title,
            record.thumbnail_url.as_deref(),
            animate,
        ))
    }

    /// Evict both entries of an asset and delete its mirrored file.
    /// Called when the asset is updated or deleted.
    pub fn invalidate(&self, id: u64) {
        self.store.delete(&metadata_key(id));
        self.store.delete(&local_key(id));
        let removed = self.mirror.remove(id);
        info!(id = id, file_removed = removed, "Invalidated splat");
    }

    /// Evict every resolver entry and delete every mirrored file
    pub fn invalidate_all(&self) -> ClearStats {
        let stats = ClearStats {
            entries: self.store.delete_prefix(CACHE_PREFIX),
            files: self.mirror.clear(),
        };
        info!(entries = stats.entries, files = stats.files, "Cleared splat cache");
        stats
    }

    /// Mirror backing this resolver
    pub fn mirror(&self) -> &MirrorStore {
        &self.mirror
    }

    /// Local-path entry, if present and its file still exists
    fn cached_mirror(&self, id: u64) -> Option<MirroredEntry> {
        let key = local_key(id);
        let raw = self.store.get(&key)?;

        let entry = match serde_json::from_str::<MirroredEntry>(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(id = id, error = %e, "Dropping unreadable mirror entry");
                self.store.delete(&key);
                return None;
            }
        };

        if !self.mirror.contains(id) {
            debug!(id = id, "Mirrored file missing, dropping mirror entry");
            self.store.delete(&key);
            return None;
        }

        Some(entry)
    }

    /// Record from the metadata entry, if present
    fn cached_metadata(&self, id: u64) -> Option<SplatRecord> {
        let key = metadata_key(id);
        let raw = self.store.get(&key)?;

        match serde_json::from_str::<Envelope<SplatRecord>>(&raw) {
            Ok(Envelope {
                success: true,
                response_object: Some(record),
                ..
            }) => {
                debug!(id = id, "Resolved from metadata entry");
                Some(record)
            }
            _ => {
                warn!(id = id, "Dropping unreadable metadata entry");
                self.store.delete(&key);
                None
            }
        }
    }

    /// Fetch from the API and cache the result if it is usable
    async fn fetch(&self, id: u64) -> Result<SplatRecord, ApiError> {
        let record = match self.backend.fetch_splat(id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(id = id, error = %e, transient = e.is_transient(), "Failed to fetch splat");
                return Err(e);
            }
        };

        if record.storage_url.is_empty() {
            warn!(id = id, "Splat has no storage URL");
            return Err(ApiError::empty_response());
        }

        match serde_json::to_string(&Envelope::ok(&record)) {
            Ok(json) => self.store.set(&metadata_key(id), json, self.metadata_ttl),
            Err(e) => warn!(id = id, error = %e, "Failed to cache splat metadata"),
        }

        Ok(record)
    }

    /// Mirror the record's asset and write the local-path entry
    ///
    /// # Returns
    /// Local URL on success, None when the remote URL should be used
    async fn mirror_record(&self, id: u64, record: &SplatRecord) -> Option<String> {
        let local_url = match self
            .mirror
            .mirror(self.backend.as_ref(), id, &record.storage_url)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                warn!(id = id, error = %e, "Mirroring failed, serving remote URL");
                return None;
            }
        };

        let entry = MirroredEntry {
            local_url: local_url.clone(),
            title: record.title.clone(),
            thumbnail_url: record.thumbnail_url.clone(),
        };
        match serde_json::to_string(&entry) {
            Ok(json) => self.store.set(&local_key(id), json, self.mirror_ttl),
            Err(e) => warn!(id = id, error = %e, "Failed to cache mirror entry"),
        }

        Some(local_url)
    }
}
