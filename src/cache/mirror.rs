//! Local Asset Mirror
//!
//! Keeps byte copies of remote splat assets on local disk so repeat renders
//! are served locally. One flat directory, one `splat_<id>.splat` file per
//! asset, directory listing disabled.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::api::{ApiError, SplatBackend};

/// File name prefix of mirrored assets
const MIRROR_PREFIX: &str = "splat_";

/// File extension of mirrored assets
const MIRROR_EXT: &str = "splat";

/// Suffix of in-flight downloads
const TEMP_SUFFIX: &str = ".tmp";

/// Access-control file disabling directory listing
const HTACCESS: &str = "Options -Indexes\n";

/// Local disk mirror for downloaded assets
pub struct MirrorStore {
    /// Directory holding mirrored files
    mirror_dir: PathBuf,
    /// URL prefix under which `mirror_dir` is served, without trailing slash
    public_url: String,
}

impl MirrorStore {
    /// Create a mirror rooted at `mirror_dir`
    ///
    /// # Arguments
    /// * `mirror_dir` - Directory to store mirrored files
    /// * `public_url` - URL the directory is served under
    pub fn new(mirror_dir: PathBuf, public_url: &str) -> Result<Self> {
        fs::create_dir_all(&mirror_dir)
            .with_context(|| format!("Failed to create mirror directory: {:?}", mirror_dir))?;

        let mirror = Self {
            mirror_dir,
            public_url: public_url.trim_end_matches('/').to_string(),
        };
        mirror.protect()?;

        // Clean up any temp files left by interrupted downloads
        mirror.cleanup();

        info!(
            mirror_dir = %mirror.mirror_dir.display(),
            public_url = %mirror.public_url,
            "Mirror initialized"
        );

        Ok(mirror)
    }

    /// Disable directory listing with `.htaccess` and an empty `index.html`
    fn protect(&self) -> Result<()> {
        let htaccess = self.mirror_dir.join(".htaccess");
        if !htaccess.exists() {
            fs::write(&htaccess, HTACCESS)
                .with_context(|| format!("Failed to write {:?}", htaccess))?;
        }
        let index = self.mirror_dir.join("index.html");
        if !index.exists() {
            fs::write(&index, "").with_context(|| format!("Failed to write {:?}", index))?;
        }
        Ok(())
    }

    /// Deterministic file name for an asset ID
    pub fn file_name(id: u64) -> String {
        format!("{}{}.{}", MIRROR_PREFIX, id, MIRROR_EXT)
    }

    /// Local path of an asset's mirrored file
    pub fn local_path(&self, id: u64) -> PathBuf {
        self.mirror_dir.join(Self::file_name(id))
    }

    /// Public URL of an asset's mirrored file
    pub fn local_url(&self, id: u64) -> String {
        format!("{}/{}", self.public_url, Self::file_name(id))
    }

    /// Whether the asset's mirrored file exists
    pub fn contains(&self, id: u64) -> bool {
        self.local_path(id).is_file()
    }

    /// Mirror a remote asset, downloading only if no local copy exists
    ///
    /// Existence is the only check: a present file is trusted as-is.
    /// The download lands in a temp file that is renamed into place, so a
    /// concurrent reader never sees a partial file.
    ///
    /// # Returns
    /// Public URL of the local copy
    pub async fn mirror(
        &self,
        backend: &dyn SplatBackend,
        id: u64,
        remote_url: &str,
    ) -> Result<String, ApiError> {
        if self.contains(id) {
            debug!(id = id, "Mirror HIT");
            return Ok(self.local_url(id));
        }
        if remote_url.is_empty() {
            return Err(ApiError::Mirror("No storage URL to mirror".to_string()));
        }

        debug!(id = id, url = %remote_url, "Mirror MISS, downloading");

        let dir = self.mirror_dir.clone();
        let tmp = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(MIRROR_PREFIX)
                .suffix(TEMP_SUFFIX)
                .tempfile_in(&dir)
        })
        .await
        .map_err(|e| ApiError::Mirror(e.to_string()))?
        .map_err(|e| ApiError::Mirror(format!("Failed to create temp file: {}", e)))?;

        // Dropping `tmp` on error removes the partial download
        let handle = tmp
            .as_file()
            .try_clone()
            .map_err(|e| ApiError::Mirror(e.to_string()))?;
        let mut file = tokio::fs::File::from_std(handle);
        let size = backend.download(remote_url, &mut file).await?;
        drop(file);

        let local_path = self.local_path(id);
        let target = local_path.clone();
        tokio::task::spawn_blocking(move || tmp.persist(&target))
            .await
            .map_err(|e| ApiError::Mirror(e.to_string()))?
            .map_err(|e| {
                ApiError::Mirror(format!("Failed to persist {:?}: {}", local_path, e.error))
            })?;

        info!(
            id = id,
            local = %local_path.display(),
            size = size,
            "Mirrored asset"
        );

        Ok(self.local_url(id))
    }

    /// Delete an asset's mirrored file
    ///
    /// # Returns
    /// Whether a file was removed
    pub fn remove(&self, id: u64) -> bool {
        let local_path = self.local_path(id);
        if !local_path.exists() {
            return false;
        }
        match fs::remove_file(&local_path) {
            Ok(()) => {
                debug!(id = id, "Removed mirrored file");
                true
            }
            Err(e) => {
                warn!(path = %local_path.display(), error = %e, "Failed to remove mirrored file");
                false
            }
        }
    }

    /// Delete every mirrored file
    ///
    /// # Returns
    /// Number of files removed
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        for path in self.entries(|name| is_mirrored_name(name)) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove mirrored file")
                }
            }
        }
        info!(removed = removed, "Cleared mirror");
        removed
    }

    /// Remove stale temp files from interrupted downloads
    pub fn cleanup(&self) {
        for path in self.entries(|name| name.ends_with(TEMP_SUFFIX)) {
            debug!(path = %path.display(), "Removing stale temp file");
            let _ = fs::remove_file(&path);
        }
    }

    /// Paths of directory entries whose file name matches `filter`
    fn entries(&self, filter: impl Fn(&str) -> bool) -> Vec<PathBuf> {
        let Ok(read_dir) = fs::read_dir(&self.mirror_dir) else {
            return Vec::new();
        };
        read_dir
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(&filter)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Get the mirror directory path
    pub fn mirror_dir(&self) -> &Path {
        &self.mirror_dir
    }
}

/// `splat_<digits>.splat`
fn is_mirrored_name(name: &str) -> bool {
    name.strip_prefix(MIRROR_PREFIX)
        .and_then(|rest| rest.strip_suffix(".splat"))
        .map(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}
