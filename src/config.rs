//! Runtime configuration
//!
//! Built once at startup from environment variables, falling back to the
//! persisted settings for the token, and passed explicitly to the client and
//! resolver.

use std::path::PathBuf;
use std::time::Duration;

use crate::settings::Settings;

/// Default API base URL
const DEFAULT_API_URL: &str = "https://api-stg.green-view.nl/splat-wp";

/// Default IPC socket path
const DEFAULT_SOCKET_PATH: &str = "/tmp/splat-proxy.sock";

/// Remote API settings
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// API base URL
    pub base_url: String,
    /// Bearer token (may be empty)
    pub token: String,
    /// Timeout for API calls
    pub request_timeout: Duration,
    /// Timeout for asset downloads, sized for large scenes
    pub download_timeout: Duration,
}

/// Cache and mirror settings
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding mirrored `splat_<id>.splat` files
    pub mirror_dir: PathBuf,
    /// URL prefix under which `mirror_dir` is served
    pub public_url: String,
    /// TTL of metadata entries
    pub metadata_ttl: Duration,
    /// TTL of local-path entries
    pub mirror_ttl: Duration,
}

/// Full daemon configuration
#[derive(Debug, Clone)]
pub struct SplatConfig {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    /// Unix socket for the render service
    pub socket_path: PathBuf,
}

impl SplatConfig {
    /// Build configuration from the environment
    ///
    /// `SPLAT_API_TOKEN` takes precedence over the persisted token.
    pub fn from_env(settings: &Settings) -> Self {
        let mirror_dir = std::env::var("SPLAT_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_mirror_dir());

        let public_url = std::env::var("SPLAT_PUBLIC_URL")
            .unwrap_or_else(|_| format!("file://{}", mirror_dir.display()));

        Self {
            api: ApiConfig {
                base_url: std::env::var("SPLAT_API_URL")
                    .unwrap_or_else(|_| DEFAULT_API_URL.into()),
                token: std::env::var("SPLAT_API_TOKEN")
                    .ok()
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| settings.token.clone()),
                request_timeout: secs_from_env("SPLAT_REQUEST_TIMEOUT_SECS", 30),
                download_timeout: secs_from_env("SPLAT_DOWNLOAD_TIMEOUT_SECS", 300),
            },
            cache: CacheConfig {
                mirror_dir,
                public_url,
                metadata_ttl: secs_from_env("SPLAT_METADATA_TTL_SECS", 3600),
                mirror_ttl: secs_from_env("SPLAT_MIRROR_TTL_SECS", 86_400),
            },
            socket_path: std::env::var("SPLAT_SOCKET")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_SOCKET_PATH)),
        }
    }
}

/// `<cache dir>/splat-proxy/splats`
fn default_mirror_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("splat-proxy")
        .join("splats")
}

fn secs_from_env(key: &str, default: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}
