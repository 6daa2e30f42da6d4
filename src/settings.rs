//! Persisted settings
//!
//! Holds the API bearer token set by the administrator. Stored as JSON and
//! replaced atomically so a crash never leaves a truncated file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Administrator-editable settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// API bearer token
    #[serde(default)]
    pub token: String,
}

impl Settings {
    /// `<config dir>/splat-proxy/settings.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("splat-proxy")
            .join("settings.json")
    }

    /// Load settings, returning defaults when the file does not exist yet
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings: {:?}", path))
    }

    /// Write settings atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create settings directory: {:?}", parent))?;

        let json = serde_json::to_vec_pretty(self).context("Failed to serialize settings")?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .context("Failed to create temp file for settings")?;
        tmp.write_all(&json).context("Failed to write settings")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))
                .context("Failed to set settings permissions")?;
        }

        tmp.persist(path)
            .with_context(|| format!("Failed to persist settings: {:?}", path))?;

        info!(path = %path.display(), "Settings saved");
        Ok(())
    }

    /// Replace the stored token; only presence is checked
    pub fn set_token(&mut self, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            anyhow::bail!("Token must not be empty");
        }
        self.token = token.to_string();
        Ok(())
    }
}
