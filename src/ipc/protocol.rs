//! IPC protocol definitions
//!
//! Newline-delimited JSON exchanged over a Unix domain socket between the
//! page-rendering front end and the daemon. Each request is answered by
//! exactly one response line.

use serde::{Deserialize, Serialize};

use crate::resolver::{ClearStats, SplatDescriptor};

/// Protocol version for future compatibility
pub const PROTOCOL_VERSION: u32 = 1;

/// Requests sent by the front end
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Render an embed directive to HTML
    Render {
        /// Directive text, e.g. `[splat id='3' animate]`
        directive: String,
    },
    /// Resolve an asset to its descriptor
    Resolve {
        id: u64,
        #[serde(default)]
        animate: bool,
    },
    /// An asset was updated or deleted
    Invalidate { id: u64 },
    /// Drop every cached entry and mirrored file
    InvalidateAll,
    /// Get daemon status and cache statistics
    GetStatus,
}

/// Responses sent back to the front end
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    /// Success response
    #[serde(rename_all = "camelCase")]
    Success {
        /// Optional success message
        message: Option<String>,
    },
    /// Error response
    #[serde(rename_all = "camelCase")]
    Error {
        /// Error message
        error: String,
    },
    /// Rendered embed markup
    #[serde(rename_all = "camelCase")]
    Html { html: String },
    /// Resolved asset
    #[serde(rename_all = "camelCase")]
    Descriptor { descriptor: SplatDescriptor },
    /// Result of a global clear
    #[serde(rename_all = "camelCase")]
    Cleared { cleared: ClearStats },
    /// Status response with cache statistics
    #[serde(rename_all = "camelCase")]
    Status {
        /// Protocol version
        version: u32,
        /// Live cache entries
        cache_entries: u64,
        hits: u64,
        misses: u64,
        /// Directory holding mirrored files
        mirror_dir: String,
    },
}

/// Parse a JSON command from bytes
pub fn parse_command(data: &[u8]) -> Result<Command, serde_json::Error> {
    serde_json::from_slice(data)
}

/// Serialize a response to JSON bytes
pub fn serialize_response(response: &Response) -> Result<Vec<u8>, serde_json::Error> {
    let mut json = serde_json::to_vec(response)?;
    json.push(b'\n'); // Add newline delimiter
    Ok(json)
}
