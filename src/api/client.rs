//! Splat API Client
//!
//! Provides bearer-authenticated access to the Splat asset API: fetch, list,
//! create, update, delete, multipart upload and token validation, plus the
//! plain download used to mirror assets locally.

use std::path::Path;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::errors::ApiError;
use super::DownloadSink;
use super::types::{
    is_present, CreateSplatRequest, Envelope, SplatRecord, UpdateSplatRequest, UploadedFile,
};
use crate::config::ApiConfig;

/// Multipart field name the upload endpoint expects
const UPLOAD_FIELD: &str = "file";

/// Splat API client for making authenticated requests
#[derive(Clone)]
pub struct SplatClient {
    /// HTTP client for API calls
    http_client: Client,
    /// HTTP client for asset downloads (longer timeout)
    download_client: Client,
    /// API base URL, without trailing slash
    base_url: String,
    /// Bearer token; empty means requests go out unauthenticated
    token: String,
}

impl SplatClient {
    /// Create a client from explicit configuration
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let download_client = Client::builder()
            .timeout(config.download_timeout)
            .build()
            .context("Failed to create download client")?;

        if config.token.is_empty() {
            warn!("No API token configured, requests will be sent without Authorization");
        }

        Ok(Self {
            http_client,
            download_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Build an endpoint URL
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Attach the bearer token, if any
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.token)
        }
    }

    /// Send a request and decode the JSON envelope regardless of HTTP status.
    /// Admin mutations report errors inside the envelope, so the body matters
    /// even on 4xx responses.
    async fn send_envelope<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Envelope<T>, ApiError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<Envelope<T>>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => Err(ApiError::HttpStatus(status.as_u16())),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch a single splat by ID
    ///
    /// Any non-200 status, malformed body, or missing/empty `responseObject`
    /// is an error; only a usable record is returned.
    pub async fn get_splat(&self, id: u64) -> Result<SplatRecord, ApiError> {
        if id == 0 {
            return Err(ApiError::invalid_id());
        }
        let url = self.url(&format!("get/{}", id));
        debug!(id = id, url = %url, "Fetching splat");

        let response = self.authorize(self.http_client.get(&url)).send().await?;
        if response.status() != StatusCode::OK {
            return Err(ApiError::HttpStatus(response.status().as_u16()));
        }

        let body = response.text().await?;
        debug!(id = id, bytes = body.len(), "Splat API response received");

        let data: Value = serde_json::from_str(&body)?;
        let object = data
            .get("responseObject")
            .filter(|v| is_present(v))
            .ok_or_else(ApiError::empty_response)?;

        Ok(serde_json::from_value(object.clone())?)
    }

    /// List one page of splats
    pub async fn list_splats(
        &self,
        limit: u32,
        page: u32,
    ) -> Result<Envelope<Vec<SplatRecord>>, ApiError> {
        let url = self.url("list");
        debug!(limit = limit, page = page, "Listing splats");

        let request = self
            .http_client
            .get(&url)
            .query(&[("limit", limit), ("page", page)]);
        self.send_envelope(request).await
    }

    /// Create a splat from previously uploaded files
    pub async fn create_splat(
        &self,
        payload: &CreateSplatRequest,
    ) -> Result<Envelope<Value>, ApiError> {
        info!(title = %payload.title, storage_id = %payload.storage_id, "Creating splat");
        let request = self.http_client.post(self.url("create")).json(payload);
        self.send_envelope(request).await
    }

    /// Update a splat's metadata
    pub async fn update_splat(
        &self,
        id: u64,
        payload: &UpdateSplatRequest,
    ) -> Result<Envelope<Value>, ApiError> {
        info!(id = id, "Updating splat");
        let request = self
            .http_client
            .put(self.url(&format!("update/{}", id)))
            .json(payload);
        self.send_envelope(request).await
    }

    /// Delete a splat
    pub async fn delete_splat(&self, id: u64) -> Result<Envelope<Value>, ApiError> {
        info!(id = id, "Deleting splat");
        let request = self.http_client.delete(self.url(&format!("delete/{}", id)));
        self.send_envelope(request).await
    }

    /// Validate the token and return the account behind it
    pub async fn me(&self) -> Result<Envelope<Value>, ApiError> {
        let request = self.http_client.post(self.url("me"));
        self.send_envelope(request).await
    }

    /// Upload a local file
    ///
    /// # Returns
    /// The storage identifier of the created file
    pub async fn upload_file(&self, path: &Path) -> Result<String, ApiError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ApiError::Upload(format!("Invalid file path: {}", path.display())))?
            .to_string();

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| ApiError::Upload(format!("{}: {}", path.display(), e)))?;
        let size = data.len();

        let part = Part::bytes(data)
            .file_name(file_name.clone())
            .mime_str(mime_for(path))
            .map_err(|e| ApiError::Upload(e.to_string()))?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        info!(file = %file_name, size = size, "Uploading file");

        let request = self.http_client.post(self.url("upload")).multipart(form);
        let envelope: Envelope<UploadedFile> = self.send_envelope(request).await?;

        if !envelope.success {
            return Err(ApiError::Upload(envelope.failure_message()));
        }
        let storage_id = envelope
            .response_object
            .and_then(|f| f.storage_id())
            .ok_or_else(|| ApiError::Upload("Upload response carried no file ID".to_string()))?;

        info!(file = %file_name, storage_id = %storage_id, "File uploaded");
        Ok(storage_id)
    }

    /// Stream a remote asset into `sink`
    ///
    /// Storage URLs are public, so no Authorization header is sent.
    ///
    /// # Returns
    /// Number of bytes written
    pub async fn download(&self, url: &str, sink: &mut DownloadSink) -> Result<u64, ApiError> {
        debug!(url = %url, "Downloading asset");

        let response = self.download_client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(ApiError::HttpStatus(response.status().as_u16()));
        }

        let written = copy_body(response, sink).await?;
        info!(url = %url, size = written, "Downloaded asset");
        Ok(written)
    }
}

/// Copy a response body chunk by chunk
async fn copy_body(mut response: Response, sink: &mut DownloadSink) -> Result<u64, ApiError> {
    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        sink.write_all(&chunk)
            .await
            .map_err(|e| ApiError::Mirror(e.to_string()))?;
        written += chunk.len() as u64;
    }
    sink.flush()
        .await
        .map_err(|e| ApiError::Mirror(e.to_string()))?;
    Ok(written)
}

/// MIME type sent with an uploaded file
fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
