//! Backend seams over the remote API
//!
//! The resolver only needs two things from the network: fetch a record and
//! download an asset. The admin flows need the mutating endpoints. Keeping
//! both behind traits lets them run against an in-process fake.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWrite;

use super::client::SplatClient;
use super::errors::ApiError;
use super::types::{CreateSplatRequest, Envelope, SplatRecord, UpdateSplatRequest};

/// Async byte sink a download streams into
pub type DownloadSink = dyn AsyncWrite + Send + Unpin;

/// Remote operations the resolver depends on
#[async_trait]
pub trait SplatBackend: Send + Sync {
    /// Fetch a splat record by ID
    async fn fetch_splat(&self, id: u64) -> Result<SplatRecord, ApiError>;

    /// Stream the asset at `url` into `sink`, returning the byte count
    async fn download(&self, url: &str, sink: &mut DownloadSink) -> Result<u64, ApiError>;
}

/// Remote operations the admin flows depend on
#[async_trait]
pub trait AdminBackend: Send + Sync {
    async fn list_splats(
        &self,
        limit: u32,
        page: u32,
    ) -> Result<Envelope<Vec<SplatRecord>>, ApiError>;

    /// Upload a local file, returning its storage identifier
    async fn upload_file(&self, path: &Path) -> Result<String, ApiError>;

    async fn create_splat(&self, payload: &CreateSplatRequest)
        -> Result<Envelope<Value>, ApiError>;

    async fn update_splat(
        &self,
        id: u64,
        payload: &UpdateSplatRequest,
    ) -> Result<Envelope<Value>, ApiError>;

    async fn delete_splat(&self, id: u64) -> Result<Envelope<Value>, ApiError>;

    async fn me(&self) -> Result<Envelope<Value>, ApiError>;
}

#[async_trait]
impl SplatBackend for SplatClient {
    async fn fetch_splat(&self, id: u64) -> Result<SplatRecord, ApiError> {
        self.get_splat(id).await
    }

    async fn download(&self, url: &str, sink: &mut DownloadSink) -> Result<u64, ApiError> {
        SplatClient::download(self, url, sink).await
    }
}

#[async_trait]
impl AdminBackend for SplatClient {
    async fn list_splats(
        &self,
        limit: u32,
        page: u32,
    ) -> Result<Envelope<Vec<SplatRecord>>, ApiError> {
        SplatClient::list_splats(self, limit, page).await
    }

    async fn upload_file(&self, path: &Path) -> Result<String, ApiError> {
        SplatClient::upload_file(self, path).await
    }

    async fn create_splat(
        &self,
        payload: &CreateSplatRequest,
    ) -> Result<Envelope<Value>, ApiError> {
        SplatClient::create_splat(self, payload).await
    }

    async fn update_splat(
        &self,
        id: u64,
        payload: &UpdateSplatRequest,
    ) -> Result<Envelope<Value>, ApiError> {
        SplatClient::update_splat(self, id, payload).await
    }

    async fn delete_splat(&self, id: u64) -> Result<Envelope<Value>, ApiError> {
        SplatClient::delete_splat(self, id).await
    }

    async fn me(&self) -> Result<Envelope<Value>, ApiError> {
        SplatClient::me(self).await
    }
}
