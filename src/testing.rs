//! In-process backend for tests

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;

use crate::api::{
    AdminBackend, ApiError, CreateSplatRequest, DownloadSink, Envelope, SplatBackend,
    SplatRecord, UpdateSplatRequest,
};

/// Fake remote API that counts every call
#[derive(Default)]
pub struct FakeBackend {
    records: Mutex<HashMap<u64, Result<SplatRecord, ApiError>>>,
    assets: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
    downloads: AtomicUsize,
    /// File names whose upload fails
    failing_uploads: Mutex<HashSet<String>>,
    /// Message of a `success: false` answer to every mutation, if set
    rejection: Mutex<Option<String>>,
    created: Mutex<Vec<CreateSplatRequest>>,
    uploads: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `record` for its ID and `bytes` at its storage URL
    pub fn add_splat(&self, record: SplatRecord, bytes: &[u8]) {
        self.add_asset(&record.storage_url, bytes);
        self.records.lock().unwrap().insert(record.id, Ok(record));
    }

    /// Make fetches of `id` fail with `error`
    pub fn fail_fetch(&self, id: u64, error: ApiError) {
        self.records.lock().unwrap().insert(id, Err(error));
    }

    pub fn add_asset(&self, url: &str, bytes: &[u8]) {
        self.assets
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes.to_vec());
    }

    /// Make downloads of `url` fail
    pub fn remove_asset(&self, url: &str) {
        self.assets.lock().unwrap().remove(url);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    /// Make uploads of files named `file_name` fail
    pub fn fail_upload(&self, file_name: &str) {
        self.failing_uploads
            .lock()
            .unwrap()
            .insert(file_name.to_string());
    }

    /// Answer every mutation with `success: false`
    pub fn reject_mutations(&self, message: &str) {
        *self.rejection.lock().unwrap() = Some(message.to_string());
    }

    /// Payloads received by `create_splat`
    pub fn created(&self) -> Vec<CreateSplatRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn upload_calls(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    fn mutation_reply(&self, object: Value) -> Envelope<Value> {
        match self.rejection.lock().unwrap().as_deref() {
            Some(message) => Envelope::failure(message),
            None => Envelope::ok(object),
        }
    }
}

/// Record as the API returns it for a test ID
pub fn record(id: u64) -> SplatRecord {
    SplatRecord {
        id,
        title: format!("Scene {}", id),
        description: String::new(),
        slug: format!("scene-{}", id),
        thumbnail_url: Some(format!("https://cdn.example/thumb_{}.png", id)),
        storage_url: format!("https://cdn.example/scene_{}.splat", id),
        is_animated: false,
        created_at: None,
    }
}

#[async_trait]
impl SplatBackend for FakeBackend {
    async fn fetch_splat(&self, id: u64) -> Result<SplatRecord, ApiError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or(Err(ApiError::HttpStatus(404)))
    }

    async fn download(&self, url: &str, sink: &mut DownloadSink) -> Result<u64, ApiError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let bytes = self
            .assets
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(ApiError::HttpStatus(404))?;
        sink.write_all(&bytes)
            .await
            .map_err(|e| ApiError::Mirror(e.to_string()))?;
        sink.flush()
            .await
            .map_err(|e| ApiError::Mirror(e.to_string()))?;
        Ok(bytes.len() as u64)
    }
}

#[async_trait]
impl AdminBackend for FakeBackend {
    async fn list_splats(
        &self,
        _limit: u32,
        _page: u32,
    ) -> Result<Envelope<Vec<SplatRecord>>, ApiError> {
        let records: Vec<SplatRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter_map(|r| r.clone().ok())
            .collect();
        let mut envelope = Envelope::ok(records);
        envelope.total = envelope.response_object.as_ref().map(|r| r.len() as u64);
        Ok(envelope)
    }

    async fn upload_file(&self, path: &Path) -> Result<String, ApiError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        if self.failing_uploads.lock().unwrap().contains(&name) {
            return Err(ApiError::Upload(format!("{}: rejected", name)));
        }
        Ok(format!("storage-{}", name))
    }

    async fn create_splat(
        &self,
        payload: &CreateSplatRequest,
    ) -> Result<Envelope<Value>, ApiError> {
        self.created.lock().unwrap().push(payload.clone());
        Ok(self.mutation_reply(json!({ "id": 100 })))
    }

    async fn update_splat(
        &self,
        id: u64,
        _payload: &UpdateSplatRequest,
    ) -> Result<Envelope<Value>, ApiError> {
        Ok(self.mutation_reply(json!({ "id": id })))
    }

    async fn delete_splat(&self, id: u64) -> Result<Envelope<Value>, ApiError> {
        Ok(self.mutation_reply(json!({ "id": id })))
    }

    async fn me(&self) -> Result<Envelope<Value>, ApiError> {
        Ok(self.mutation_reply(json!({ "name": "tester" })))
    }
}
