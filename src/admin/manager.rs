//! Splat Manager - administrative flows
//!
//! Lists splats page by page, creates splats from uploaded files, and
//! applies updates and deletes, evicting the resolver's cache for the
//! affected asset whenever the API accepts a change.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::api::{
    AdminBackend, ApiError, CreateSplatRequest, Envelope, SplatRecord, UpdateSplatRequest,
};
use crate::resolver::SplatResolver;

/// Splats per listing page
pub const PAGE_SIZE: u32 = 10;

/// One page of the splat listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub splats: Vec<SplatRecord>,
    pub page: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl ListPage {
    /// Build a page, deriving the page count from the total
    pub fn new(splats: Vec<SplatRecord>, page: u32, total: u64) -> Self {
        let total_pages =
            u32::try_from(total.div_ceil(u64::from(PAGE_SIZE))).unwrap_or(u32::MAX);
        Self {
            splats,
            page,
            total,
            total_pages,
        }
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Input of the "add splat" flow
#[derive(Debug, Clone)]
pub struct NewSplat {
    /// Scene file, must be a `.splat`
    pub splat_file: PathBuf,
    /// Optional thumbnail image
    pub thumbnail_file: Option<PathBuf>,
    pub title: String,
    pub description: String,
    pub is_animated: bool,
}

impl NewSplat {
    /// Check inputs before anything is uploaded
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.title.trim().is_empty() {
            return Err(ApiError::Validation("Title is required".to_string()));
        }
        let is_splat = self
            .splat_file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("splat"))
            .unwrap_or(false);
        if !is_splat {
            return Err(ApiError::Upload(format!(
                "Only .splat files are accepted: {}",
                self.splat_file.display()
            )));
        }
        if !self.splat_file.is_file() {
            return Err(ApiError::Upload(format!(
                "File not found: {}",
                self.splat_file.display()
            )));
        }
        Ok(())
    }
}

/// Turn a `success: false` envelope into an error
fn accepted(envelope: Envelope<Value>) -> Result<Envelope<Value>, ApiError> {
    if envelope.success {
        Ok(envelope)
    } else {
        Err(ApiError::Rejected(envelope.failure_message()))
    }
}

/// Administrative operations over the API and the resolver cache
pub struct SplatManager {
    client: Arc<dyn AdminBackend>,
    resolver: Arc<SplatResolver>,
}

impl SplatManager {
    pub fn new(client: Arc<dyn AdminBackend>, resolver: Arc<SplatResolver>) -> Self {
        Self { client, resolver }
    }

    /// Fetch one listing page; pages start at 1
    pub async fn list(&self, page: u32) -> Result<ListPage, ApiError> {
        let page = page.max(1);
        let envelope = self.client.list_splats(PAGE_SIZE, page).await?;
        if !envelope.success {
            return Err(ApiError::Rejected(envelope.failure_message()));
        }
        let total = envelope.total.unwrap_or(0);
        let splats = envelope.response_object.unwrap_or_default();
        Ok(ListPage::new(splats, page, total))
    }

    /// Upload the files and create the splat
    ///
    /// A failed scene upload aborts; a failed thumbnail upload only leaves
    /// the thumbnail unset.
    pub async fn create(&self, new: &NewSplat) -> Result<Envelope<Value>, ApiError> {
        new.validate()?;

        let storage_id = self.client.upload_file(&new.splat_file).await?;

        let thumbnail_id = match &new.thumbnail_file {
            Some(path) => match self.client.upload_file(path).await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Thumbnail upload failed, continuing without");
                    None
                }
            },
            None => None,
        };

        let payload = CreateSplatRequest {
            storage_id,
            title: new.title.trim().to_string(),
            description: new.description.trim().to_string(),
            thumbnail_id,
            is_animated: new.is_animated,
        };

        let envelope = accepted(self.client.create_splat(&payload).await?)?;
        info!(title = %payload.title, "Splat created");
        Ok(envelope)
    }

    /// Update a splat and evict its cached state
    pub async fn update(
        &self,
        id: u64,
        payload: &UpdateSplatRequest,
    ) -> Result<Envelope<Value>, ApiError> {
        if id == 0 {
            return Err(ApiError::invalid_id());
        }
        let envelope = accepted(self.client.update_splat(id, payload).await?)?;
        self.resolver.invalidate(id);
        Ok(envelope)
    }

    /// Delete a splat and evict its cached state
    pub async fn delete(&self, id: u64) -> Result<Envelope<Value>, ApiError> {
        if id == 0 {
            return Err(ApiError::invalid_id());
        }
        let envelope = accepted(self.client.delete_splat(id).await?)?;
        self.resolver.invalidate(id);
        Ok(envelope)
    }

    /// Check the configured token against the API
    pub async fn whoami(&self) -> Result<Envelope<Value>, ApiError> {
        accepted(self.client.me().await?)
    }
}
