//! Application state shared by all handlers

use std::sync::Arc;

use attic_attachments::{ArchiveBundler, AttachmentService};
use attic_thumbnails::{Placeholder, ThumbnailCache, ThumbnailSpecs, ThumbnailStore};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub attachments: AttachmentService,
    pub thumbnails: Arc<ThumbnailCache>,
    pub bundler: ArchiveBundler,
    pub specs: Arc<ThumbnailSpecs>,
    pub placeholder: Placeholder,
    /// `max-age` sent with attachment content
    pub cache_max_age_secs: u64,
}

impl AppState {
    pub fn new(
        attachments: AttachmentService,
        thumbnail_store: Arc<dyn ThumbnailStore>,
        specs: ThumbnailSpecs,
        placeholder: Placeholder,
        cache_max_age_secs: u64,
    ) -> Self {
        let bundler = ArchiveBundler::new(attachments.blob_store().clone());
        let thumbnails = Arc::new(ThumbnailCache::new(attachments.clone(), thumbnail_store));
        Self {
            attachments,
            thumbnails,
            bundler,
            specs: Arc::new(specs),
            placeholder,
            cache_max_age_secs,
        }
    }
}
