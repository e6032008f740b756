//! Derived thumbnail cache
//!
//! Thumbnails are generated on the first read and stored as derived
//! attachments. Generation for one `(parent, spec name)` pair is
//! single-flight: concurrent misses wait on a per-key mutex and re-check
//! the store once they hold it, so exactly one derived attachment is
//! written.
//!
//! A record whose derived body has gone missing counts as a miss. A
//! generation that finishes after its parent was deleted removes what it
//! wrote.

use std::sync::Arc;

use attic_attachments::{AttachmentError, AttachmentService, DeleteOutcome};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{ThumbnailError, ThumbnailResult};
use crate::model::Thumbnail;
use crate::resize::resize;
use crate::spec::ThumbnailSpec;
use crate::store::ThumbnailStore;

type FlightKey = (String, String);
type FlightLocks = DashMap<FlightKey, Arc<Mutex<()>>>;

/// Holds one reference to a per-key mutex; the map entry is evicted when
/// the last lease for it is dropped, cancellation included.
struct FlightLease<'a> {
    locks: &'a FlightLocks,
    key: FlightKey,
    lock: Arc<Mutex<()>>,
}

impl<'a> FlightLease<'a> {
    fn acquire(locks: &'a FlightLocks, key: FlightKey) -> Self {
        let lock = locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Self { locks, key, lock }
    }
}

impl Drop for FlightLease<'_> {
    fn drop(&mut self) {
        // Only the map and this lease still reference the mutex
        self.locks.remove_if(&self.key, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}

pub struct ThumbnailCache {
    attachments: AttachmentService,
    thumbnails: Arc<dyn ThumbnailStore>,
    in_flight: FlightLocks,
}

impl ThumbnailCache {
    pub fn new(attachments: AttachmentService, thumbnails: Arc<dyn ThumbnailStore>) -> Self {
        Self {
            attachments,
            thumbnails,
            in_flight: DashMap::new(),
        }
    }

    pub fn attachments(&self) -> &AttachmentService {
        &self.attachments
    }

    /// Return the thumbnail of `parent_id` for `spec`, generating it on a miss.
    ///
    /// `Ok(None)` means the parent has no bytes to resize; callers serve a
    /// placeholder.
    #[instrument(skip(self, spec), fields(spec = %spec.name))]
    pub async fn get_or_create(
        &self,
        parent_id: &str,
        spec: &ThumbnailSpec,
    ) -> ThumbnailResult<Option<Thumbnail>> {
        spec.validate()?;

        if let Some(existing) = self.lookup(parent_id, &spec.name).await? {
            if self.attachments.exists(&existing.body_id).await? {
                return Ok(Some(existing));
            }
        }

        let lease = FlightLease::acquire(
            &self.in_flight,
            (parent_id.to_string(), spec.name.clone()),
        );
        let _guard = lease.lock.lock().await;

        // Another caller may have finished while we waited
        if let Some(existing) = self.lookup(parent_id, &spec.name).await? {
            if self.attachments.exists(&existing.body_id).await? {
                debug!(parent_id, "Thumbnail generated by a concurrent request");
                return Ok(Some(existing));
            }
            self.discard(&existing).await?;
        }

        self.generate(parent_id, spec).await
    }

    /// Drop a record whose body is gone, along with any leftover blob
    async fn discard(&self, stale: &Thumbnail) -> ThumbnailResult<()> {
        warn!(
            parent_id = %stale.parent_id,
            body_id = %stale.body_id,
            "Thumbnail body missing, regenerating"
        );
        self.attachments.purge(&stale.body_id).await?;
        self.thumbnails
            .remove(&stale.id)
            .await
            .map_err(ThumbnailError::store("remove"))?;
        Ok(())
    }

    async fn lookup(&self, parent_id: &str, name: &str) -> ThumbnailResult<Option<Thumbnail>> {
        self.thumbnails
            .by_name(parent_id, name)
            .await
            .map_err(ThumbnailError::store("by_name"))
    }

    async fn generate(
        &self,
        parent_id: &str,
        spec: &ThumbnailSpec,
    ) -> ThumbnailResult<Option<Thumbnail>> {
        let parent = self.attachments.fetch(parent_id).await?;
        let data = self.attachments.read_all(parent_id).await?;
        if data.is_empty() {
            debug!(parent_id, "Parent has no bytes, skipping thumbnail");
            return Ok(None);
        }

        let target = spec.clone();
        let resized = tokio::task::spawn_blocking(move || resize(&data, &target)).await??;

        let derived = self
            .attachments
            .create_derived(&parent, resized.content_type(), resized.bytes.clone())
            .await?;

        let thumbnail = Thumbnail::new(
            parent_id,
            derived.id.clone(),
            spec.name.clone(),
            resized.width,
            resized.height,
        );

        if let Err(e) = self.thumbnails.put(&thumbnail).await {
            if let Err(cleanup) = self.attachments.purge(&derived.id).await {
                warn!(id = %derived.id, error = %cleanup, "Failed to remove orphaned thumbnail body");
            }
            return Err(ThumbnailError::store("put")(e));
        }

        // The parent may have been deleted, and its cascade run, while we resized
        if !self.attachments.exists(parent_id).await? {
            info!(parent_id, body_id = %derived.id, "Parent deleted during generation");
            self.attachments.purge(&derived.id).await?;
            self.thumbnails
                .remove(&thumbnail.id)
                .await
                .map_err(ThumbnailError::store("remove"))?;
            return Err(AttachmentError::NotFound(parent_id.to_string()).into());
        }

        info!(
            parent_id,
            body_id = %thumbnail.body_id,
            width = thumbnail.width,
            height = thumbnail.height,
            "Thumbnail generated"
        );

        Ok(Some(thumbnail))
    }

    /// Remove every thumbnail of `parent_id` along with its derived
    /// attachment. Returns how many were removed.
    #[instrument(skip(self))]
    pub async fn cascade_delete(&self, parent_id: &str) -> ThumbnailResult<usize> {
        let thumbnails = self
            .thumbnails
            .by_parent(parent_id)
            .await
            .map_err(ThumbnailError::store("by_parent"))?;

        for thumbnail in &thumbnails {
            self.attachments.purge(&thumbnail.body_id).await?;
            self.thumbnails
                .remove(&thumbnail.id)
                .await
                .map_err(ThumbnailError::store("remove"))?;
        }

        if !thumbnails.is_empty() {
            info!(count = thumbnails.len(), "Thumbnails removed");
        }
        Ok(thumbnails.len())
    }

    /// Delete one owner's reference to an attachment, removing its
    /// thumbnails once the attachment itself is gone
    pub async fn delete_attachment(
        &self,
        id: &str,
        owner_id: &str,
        group_id: &str,
    ) -> ThumbnailResult<DeleteOutcome> {
        let outcome = self.attachments.delete(id, owner_id, group_id).await?;
        if outcome.fully_deleted {
            self.cascade_delete(id).await?;
        }
        Ok(outcome)
    }

    /// Number of keys with a generation in progress
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
