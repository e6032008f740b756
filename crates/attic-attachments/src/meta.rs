//! Attachment metadata store
//!
//! [`MetaStore`] is keyed by attachment id. Listings come back ordered by
//! upload time, oldest first, with the id breaking ties. Owner and group
//! listings leave out derived attachments.

use std::collections::HashMap;

use async_trait::async_trait;
use attic_core::{AttachmentId, Classify, ErrorKind};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::model::Attachment;

/// Metadata store errors
#[derive(Debug, Error)]
pub enum MetaError {
    #[error("Metadata backend error: {0}")]
    Backend(String),
    #[error("Corrupt metadata record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

impl Classify for MetaError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Backend
    }
}

pub type MetaResult<T> = Result<T, MetaError>;

/// Metadata store for attachments
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// Insert or replace the record with the same id
    async fn put(&self, attachment: &Attachment) -> MetaResult<()>;

    /// Remove a record; returns whether one existed
    async fn remove(&self, id: &str) -> MetaResult<bool>;

    async fn by_id(&self, id: &str) -> MetaResult<Option<Attachment>>;

    /// Records for the given ids; unknown ids are skipped
    async fn by_ids(&self, ids: &[AttachmentId]) -> MetaResult<Vec<Attachment>>;

    /// Records owned by any of the given owners, derived ones excluded
    async fn by_owner_ids(&self, owner_ids: &[String]) -> MetaResult<Vec<Attachment>>;

    async fn by_group_id(&self, group_id: &str) -> MetaResult<Vec<Attachment>>;

    async fn count_by_owner_ids(&self, owner_ids: &[String]) -> MetaResult<u64>;
}

/// In-memory metadata store
#[derive(Default)]
pub struct MemoryMetaStore {
    records: RwLock<HashMap<AttachmentId, Attachment>>,
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn collect<F>(&self, filter: F) -> Vec<Attachment>
    where
        F: Fn(&Attachment) -> bool,
    {
        let records = self.records.read().await;
        let mut matched: Vec<Attachment> = records.values().filter(|a| filter(*a)).cloned().collect();
        sort_by_upload(&mut matched);
        matched
    }
}

fn sort_by_upload(attachments: &mut [Attachment]) {
    attachments.sort_by(|a, b| {
        a.upload_time
            .cmp(&b.upload_time)
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn owned_by_any(attachment: &Attachment, owner_ids: &[String]) -> bool {
    !attachment.is_derived() && owner_ids.iter().any(|o| attachment.owner_ids.contains(o))
}

#[async_trait]
impl MetaStore for MemoryMetaStore {
    async fn put(&self, attachment: &Attachment) -> MetaResult<()> {
        let mut stored = attachment.clone();
        stored.last_error = None;

        let mut records = self.records.write().await;
        records.insert(stored.id.clone(), stored);
        Ok(())
    }

    async fn remove(&self, id: &str) -> MetaResult<bool> {
        let mut records = self.records.write().await;
        Ok(records.remove(id).is_some())
    }

    async fn by_id(&self, id: &str) -> MetaResult<Option<Attachment>> {
        let records = self.records.read().await;
        Ok(records.get(id).cloned())
    }

    async fn by_ids(&self, ids: &[AttachmentId]) -> MetaResult<Vec<Attachment>> {
        Ok(self.collect(|a| ids.contains(&a.id)).await)
    }

    async fn by_owner_ids(&self, owner_ids: &[String]) -> MetaResult<Vec<Attachment>> {
        Ok(self.collect(|a| owned_by_any(a, owner_ids)).await)
    }

    async fn by_group_id(&self, group_id: &str) -> MetaResult<Vec<Attachment>> {
        Ok(self
            .collect(|a| !a.is_derived() && a.group_ids.contains(group_id))
            .await)
    }

    async fn count_by_owner_ids(&self, owner_ids: &[String]) -> MetaResult<u64> {
        let records = self.records.read().await;
        Ok(records.values().filter(|a| owned_by_any(a, owner_ids)).count() as u64)
    }
}
