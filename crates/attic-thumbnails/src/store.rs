//! Thumbnail record store

use std::collections::HashMap;

use async_trait::async_trait;
use attic_attachments::MetaResult;
use attic_core::ThumbnailId;
use tokio::sync::RwLock;

use crate::model::Thumbnail;

#[async_trait]
pub trait ThumbnailStore: Send + Sync {
    /// The thumbnail of `parent_id` for spec `name`
    async fn by_name(&self, parent_id: &str, name: &str) -> MetaResult<Option<Thumbnail>>;

    async fn by_parent(&self, parent_id: &str) -> MetaResult<Vec<Thumbnail>>;

    /// Insert or replace by id
    async fn put(&self, thumbnail: &Thumbnail) -> MetaResult<()>;

    /// Returns whether a record existed
    async fn remove(&self, id: &str) -> MetaResult<bool>;
}

/// In-memory thumbnail store
#[derive(Default)]
pub struct MemoryThumbnailStore {
    records: RwLock<HashMap<ThumbnailId, Thumbnail>>,
}

impl MemoryThumbnailStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ThumbnailStore for MemoryThumbnailStore {
    async fn by_name(&self, parent_id: &str, name: &str) -> MetaResult<Option<Thumbnail>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|t| t.parent_id == parent_id && t.name == name)
            .cloned())
    }

    async fn by_parent(&self, parent_id: &str) -> MetaResult<Vec<Thumbnail>> {
        let records = self.records.read().await;
        let mut found: Vec<Thumbnail> = records
            .values()
            .filter(|t| t.parent_id == parent_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn put(&self, thumbnail: &Thumbnail) -> MetaResult<()> {
        let mut records = self.records.write().await;
        records.insert(thumbnail.id.clone(), thumbnail.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> MetaResult<bool> {
        let mut records = self.records.write().await;
        Ok(records.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_by_name_and_parent() {
        let store = MemoryThumbnailStore::new();
        let icon = Thumbnail::new("p1", "b1", "icon", 10, 10);
        store.put(&icon).await.unwrap();
        store.put(&Thumbnail::new("p1", "b2", "preview", 80, 60)).await.unwrap();
        store.put(&Thumbnail::new("p2", "b3", "icon", 10, 10)).await.unwrap();

        assert_eq!(store.by_name("p1", "icon").await.unwrap(), Some(icon.clone()));
        assert!(store.by_name("p1", "square").await.unwrap().is_none());

        let children = store.by_parent("p1").await.unwrap();
        let names: Vec<_> = children.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["icon", "preview"]);

        assert!(store.remove(&icon.id).await.unwrap());
        assert!(!store.remove(&icon.id).await.unwrap());
        assert_eq!(store.len().await, 2);
    }
}
