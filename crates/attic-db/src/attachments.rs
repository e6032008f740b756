//! Attachment metadata in PostgreSQL

use std::collections::BTreeSet;

use async_trait::async_trait;
use attic_attachments::{Attachment, MetaError, MetaResult, MetaStore};
use attic_core::AttachmentId;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

const COLUMNS: &str = "id, owner_ids, group_ids, category, filename, content_type, \
                       content_length, content_hash, upload_time, width, height, derived_from";

/// Attachment row from database
#[derive(Debug, Clone, FromRow)]
pub struct AttachmentRow {
    pub id: String,
    pub owner_ids: Vec<String>,
    pub group_ids: Vec<String>,
    pub category: String,
    pub filename: String,
    pub content_type: String,
    pub content_length: i64,
    pub content_hash: String,
    pub upload_time: DateTime<Utc>,
    pub width: i32,
    pub height: i32,
    pub derived_from: Option<String>,
}

impl AttachmentRow {
    pub fn into_attachment(self) -> MetaResult<Attachment> {
        let corrupt = |reason: &str| MetaError::Corrupt {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        let content_length =
            u64::try_from(self.content_length).map_err(|_| corrupt("negative content_length"))?;
        let width = u32::try_from(self.width).map_err(|_| corrupt("negative width"))?;
        let height = u32::try_from(self.height).map_err(|_| corrupt("negative height"))?;

        Ok(Attachment {
            id: self.id,
            owner_ids: self.owner_ids.into_iter().collect(),
            group_ids: self.group_ids.into_iter().collect(),
            category: self.category,
            filename: self.filename,
            content_type: self.content_type,
            content_length,
            content_hash: self.content_hash,
            upload_time: self.upload_time,
            width,
            height,
            derived_from: self.derived_from,
            last_error: None,
        })
    }
}

fn to_vec(set: &BTreeSet<String>) -> Vec<String> {
    set.iter().cloned().collect()
}

fn backend(e: sqlx::Error) -> MetaError {
    MetaError::Backend(e.to_string())
}

fn into_attachments(rows: Vec<AttachmentRow>) -> MetaResult<Vec<Attachment>> {
    rows.into_iter().map(AttachmentRow::into_attachment).collect()
}

/// [`MetaStore`] over the `attic_attachments` table
#[derive(Clone)]
pub struct PgMetaStore {
    pool: PgPool,
}

impl PgMetaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetaStore for PgMetaStore {
    async fn put(&self, attachment: &Attachment) -> MetaResult<()> {
        let content_length = i64::try_from(attachment.content_length)
            .map_err(|_| MetaError::Backend("content_length out of range".into()))?;

        sqlx::query(
            r#"
            INSERT INTO attic_attachments
                (id, owner_ids, group_ids, category, filename, content_type,
                 content_length, content_hash, upload_time, width, height, derived_from)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                owner_ids = EXCLUDED.owner_ids,
                group_ids = EXCLUDED.group_ids,
                category = EXCLUDED.category,
                filename = EXCLUDED.filename,
                content_type = EXCLUDED.content_type,
                content_length = EXCLUDED.content_length,
                content_hash = EXCLUDED.content_hash,
                upload_time = EXCLUDED.upload_time,
                width = EXCLUDED.width,
                height = EXCLUDED.height,
                derived_from = EXCLUDED.derived_from
            "#,
        )
        .bind(&attachment.id)
        .bind(to_vec(&attachment.owner_ids))
        .bind(to_vec(&attachment.group_ids))
        .bind(&attachment.category)
        .bind(&attachment.filename)
        .bind(&attachment.content_type)
        .bind(content_length)
        .bind(&attachment.content_hash)
        .bind(attachment.upload_time)
        .bind(attachment.width as i32)
        .bind(attachment.height as i32)
        .bind(&attachment.derived_from)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn remove(&self, id: &str) -> MetaResult<bool> {
        let result = sqlx::query("DELETE FROM attic_attachments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(result.rows_affected() > 0)
    }

    async fn by_id(&self, id: &str) -> MetaResult<Option<Attachment>> {
        let row = sqlx::query_as::<_, AttachmentRow>(&format!(
            "SELECT {COLUMNS} FROM attic_attachments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(AttachmentRow::into_attachment).transpose()
    }

    async fn by_ids(&self, ids: &[AttachmentId]) -> MetaResult<Vec<Attachment>> {
        let rows = sqlx::query_as::<_, AttachmentRow>(&format!(
            "SELECT {COLUMNS} FROM attic_attachments WHERE id = ANY($1) ORDER BY upload_time, id"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        into_attachments(rows)
    }

    async fn by_owner_ids(&self, owner_ids: &[String]) -> MetaResult<Vec<Attachment>> {
        let rows = sqlx::query_as::<_, AttachmentRow>(&format!(
            "SELECT {COLUMNS} FROM attic_attachments WHERE owner_ids && $1 AND derived_from IS NULL ORDER BY upload_time, id"
        ))
        .bind(owner_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        into_attachments(rows)
    }

    async fn by_group_id(&self, group_id: &str) -> MetaResult<Vec<Attachment>> {
        let rows = sqlx::query_as::<_, AttachmentRow>(&format!(
            "SELECT {COLUMNS} FROM attic_attachments WHERE $1 = ANY(group_ids) AND derived_from IS NULL ORDER BY upload_time, id"
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        into_attachments(rows)
    }

    async fn count_by_owner_ids(&self, owner_ids: &[String]) -> MetaResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM attic_attachments WHERE owner_ids && $1 AND derived_from IS NULL",
        )
        .bind(owner_ids)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> AttachmentRow {
        AttachmentRow {
            id: "abc".to_string(),
            owner_ids: vec!["b".to_string(), "a".to_string()],
            group_ids: vec![String::new()],
            category: "posts".to_string(),
            filename: "a.png".to_string(),
            content_type: "image/png".to_string(),
            content_length: 42,
            content_hash: "h".to_string(),
            upload_time: Utc::now(),
            width: 10,
            height: 5,
            derived_from: None,
        }
    }

    #[test]
    fn test_row_into_attachment() {
        let attachment = row().into_attachment().unwrap();
        assert_eq!(attachment.content_length, 42);
        assert_eq!(
            attachment.owner_ids.iter().collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert!(attachment.group_ids.contains(""));
        assert_eq!(attachment.dimensions().map(|d| d.width), Some(10));
        assert!(attachment.last_error.is_none());
    }

    #[test]
    fn test_negative_values_are_corrupt() {
        let mut bad = row();
        bad.content_length = -1;
        assert!(matches!(
            bad.into_attachment(),
            Err(MetaError::Corrupt { .. })
        ));
    }
}
