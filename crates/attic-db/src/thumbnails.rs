//! Thumbnail records in PostgreSQL

use async_trait::async_trait;
use attic_attachments::{MetaError, MetaResult};
use attic_thumbnails::{Thumbnail, ThumbnailStore};
use sqlx::{FromRow, PgPool};

/// Thumbnail row from database
#[derive(Debug, Clone, FromRow)]
pub struct ThumbnailRow {
    pub id: String,
    pub parent_id: String,
    pub body_id: String,
    pub name: String,
    pub width: i32,
    pub height: i32,
}

impl From<ThumbnailRow> for Thumbnail {
    fn from(row: ThumbnailRow) -> Self {
        Self {
            id: row.id,
            parent_id: row.parent_id,
            body_id: row.body_id,
            name: row.name,
            width: row.width.max(0) as u32,
            height: row.height.max(0) as u32,
        }
    }
}

fn backend(e: sqlx::Error) -> MetaError {
    MetaError::Backend(e.to_string())
}

/// [`ThumbnailStore`] over the `attic_thumbnails` table
#[derive(Clone)]
pub struct PgThumbnailStore {
    pool: PgPool,
}

impl PgThumbnailStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ThumbnailStore for PgThumbnailStore {
    async fn by_name(&self, parent_id: &str, name: &str) -> MetaResult<Option<Thumbnail>> {
        let row = sqlx::query_as::<_, ThumbnailRow>(
            r#"
            SELECT id, parent_id, body_id, name, width, height
            FROM attic_thumbnails
            WHERE parent_id = $1 AND name = $2
            "#,
        )
        .bind(parent_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(Thumbnail::from))
    }

    async fn by_parent(&self, parent_id: &str) -> MetaResult<Vec<Thumbnail>> {
        let rows = sqlx::query_as::<_, ThumbnailRow>(
            r#"
            SELECT id, parent_id, body_id, name, width, height
            FROM attic_thumbnails
            WHERE parent_id = $1
            ORDER BY name
            "#,
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows.into_iter().map(Thumbnail::from).collect())
    }

    async fn put(&self, thumbnail: &Thumbnail) -> MetaResult<()> {
        sqlx::query(
            r#"
            INSERT INTO attic_thumbnails (id, parent_id, body_id, name, width, height)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                body_id = EXCLUDED.body_id,
                width = EXCLUDED.width,
                height = EXCLUDED.height
            "#,
        )
        .bind(&thumbnail.id)
        .bind(&thumbnail.parent_id)
        .bind(&thumbnail.body_id)
        .bind(&thumbnail.name)
        .bind(thumbnail.width as i32)
        .bind(thumbnail.height as i32)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn remove(&self, id: &str) -> MetaResult<bool> {
        let result = sqlx::query("DELETE FROM attic_thumbnails WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(result.rows_affected() > 0)
    }
}
