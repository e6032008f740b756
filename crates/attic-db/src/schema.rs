//! Schema bootstrap

use sqlx::PgPool;

/// Statements run in order by [`ensure_schema`]; all idempotent
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS attic_attachments (
        id TEXT PRIMARY KEY,
        owner_ids TEXT[] NOT NULL DEFAULT '{}',
        group_ids TEXT[] NOT NULL DEFAULT '{}',
        category TEXT NOT NULL DEFAULT '',
        filename TEXT NOT NULL,
        content_type TEXT NOT NULL,
        content_length BIGINT NOT NULL,
        content_hash TEXT NOT NULL,
        upload_time TIMESTAMPTZ NOT NULL,
        width INTEGER NOT NULL DEFAULT 0,
        height INTEGER NOT NULL DEFAULT 0,
        derived_from TEXT
    )
    "#,
    "ALTER TABLE attic_attachments ADD COLUMN IF NOT EXISTS derived_from TEXT",
    "CREATE INDEX IF NOT EXISTS attic_attachments_owner_ids ON attic_attachments USING GIN (owner_ids)",
    "CREATE INDEX IF NOT EXISTS attic_attachments_group_ids ON attic_attachments USING GIN (group_ids)",
    r#"
    CREATE TABLE IF NOT EXISTS attic_thumbnails (
        id TEXT PRIMARY KEY,
        parent_id TEXT NOT NULL,
        body_id TEXT NOT NULL,
        name TEXT NOT NULL,
        width INTEGER NOT NULL,
        height INTEGER NOT NULL,
        UNIQUE (parent_id, name)
    )
    "#,
];

pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!("Schema ensured");
    Ok(())
}
