//! # attic-db
//!
//! PostgreSQL adapters for Attic.
//!
//! - Connection pool management
//! - Schema bootstrap
//! - [`PgMetaStore`] and [`PgThumbnailStore`], implementing the store
//!   traits of `attic-attachments` and `attic-thumbnails`
//!
//! ## Example
//!
//! ```ignore
//! use attic_db::{Database, DatabaseConfig, PgMetaStore};
//!
//! let db = Database::connect(&DatabaseConfig::with_url(url)).await?;
//! db.ensure_schema().await?;
//!
//! let meta = PgMetaStore::new(db.pool().clone());
//! ```

pub mod attachments;
pub mod pool;
pub mod schema;
pub mod thumbnails;

pub use attachments::{AttachmentRow, PgMetaStore};
pub use pool::{Database, DatabaseConfig, PoolStats};
pub use thumbnails::{PgThumbnailStore, ThumbnailRow};
