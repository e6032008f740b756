//! Thumbnail record

use attic_core::{AttachmentId, ThumbnailId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Links a parent attachment and a spec name to the derived attachment
/// holding the resized bytes. At most one per `(parent_id, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub id: ThumbnailId,
    pub parent_id: AttachmentId,
    /// Id of the derived attachment
    pub body_id: AttachmentId,
    /// Spec name
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl Thumbnail {
    pub fn new(
        parent_id: impl Into<String>,
        body_id: impl Into<String>,
        name: impl Into<String>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: parent_id.into(),
            body_id: body_id.into(),
            name: name.into(),
            width,
            height,
        }
    }
}
