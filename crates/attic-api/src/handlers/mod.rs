//! API handlers

pub mod archives;
pub mod attachments;
pub mod thumbnails;
