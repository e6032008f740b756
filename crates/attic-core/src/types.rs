//! Shared identifier aliases

/// Attachment identifier, assigned by the blob store at write time.
/// Opaque to everything else and never reused.
pub type AttachmentId = String;

/// Thumbnail record identifier
pub type ThumbnailId = String;

/// Split a comma separated id list, dropping blanks
pub fn split_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_ids() {
        assert_eq!(split_ids("a, b,,c "), vec!["a", "b", "c"]);
        assert!(split_ids("").is_empty());
    }
}
