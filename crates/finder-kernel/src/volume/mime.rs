//! Mime filtering and a small extension-based mime table.

use parking_lot::RwLock;

use finder_types::DIRECTORY_MIME;

/// Check `mime` against a filter list.
///
/// An empty list accepts everything and directories are always accepted.
/// Entries match either the full type (`image/png`) or the top-level type
/// (`image`).
pub fn mime_matches(filter: &[String], mime: &str) -> bool {
    if filter.is_empty() || mime == DIRECTORY_MIME {
        return true;
    }
    let top = mime.split('/').next().unwrap_or(mime);
    filter.iter().any(|f| f == mime || f == top)
}

/// A volume's mutable mime filter.
///
/// Set by the dispatcher from a request's `mimes` argument; it stays in
/// effect for later requests until replaced. An empty list resets it.
#[derive(Debug, Default)]
pub struct MimeFilter {
    mimes: RwLock<Vec<String>>,
}

impl MimeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, mimes: Vec<String>) {
        *self.mimes.write() = mimes;
    }

    pub fn get(&self) -> Vec<String> {
        self.mimes.read().clone()
    }

    pub fn accepts(&self, mime: &str) -> bool {
        mime_matches(&self.mimes.read(), mime)
    }
}

/// Guess a mime type from a file name.
pub fn guess_mime(name: &str) -> &'static str {
    let ext = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return "application/octet-stream",
    };
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "rs" => "text/x-rust",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "tar" => "application/x-tar",
        "gz" | "tgz" => "application/x-gzip",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

/// File extension conventionally used for an archive mime type.
pub fn archive_extension(mime: &str) -> Option<&'static str> {
    match mime {
        "application/zip" => Some("zip"),
        "application/x-tar" => Some("tar"),
        "application/x-gzip" => Some("tgz"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_matches() {
        let filter = vec!["image".to_string(), "text/plain".to_string()];
        assert!(mime_matches(&filter, "image/png"));
        assert!(mime_matches(&filter, "text/plain"));
        assert!(!mime_matches(&filter, "text/html"));
        assert!(mime_matches(&filter, DIRECTORY_MIME));
        assert!(mime_matches(&[], "application/zip"));
    }

    #[test]
    fn test_filter_persists_until_reset() {
        let filter = MimeFilter::new();
        filter.set(vec!["image".into()]);
        assert!(!filter.accepts("text/plain"));
        assert!(filter.accepts("image/gif"));
        filter.set(Vec::new());
        assert!(filter.accepts("text/plain"));
    }

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime("readme.TXT"), "text/plain");
        assert_eq!(guess_mime("photo.jpeg"), "image/jpeg");
        assert_eq!(guess_mime(".hidden"), "application/octet-stream");
        assert_eq!(guess_mime("Makefile"), "application/octet-stream");
    }
}
