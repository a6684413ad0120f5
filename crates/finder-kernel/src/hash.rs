//! Path hash codec.
//!
//! A hash is `<namespace><base64url(utf8 path)>`, unpadded. The namespace is
//! the owning volume's id (`m1_`, `m2_`, ...) and always ends with `_`, so the
//! first `_` in a hash terminates it. Paths are volume-relative, `/` being
//! the volume root.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use thiserror::Error;

/// Terminator of a namespace prefix.
pub const NAMESPACE_SEPARATOR: char = '_';

/// Errors decoding a hash.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HashError {
    /// The hash belongs to another volume.
    #[error("hash {hash} is outside namespace {namespace}")]
    ForeignNamespace { hash: String, namespace: String },

    /// The token after the namespace is not valid base64url.
    #[error("malformed hash: {0}")]
    Malformed(String),

    /// The decoded bytes are not UTF-8.
    #[error("hash does not decode to UTF-8: {0}")]
    NotUtf8(String),
}

/// Extract the namespace prefix of a hash, separator included.
///
/// Returns `None` when the hash carries no namespace or the namespace is
/// empty.
pub fn namespace_of(hash: &str) -> Option<&str> {
    let end = hash.find(NAMESPACE_SEPARATOR)?;
    if end == 0 {
        return None;
    }
    Some(&hash[..=end])
}

/// Encoder/decoder bound to one volume's namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashCodec {
    namespace: String,
}

impl HashCodec {
    /// Create a codec for the given namespace. A trailing separator is
    /// appended if missing.
    pub fn new(namespace: impl Into<String>) -> Self {
        let mut namespace = namespace.into();
        if !namespace.ends_with(NAMESPACE_SEPARATOR) {
            namespace.push(NAMESPACE_SEPARATOR);
        }
        Self { namespace }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Encode a volume-relative path.
    pub fn encode(&self, path: &str) -> String {
        let mut hash = self.namespace.clone();
        URL_SAFE_NO_PAD.encode_string(path.as_bytes(), &mut hash);
        hash
    }

    /// Decode a hash minted by this codec.
    pub fn decode(&self, hash: &str) -> Result<String, HashError> {
        let token = hash
            .strip_prefix(self.namespace.as_str())
            .ok_or_else(|| HashError::ForeignNamespace {
                hash: hash.to_string(),
                namespace: self.namespace.clone(),
            })?;
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| HashError::Malformed(hash.to_string()))?;
        String::from_utf8(bytes).map_err(|_| HashError::NotUtf8(hash.to_string()))
    }

    /// True if the hash carries this codec's namespace.
    pub fn owns(&self, hash: &str) -> bool {
        namespace_of(hash) == Some(self.namespace.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let codec = HashCodec::new("m1_");
        for path in ["/", "/docs", "/docs/readme.txt", "/Ünïcödé/日本語 file.md", "/a b/c?d"] {
            let hash = codec.encode(path);
            assert_eq!(codec.decode(&hash).unwrap(), path);
        }
    }

    #[test]
    fn test_encode_is_deterministic_and_injective() {
        let codec = HashCodec::new("m1");
        assert_eq!(codec.encode("/a"), codec.encode("/a"));
        assert_ne!(codec.encode("/a"), codec.encode("/b"));
        assert_ne!(codec.encode("/a"), codec.encode("/a/"));
    }

    #[test]
    fn test_namespace_separator_is_appended() {
        let codec = HashCodec::new("m1");
        assert_eq!(codec.namespace(), "m1_");
        assert!(codec.encode("/").starts_with("m1_"));
    }

    #[test]
    fn test_hash_never_contains_the_path() {
        let codec = HashCodec::new("m1_");
        let hash = codec.encode("/secret/path");
        assert!(!hash.contains("secret"));
    }

    #[test]
    fn test_namespace_of() {
        let codec = HashCodec::new("m12_");
        // base64url may itself contain `_`; the first one ends the namespace.
        let hash = codec.encode("/??>");
        assert_eq!(namespace_of(&hash), Some("m12_"));
        assert_eq!(namespace_of("badhash"), None);
        assert_eq!(namespace_of("_abc"), None);
    }

    #[test]
    fn test_foreign_namespace_is_rejected() {
        let a = HashCodec::new("m1_");
        let b = HashCodec::new("m2_");
        let hash = a.encode("/x");
        assert!(matches!(b.decode(&hash), Err(HashError::ForeignNamespace { .. })));
        assert!(a.owns(&hash));
        assert!(!b.owns(&hash));
    }

    #[test]
    fn test_malformed_token() {
        let codec = HashCodec::new("m1_");
        assert!(matches!(codec.decode("m1_!!!"), Err(HashError::Malformed(_))));
        // 0xff 0xfe is valid base64 but not UTF-8.
        assert!(matches!(codec.decode("m1___4"), Err(HashError::NotUtf8(_))));
    }
}
