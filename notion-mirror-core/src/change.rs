//! Content digests and the write-needed decision.

use sha2::{Digest, Sha256};

/// SHA-256 of the content, lowercase hex.
pub fn content_digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// True when nothing is published yet or the published bytes differ.
/// Byte-exact: no whitespace or line-ending normalization.
pub fn needs_write(desired: &[u8], existing: Option<&[u8]>) -> bool {
    match existing {
        None => true,
        Some(current) => content_digest(current) != content_digest(desired),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_remote_needs_write() {
        assert!(needs_write(b"# hi\n", None));
    }

    #[test]
    fn identical_bytes_do_not() {
        assert!(!needs_write(b"# hi\n", Some(b"# hi\n")));
    }

    #[test]
    fn comparison_is_byte_exact() {
        assert!(needs_write(b"# hi\n", Some(b"# hi\r\n")));
        assert!(needs_write(b"# hi\n", Some(b"# hi \n")));
    }

    #[test]
    fn digest_is_stable_hex() {
        assert_eq!(
            content_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
