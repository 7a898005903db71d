//! services/engine/src/extract/text.rs
//!
//! Plain-text passthrough. Lossy decoding keeps the path infallible even for
//! files with stray non-UTF-8 bytes.

pub fn extract(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_utf8_text() {
        assert_eq!(extract("héllo notes".as_bytes()), "héllo notes");
    }

    #[test]
    fn invalid_bytes_become_replacement_chars_instead_of_failing() {
        let extracted = extract(&[b'o', b'k', 0xFF, b'!']);
        assert!(extracted.starts_with("ok"));
        assert!(extracted.ends_with('!'));
    }
}
