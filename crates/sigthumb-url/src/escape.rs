//! Reversible escaping of source identifiers.
//!
//! Source identifiers are arbitrary strings (file names, storage keys) that end
//! up both in a URL path and in a cache filename. [`escape`] maps them onto the
//! alphabet `[A-Za-z0-9_~/-]`:
//!
//! - UTF-8 bytes outside `[A-Za-z0-9_./-]` are percent-encoded
//! - `.` is always encoded, so no `..` segment or file extension survives
//! - a `/` that is leading, trailing or follows another `/` is encoded, so the
//!   token is always a relative path without empty segments
//! - `%` is replaced by `~` (percent is not allowed in the route) and the hex
//!   digits are lower-cased
//!
//! Letters of the input are kept as they are, so clean identifiers like
//! `photos/2024/cat_01` pass through unchanged. [`unescape`] reverses the
//! mapping exactly.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Characters left unencoded by the first pass. `.` is deliberately absent.
const IDENTIFIER_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'_').remove(b'-').remove(b'/');

/// Marker that replaces `%` in escaped tokens.
const MARKER: char = '~';

/// Error decoding an escaped identifier token.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EscapeError {
    /// A `~` marker not followed by two hex digits.
    #[error("Malformed escape sequence at byte {0}")]
    MalformedSequence(usize),
    /// The decoded bytes are not valid UTF-8.
    #[error("Escaped identifier does not decode to UTF-8")]
    InvalidUtf8,
}

/// Escape a source identifier into a URL and filesystem safe token.
#[must_use]
pub fn escape(identifier: &str) -> String {
    let encoded = utf8_percent_encode(identifier, IDENTIFIER_ENCODE_SET).to_string();
    let bytes = encoded.as_bytes();
    let mut out = String::with_capacity(encoded.len() + 8);

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                // Always followed by two uppercase hex digits
                out.push(MARKER);
                out.push_str(&encoded[i + 1..i + 3].to_ascii_lowercase());
                i += 3;
                continue;
            }
            b'.' => out.push_str("~2e"),
            b'/' => {
                let leading = i == 0;
                let trailing = i == bytes.len() - 1;
                let repeated = i > 0 && bytes[i - 1] == b'/';
                if leading || trailing || repeated {
                    out.push_str("~2f");
                } else {
                    out.push('/');
                }
            }
            b => out.push(char::from(b)),
        }
        i += 1;
    }

    out
}

/// Decode a token produced by [`escape`] back into the original identifier.
pub fn unescape(token: &str) -> Result<String, EscapeError> {
    let bytes = token.as_bytes();
    for (pos, _) in token.match_indices(MARKER) {
        let well_formed = bytes
            .get(pos + 1..pos + 3)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if !well_formed {
            return Err(EscapeError::MalformedSequence(pos));
        }
    }

    let percent_form = token.replace(MARKER, "%");
    percent_decode_str(&percent_form)
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .map_err(|_| EscapeError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRINGS: &[&str] = &[
        "high unicode chars \u{d1}\u{89}\u{c3}\u{ab}\u{e0}\u{aa}\u{8b} щё",
        "naughty chars &\"' %$+={}()\\.:",
        "/leading",
        "trailing/",
        "multiple///slashes",
        "percent %41 and tilde ~2e lookalikes",
        "../../etc/passwd",
        "/",
        "a//",
    ];

    fn is_token_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '~' | '/' | '-')
    }

    #[test]
    fn test_round_trip() {
        for s in STRINGS {
            assert_eq!(unescape(&escape(s)).unwrap(), *s, "round trip of {s:?}");
        }
    }

    #[test]
    fn test_output_alphabet() {
        for s in STRINGS {
            let token = escape(s);
            assert!(token.chars().all(is_token_char), "{token:?} has bad chars");
        }
    }

    #[test]
    fn test_no_leading_or_trailing_slash() {
        for s in STRINGS {
            let token = escape(s);
            assert!(!token.starts_with('/'), "{token:?} starts with /");
            assert!(!token.ends_with('/'), "{token:?} ends with /");
        }
    }

    #[test]
    fn test_no_repeated_slashes() {
        for s in STRINGS {
            assert!(!escape(s).contains("//"));
        }
    }

    #[test]
    fn test_clean_strings_untouched() {
        let clean = "this/is-1234/a_clean_string";
        assert_eq!(escape(clean), clean);
    }

    #[test]
    fn test_dots_and_slashes_encoded() {
        assert_eq!(escape("a.jpg"), "a~2ejpg");
        assert_eq!(escape("/x//y/"), "~2fx/~2fy~2f");
    }

    #[test]
    fn test_hex_digits_lowercased() {
        assert_eq!(escape("a b"), "a~20b");
        assert_eq!(escape("é"), "~c3~a9");
        assert_eq!(escape("~"), "~7e");
    }

    #[test]
    fn test_unescape_accepts_uppercase_hex() {
        assert_eq!(unescape("~C3~A9").unwrap(), "é");
    }

    #[test]
    fn test_unescape_rejects_malformed_marker() {
        assert_eq!(unescape("abc~"), Err(EscapeError::MalformedSequence(3)));
        assert_eq!(unescape("~zz"), Err(EscapeError::MalformedSequence(0)));
    }

    #[test]
    fn test_unescape_rejects_invalid_utf8() {
        assert_eq!(unescape("~ff~fe"), Err(EscapeError::InvalidUtf8));
    }
}
