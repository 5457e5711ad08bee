//! URL parameter signing.

use std::fmt;

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Signs thumbnail request parameters with a secret key.
///
/// The message is the newline-joined tuple `(identifier, style, version,
/// extension)`; the MAC is HMAC-SHA1 rendered as unpadded lowercase base32
/// (32 characters from `[a-z2-7]`), which fits the route's `[a-z0-9]+`
/// signature segment.
#[derive(Clone)]
pub struct Signer {
    key: Vec<u8>,
}

impl Signer {
    /// Create a signer for the given secret key.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
        }
    }

    /// Compute the signature for a parameter tuple.
    #[must_use]
    pub fn sign(&self, identifier: &str, style: &str, version: &str, extension: &str) -> String {
        let mut mac =
            HmacSha1::new_from_slice(&self.key).expect("HMAC accepts keys of any length");
        let message = [identifier, style, version, extension].join("\n");
        mac.update(message.as_bytes());
        let digest = mac.finalize().into_bytes();
        BASE32_NOPAD.encode(&digest).to_ascii_lowercase()
    }

    /// Check a supplied signature against a freshly computed one.
    ///
    /// The comparison runs in time independent of where the strings differ.
    #[must_use]
    pub fn verify(
        &self,
        signature: &str,
        identifier: &str,
        style: &str,
        version: &str,
        extension: &str,
    ) -> bool {
        let expected = self.sign(identifier, style, version, extension);
        constant_time_eq(expected.as_bytes(), signature.as_bytes())
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
