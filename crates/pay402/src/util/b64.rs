//! Base64url encoding and decoding utilities.
//!
//! The protocol headers carry base64url (URL-safe alphabet, no padding) of
//! UTF-8 JSON. [`Base64Bytes`] wraps encoded bytes with copy-on-write
//! storage so header values borrowed from a request need no allocation
//! before decoding.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as b64;
use std::borrow::Cow;
use std::fmt::Display;

/// A wrapper for base64url-encoded byte data.
///
/// # Example
///
/// ```rust
/// use pay402::util::Base64Bytes;
///
/// let encoded = Base64Bytes::encode(b"hello world");
/// assert_eq!(encoded.to_string(), "aGVsbG8gd29ybGQ");
///
/// let decoded = encoded.decode().unwrap();
/// assert_eq!(decoded, b"hello world");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes<'a>(pub Cow<'a, [u8]>);

impl Base64Bytes<'_> {
    /// Decodes the base64url bytes back to raw binary data.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not valid base64url.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64.decode(&self.0)
    }

    /// Encodes raw binary data into base64url bytes.
    pub fn encode<T: AsRef<[u8]>>(input: T) -> Base64Bytes<'static> {
        let encoded = b64.encode(input.as_ref());
        Base64Bytes(Cow::Owned(encoded.into_bytes()))
    }
}

impl AsRef<[u8]> for Base64Bytes<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<'a> From<&'a [u8]> for Base64Bytes<'a> {
    fn from(slice: &'a [u8]) -> Self {
        Base64Bytes(Cow::Borrowed(slice))
    }
}

impl Display for Base64Bytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.0.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let data = br#"{"x402Version":2}"#;
        let encoded = Base64Bytes::encode(data);
        assert_eq!(encoded.decode().unwrap(), data);
    }

    #[test]
    fn url_safe_alphabet() {
        // 0xfb 0xff encodes to characters outside the standard alphabet.
        let encoded = Base64Bytes::encode([0xfbu8, 0xff]);
        let s = encoded.to_string();
        assert!(!s.contains('+') && !s.contains('/') && !s.contains('='));
    }

    #[test]
    fn rejects_invalid() {
        let bogus = Base64Bytes::from(b"not valid base64!!".as_slice());
        assert!(bogus.decode().is_err());
    }
}
