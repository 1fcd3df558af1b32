//! The base64url envelope for protocol headers.
//!
//! `PAYMENT-REQUIRED`, `PAYMENT-SIGNATURE`, and `PAYMENT-RESPONSE` all carry
//! base64url of compact UTF-8 JSON. Encoding is deterministic: no whitespace,
//! no padding. Decoding tolerates unknown top-level fields (see the types in
//! [`crate::proto::v2`]) so older servers interoperate with newer clients.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::proto::ErrorReason;
use crate::proto::v2;
use crate::util::b64::Base64Bytes;

/// Encodes a wire value into its base64url header form.
pub fn encode<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64Bytes::encode(json).to_string())
}

/// Encodes pre-serialized JSON bytes into the base64url header form.
///
/// Used when the same JSON bytes must appear in a response body and, encoded,
/// in a header; the two are byte-identical on decode by construction.
pub fn encode_bytes(json: &[u8]) -> String {
    Base64Bytes::encode(json).to_string()
}

/// Decodes a base64url header value into a wire type.
pub fn decode<T: DeserializeOwned>(header_value: &[u8]) -> Result<T, HeaderDecodeError> {
    let bytes = Base64Bytes::from(header_value)
        .decode()
        .map_err(HeaderDecodeError::Base64)?;
    serde_json::from_slice(&bytes).map_err(HeaderDecodeError::Json)
}

/// Errors from decoding a protocol header.
#[derive(Debug, thiserror::Error)]
pub enum HeaderDecodeError {
    /// The header value is not valid base64url.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes are not the expected JSON shape.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decodes a `PAYMENT-SIGNATURE` header into a [`v2::PaymentPayload`].
///
/// Probes the declared `x402Version` before the full parse so a future
/// protocol version is reported as [`ErrorReason::UnsupportedVersion`] rather
/// than a generic payload error.
pub fn decode_payment_signature(
    header_value: &[u8],
) -> Result<v2::PaymentPayload, PayloadDecodeError> {
    let bytes = Base64Bytes::from(header_value)
        .decode()
        .map_err(PayloadDecodeError::InvalidHeader)?;

    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct VersionProbe {
        x402_version: u64,
    }
    let probe: VersionProbe =
        serde_json::from_slice(&bytes).map_err(PayloadDecodeError::InvalidPayload)?;
    if probe.x402_version != u64::from(v2::X402Version2::VALUE) {
        return Err(PayloadDecodeError::UnsupportedVersion(probe.x402_version));
    }

    serde_json::from_slice(&bytes).map_err(PayloadDecodeError::InvalidPayload)
}

/// Errors from decoding a client payment payload at ingress.
#[derive(Debug, thiserror::Error)]
pub enum PayloadDecodeError {
    /// The header is not valid base64url.
    #[error("invalid payment header: {0}")]
    InvalidHeader(base64::DecodeError),
    /// The decoded bytes fail JSON or schema validation.
    #[error("invalid payment payload: {0}")]
    InvalidPayload(serde_json::Error),
    /// The payload declares an x402 version other than 2.
    #[error("unsupported x402 version {0}")]
    UnsupportedVersion(u64),
}

impl PayloadDecodeError {
    /// The wire reason corresponding to this failure.
    pub fn reason(&self) -> ErrorReason {
        match self {
            PayloadDecodeError::InvalidHeader(_) => ErrorReason::InvalidHeader,
            PayloadDecodeError::InvalidPayload(_) => ErrorReason::InvalidPayload,
            PayloadDecodeError::UnsupportedVersion(_) => ErrorReason::UnsupportedVersion,
        }
    }
}
