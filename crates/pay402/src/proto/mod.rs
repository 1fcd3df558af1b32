//! Protocol types for x402 payment messages.
//!
//! Defines the wire format used between buyers, resource servers, and
//! facilitators. All types serialize to JSON with camelCase field names; the
//! protocol version is carried as the `x402Version` field inside payment
//! payloads and challenges.
//!
//! # Key Types
//!
//! - [`v2`] - the versioned message bodies (challenge, payload, receipt)
//! - [`codec`] - the base64url envelope used in HTTP headers
//! - [`ErrorReason`] - the stable machine-readable failure taxonomy
//! - [`VerifyRequest`] / [`SettleRequest`] - raw pass-through request
//!   wrappers that preserve scheme-specific fields verbatim
//! - [`SupportedPaymentKind`] / [`SupportedResponse`] - facilitator
//!   capability advertisement

use serde::{Deserialize, Serialize};
use serde_with::{VecSkipError, serde_as};
use std::fmt;
use std::fmt::{Display, Formatter};

use crate::chain::ChainId;
use crate::scheme::SchemeKey;

pub mod codec;
pub mod v2;

/// Machine-readable reason codes for payment failures.
///
/// These are stable wire strings; no stack traces or free-form diagnostics
/// cross the boundary. Mechanisms produce them, the resource server surfaces
/// them verbatim in `errorReason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    /// The payment header is not valid base64.
    InvalidHeader,
    /// The payment payload is not valid JSON or fails schema validation.
    InvalidPayload,
    /// The payload declares an x402 version other than 2.
    UnsupportedVersion,
    /// No mechanism is registered for the payload's scheme.
    UnsupportedScheme,
    /// No mechanism is registered for the payload's network.
    UnsupportedNetwork,
    /// The accepted requirements match none of the offered acceptors.
    NoMatchingRequirements,
    /// The accepted requirements disagree with the submitted requirements.
    RequirementsMismatch,
    /// The cryptographic signature does not verify.
    InvalidSignature,
    /// The payer cannot cover the payment amount.
    InsufficientFunds,
    /// The authorized amount does not cover the required amount.
    AmountMismatch,
    /// The authorized recipient is not the required recipient.
    RecipientMismatch,
    /// The authorized asset is not the required asset.
    AssetMismatch,
    /// The authorization is outside its temporal validity window.
    Expired,
    /// The authorization was already consumed.
    Replay,
    /// An extension's payload validation failed.
    ExtensionValidationFailed,
    /// A pre-execution hook aborted the request.
    ExecutionBlocked,
    /// The settlement transaction could not be submitted.
    SettlementSubmissionFailed,
    /// Settlement did not confirm within the allowed time.
    SettlementTimeout,
    /// A network-level failure while talking to the chain.
    NetworkError,
    /// The facilitator could not be reached at all.
    FacilitatorUnreachable,
    /// An unexpected error occurred.
    #[serde(other)]
    InternalError,
}

impl Display for ErrorReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // Leverage serde to render the snake_case wire string.
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        write!(f, "{}", json.trim_matches('"'))
    }
}

/// A payment method advertised by a facilitator.
///
/// ```json
/// { "x402Version": 2, "scheme": "exact", "network": "eip155:8453" }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKind {
    /// The x402 protocol version.
    pub x402_version: u8,
    /// The payment scheme identifier (e.g., "exact").
    pub scheme: String,
    /// The CAIP-2 network identifier.
    pub network: ChainId,
    /// Scheme-specific extra data (e.g., `feePayer` on sponsored networks,
    /// EIP-712 domain hints on EVM).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Response from a facilitator's `GET /supported` endpoint.
#[serde_as]
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    /// Supported payment kinds. Unknown or malformed entries from newer
    /// facilitators are skipped rather than failing the whole response.
    #[serde_as(as = "VecSkipError<_>")]
    pub kinds: Vec<SupportedPaymentKind>,
    /// Keys of protocol extensions the facilitator understands.
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl SupportedResponse {
    /// Finds the advertised kind for a `(scheme, network)` pair, if any.
    pub fn kind_for(&self, scheme: &str, network: &ChainId) -> Option<&SupportedPaymentKind> {
        self.kinds
            .iter()
            .find(|kind| kind.scheme == scheme && &kind.network == network)
    }
}

/// Request to verify a payment before settlement.
///
/// The wrapper preserves the raw JSON so unknown fields inside the
/// scheme-specific `payload` travel untouched to the mechanism that owns
/// them. The inner structure is `{ paymentPayload, paymentRequirements }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest(Box<serde_json::value::RawValue>);

/// Request to settle a verified payment on-chain. Same wire structure as
/// [`VerifyRequest`].
pub type SettleRequest = VerifyRequest;

impl From<Box<serde_json::value::RawValue>> for VerifyRequest {
    fn from(value: Box<serde_json::value::RawValue>) -> Self {
        Self(value)
    }
}

impl VerifyRequest {
    /// Builds a request from the typed payload/requirements pair.
    pub fn from_parts<TPayload, TRequirements>(
        payment_payload: &TPayload,
        payment_requirements: &TRequirements,
    ) -> Result<Self, serde_json::Error>
    where
        TPayload: Serialize,
        TRequirements: Serialize,
    {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Parts<'a, P, R> {
            payment_payload: &'a P,
            payment_requirements: &'a R,
        }
        let raw = serde_json::value::to_raw_value(&Parts {
            payment_payload,
            payment_requirements,
        })?;
        Ok(Self(raw))
    }

    /// The raw JSON text of the request.
    pub fn as_str(&self) -> &str {
        self.0.get()
    }

    /// Extracts the `(scheme, network)` dispatch key, checking the protocol
    /// version on the way.
    ///
    /// A declared version other than 2 is rejected with
    /// [`RequestProbeError::UnsupportedVersion`] before any scheme-specific
    /// parsing happens.
    pub fn scheme_key(&self) -> Result<SchemeKey, RequestProbeError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Probe {
            payment_payload: PayloadProbe,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct PayloadProbe {
            x402_version: u64,
            accepted: AcceptedProbe,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct AcceptedProbe {
            scheme: String,
            network: ChainId,
        }

        let probe: Probe = serde_json::from_str(self.as_str())?;
        if probe.payment_payload.x402_version != u64::from(v2::X402Version2::VALUE) {
            return Err(RequestProbeError::UnsupportedVersion(
                probe.payment_payload.x402_version,
            ));
        }
        Ok(SchemeKey::new(
            probe.payment_payload.accepted.scheme,
            probe.payment_payload.accepted.network,
        ))
    }
}

/// Errors from probing a verify/settle request at ingress.
#[derive(Debug, thiserror::Error)]
pub enum RequestProbeError {
    /// The request body is not the expected JSON shape.
    #[error("invalid request: {0}")]
    Invalid(#[from] serde_json::Error),
    /// The payload declares an unsupported protocol version.
    #[error("unsupported x402 version {0}")]
    UnsupportedVersion(u64),
}

impl RequestProbeError {
    /// The wire reason corresponding to this ingress failure.
    pub fn reason(&self) -> ErrorReason {
        match self {
            RequestProbeError::Invalid(_) => ErrorReason::InvalidPayload,
            RequestProbeError::UnsupportedVersion(_) => ErrorReason::UnsupportedVersion,
        }
    }
}
