//! Protocol version 2 wire types.
//!
//! V2 addresses networks by CAIP-2 chain ids, embeds the accepted
//! requirements in the payment payload, and carries extension declarations
//! in the challenge.
//!
//! # Key Types
//!
//! - [`X402Version2`] - version marker that serializes as the integer `2`
//! - [`PaymentRequired`] - the 402 challenge body
//! - [`PaymentRequirements`] - one acceptable way to pay
//! - [`PaymentPayload`] - the buyer's signed proof bound to a requirement
//! - [`VerifyResponse`] / [`SettleResponse`] - facilitator outcomes

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Display, Formatter};

use crate::chain::ChainId;
use crate::extensions::ExtensionDecl;
use crate::proto;
use crate::proto::ErrorReason;

/// Version marker for x402 protocol version 2.
///
/// Serializes as the integer `2`; deserialization of any other integer fails,
/// which is what turns a stray `"x402Version": 3` into a typed error at the
/// edge.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct X402Version2;

impl X402Version2 {
    pub const VALUE: u8 = 2;
}

impl PartialEq<u8> for X402Version2 {
    fn eq(&self, other: &u8) -> bool {
        *other == Self::VALUE
    }
}

impl From<X402Version2> for u8 {
    fn from(_: X402Version2) -> Self {
        X402Version2::VALUE
    }
}

impl Serialize for X402Version2 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for X402Version2 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let num = u8::deserialize(deserializer)?;
        if num == Self::VALUE {
            Ok(X402Version2)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected version {}, got {num}",
                Self::VALUE
            )))
        }
    }
}

impl Display for X402Version2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::VALUE)
    }
}

/// Metadata about the resource being paid for.
///
/// `url` is the canonical resource URL, which is not necessarily the URL the
/// request arrived on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    /// Canonical URL of the resource.
    pub url: String,
    /// Human-readable description of the resource.
    pub description: String,
    /// MIME type of the resource content.
    pub mime_type: String,
}

/// One acceptable way to pay for a resource.
///
/// Generic over the scheme-specific types so mechanism crates can bind
/// `scheme`, `amount`, addresses, and `extra` to their own strongly-typed
/// representations while the stringly default stays interoperable on the
/// wire.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements<
    TScheme = String,
    TAmount = String,
    TAddress = String,
    TExtra = Option<serde_json::Value>,
> {
    /// The payment scheme (e.g., "exact").
    pub scheme: TScheme,
    /// The CAIP-2 network identifier.
    pub network: ChainId,
    /// Atomic-unit amount rendered as a decimal string.
    pub amount: TAmount,
    /// Network-scoped recipient identifier.
    pub pay_to: TAddress,
    /// Upper bound in seconds on how long the offer stays live.
    pub max_timeout_seconds: u64,
    /// Network-scoped asset identifier.
    pub asset: TAddress,
    /// Scheme-specific extra data (e.g., `feePayer`, EIP-712 domain).
    pub extra: TExtra,
}

impl PaymentRequirements {
    /// Validates the invariants of the stringly wire shape.
    ///
    /// `amount` must parse as a positive integer; the network is already
    /// validated by the [`ChainId`] type on deserialization.
    pub fn validate(&self) -> Result<(), RequirementsValidationError> {
        if self.scheme.is_empty() {
            return Err(RequirementsValidationError::EmptyField { path: "scheme" });
        }
        let amount: u128 = self
            .amount
            .parse()
            .map_err(|_| RequirementsValidationError::InvalidAmount {
                path: "amount",
                value: self.amount.clone(),
            })?;
        if amount == 0 {
            return Err(RequirementsValidationError::InvalidAmount {
                path: "amount",
                value: self.amount.clone(),
            });
        }
        if self.pay_to.is_empty() {
            return Err(RequirementsValidationError::EmptyField { path: "payTo" });
        }
        if self.asset.is_empty() {
            return Err(RequirementsValidationError::EmptyField { path: "asset" });
        }
        Ok(())
    }
}

/// Typed validation errors with the offending field path.
#[derive(Debug, thiserror::Error)]
pub enum RequirementsValidationError {
    /// A required field is empty.
    #[error("{path}: must not be empty")]
    EmptyField { path: &'static str },
    /// The amount is not a positive decimal integer.
    #[error("{path}: {value:?} is not a positive integer")]
    InvalidAmount { path: &'static str, value: String },
}

/// The HTTP 402 challenge body.
///
/// `accepts` is a non-empty disjunction of payment requirements; the client
/// satisfies exactly one of them. `extensions` carries declarative extension
/// data keyed by extension name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired<TAccepts = PaymentRequirements> {
    /// Protocol version (always 2).
    pub x402_version: X402Version2,
    /// Why the request was rejected (e.g. "payment required").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Information about the protected resource.
    pub resource: ResourceInfo,
    /// Acceptable payment methods.
    #[serde(default = "Vec::default")]
    pub accepts: Vec<TAccepts>,
    /// Extension declarations keyed by extension name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, ExtensionDecl>,
}

/// A signed payment authorization from the buyer.
///
/// `accepted` echoes back which of the offered requirements the buyer is
/// satisfying. `payload` carries the scheme-specific cryptographic artifact
/// and is opaque to everything but the owning mechanism.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload<TPaymentRequirements = PaymentRequirements, TPayload = serde_json::Value>
{
    /// Protocol version (always 2).
    pub x402_version: X402Version2,
    /// Information about the resource being paid for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,
    /// The payment requirements the buyer accepted.
    pub accepted: TPaymentRequirements,
    /// The scheme-specific signed payload.
    pub payload: TPayload,
    /// Extension values keyed by extension name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, serde_json::Value>>,
}

/// Request body for `POST /verify` and `POST /settle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest<TPayload, TRequirements> {
    /// The signed payment authorization.
    pub payment_payload: TPayload,
    /// The payment requirements to verify against.
    pub payment_requirements: TRequirements,
}

impl<TPayload, TRequirements> VerifyRequest<TPayload, TRequirements>
where
    Self: DeserializeOwned,
{
    /// Parses the raw pass-through request into the typed shape of a
    /// concrete mechanism.
    pub fn from_proto(request: &proto::VerifyRequest) -> Result<Self, serde_json::Error> {
        serde_json::from_str(request.as_str())
    }
}

/// Outcome of payment verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResponse {
    /// The payload matches the requirements and passes all checks.
    Valid {
        /// The verified payer identity, in wire form.
        payer: String,
    },
    /// The payload was readable but failed verification.
    Invalid {
        /// Why verification failed.
        reason: ErrorReason,
        /// The payer, when it could still be established.
        payer: Option<String>,
    },
}

impl VerifyResponse {
    /// Convenience constructor for the valid case.
    pub fn valid<S: Into<String>>(payer: S) -> Self {
        VerifyResponse::Valid {
            payer: payer.into(),
        }
    }

    /// Convenience constructor for the invalid case.
    pub fn invalid(reason: ErrorReason) -> Self {
        VerifyResponse::Invalid {
            reason,
            payer: None,
        }
    }

    /// Whether verification succeeded.
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResponse::Valid { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponseWire {
    valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<ErrorReason>,
}

impl Serialize for VerifyResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            VerifyResponse::Valid { payer } => VerifyResponseWire {
                valid: true,
                payer: Some(payer.clone()),
                reason: None,
            },
            VerifyResponse::Invalid { reason, payer } => VerifyResponseWire {
                valid: false,
                payer: payer.clone(),
                reason: Some(*reason),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerifyResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = VerifyResponseWire::deserialize(deserializer)?;
        if wire.valid {
            let payer = wire
                .payer
                .ok_or_else(|| serde::de::Error::missing_field("payer"))?;
            Ok(VerifyResponse::Valid { payer })
        } else {
            let reason = wire
                .reason
                .ok_or_else(|| serde::de::Error::missing_field("reason"))?;
            Ok(VerifyResponse::Invalid {
                reason,
                payer: wire.payer,
            })
        }
    }
}

/// Settlement receipt, attached to responses as `PAYMENT-RESPONSE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleResponse {
    /// The transfer was submitted; `transaction` is the network-native id.
    Success {
        /// The paying identity, in wire form.
        payer: Option<String>,
        /// Network-native transaction identifier.
        transaction: String,
        /// The network the settlement happened on.
        network: ChainId,
    },
    /// Settlement failed; the client was not charged.
    Error {
        /// Why settlement failed.
        reason: ErrorReason,
        /// The network, when known.
        network: Option<ChainId>,
    },
}

impl SettleResponse {
    /// Whether the settlement succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, SettleResponse::Success { .. })
    }

    /// The failure reason, if any.
    pub fn error_reason(&self) -> Option<ErrorReason> {
        match self {
            SettleResponse::Success { .. } => None,
            SettleResponse::Error { reason, .. } => Some(*reason),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleResponseWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_reason: Option<ErrorReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    network: Option<ChainId>,
}

impl Serialize for SettleResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            SettleResponse::Success {
                payer,
                transaction,
                network,
            } => SettleResponseWire {
                success: true,
                error_reason: None,
                payer: payer.clone(),
                transaction: Some(transaction.clone()),
                network: Some(network.clone()),
            },
            SettleResponse::Error { reason, network } => SettleResponseWire {
                success: false,
                error_reason: Some(*reason),
                payer: None,
                transaction: None,
                network: network.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SettleResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = SettleResponseWire::deserialize(deserializer)?;
        if wire.success {
            let transaction = wire
                .transaction
                .ok_or_else(|| serde::de::Error::missing_field("transaction"))?;
            let network = wire
                .network
                .ok_or_else(|| serde::de::Error::missing_field("network"))?;
            Ok(SettleResponse::Success {
                payer: wire.payer,
                transaction,
                network,
            })
        } else {
            let reason = wire
                .error_reason
                .ok_or_else(|| serde::de::Error::missing_field("errorReason"))?;
            Ok(SettleResponse::Error {
                reason,
                network: wire.network,
            })
        }
    }
}
