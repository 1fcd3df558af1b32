//! Client-side mechanism capabilities: candidate extraction, selection, and
//! payload signing.
//!
//! A client registers one [`SchemeClient`] per mechanism it can pay with.
//! When a 402 challenge arrives, every acceptor in `accepts` is offered to
//! every registered client in order; the first client that can handle an
//! acceptor turns it into a [`PaymentCandidate`]. Candidates then pass
//! through wallet [`PaymentPolicy`] filters, and a [`PaymentSelector`] picks
//! the one to sign.

use std::collections::BTreeMap;

use crate::chain::ChainId;
use crate::proto::v2;

/// A parsed payment option, comparable across schemes before signing.
#[derive(Debug, Clone)]
pub struct PaymentCandidate {
    /// The network the payment would happen on.
    pub chain_id: ChainId,
    /// Normalized asset identifier.
    pub asset: String,
    /// Payment amount in atomic units.
    pub amount: u128,
    /// Scheme name (e.g., "exact").
    pub scheme: String,
    /// Index of the scheme client that produced this candidate.
    pub client_index: usize,
    /// The raw acceptor for re-parsing during signing.
    pub raw_acceptor: serde_json::Value,
    /// Resource info from the challenge, echoed into the payload.
    pub resource: Option<v2::ResourceInfo>,
}

/// Trait implemented by scheme-specific payment clients.
#[async_trait::async_trait]
pub trait SchemeClient: Send + Sync {
    /// Whether this client can pay an acceptor with the given scheme and
    /// network. Called for each entry of the challenge's `accepts`.
    fn can_handle(&self, scheme: &str, network: &ChainId) -> bool;

    /// Parses a raw acceptor into a candidate. Only called after
    /// [`SchemeClient::can_handle`] returned true.
    fn to_candidate(
        &self,
        raw: &serde_json::Value,
        client_index: usize,
        resource: Option<v2::ResourceInfo>,
    ) -> Result<PaymentCandidate, ClientError>;

    /// Signs the payment for the selected candidate.
    ///
    /// `extensions` is merged into the payload's `extensions` map (client
    /// identity, idempotency id). Returns the base64url value for the
    /// `PAYMENT-SIGNATURE` header.
    async fn sign_payment(
        &self,
        candidate: &PaymentCandidate,
        extensions: Option<&BTreeMap<String, serde_json::Value>>,
    ) -> Result<String, ClientError>;
}

/// Errors while constructing or applying a client payment.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// None of the offered acceptors can be satisfied.
    #[error("no matching payment option found")]
    NoMatchingPaymentOption,
    /// The original request body cannot be replayed for the retry.
    #[error("request is not cloneable (streaming body?)")]
    RequestNotCloneable,
    /// The 402 response could not be parsed into a challenge.
    #[error("failed to parse 402 response: {0}")]
    ParseError(String),
    /// Signing the payload failed.
    #[error("failed to sign payment: {0}")]
    SigningError(String),
    /// The wallet cannot cover the payment.
    #[error("insufficient funds for payment")]
    InsufficientFunds,
    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Selection strategy over payment candidates.
pub trait PaymentSelector: Send + Sync {
    /// Picks a candidate, or `None` if none is acceptable.
    fn select<'a>(&self, candidates: &'a [PaymentCandidate]) -> Option<&'a PaymentCandidate>;
}

/// Default selector: the first candidate wins.
///
/// Candidates are built in `accepts` order, so this realizes "first acceptor
/// with a registered signer, ties broken by challenge order".
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstMatch;

impl PaymentSelector for FirstMatch {
    fn select<'a>(&self, candidates: &'a [PaymentCandidate]) -> Option<&'a PaymentCandidate> {
        candidates.first()
    }
}

/// Selector that prefers a specific chain, falling back to first match.
#[derive(Debug, Clone)]
pub struct PreferChain(pub ChainId);

impl PaymentSelector for PreferChain {
    fn select<'a>(&self, candidates: &'a [PaymentCandidate]) -> Option<&'a PaymentCandidate> {
        candidates
            .iter()
            .find(|c| c.chain_id == self.0)
            .or_else(|| candidates.first())
    }
}

/// Wallet-side policy filter applied before selection.
pub trait PaymentPolicy: Send + Sync {
    /// Whether the candidate is acceptable to the wallet.
    fn allows(&self, candidate: &PaymentCandidate) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(chain: &str, amount: u128) -> PaymentCandidate {
        PaymentCandidate {
            chain_id: chain.parse().unwrap(),
            asset: "0xA".into(),
            amount,
            scheme: "exact".into(),
            client_index: 0,
            raw_acceptor: serde_json::Value::Null,
            resource: None,
        }
    }

    #[test]
    fn first_match_takes_challenge_order() {
        let candidates = vec![candidate("eip155:84532", 10), candidate("eip155:8453", 5)];
        let selected = FirstMatch.select(&candidates).unwrap();
        assert_eq!(selected.chain_id.to_string(), "eip155:84532");
    }

    #[test]
    fn prefer_chain_overrides_order() {
        let candidates = vec![candidate("eip155:84532", 10), candidate("eip155:8453", 5)];
        let prefer = PreferChain("eip155:8453".parse().unwrap());
        let selected = prefer.select(&candidates).unwrap();
        assert_eq!(selected.chain_id.to_string(), "eip155:8453");

        let fallback = PreferChain("solana:devnet1111111111111111111111111".parse().unwrap());
        let selected = fallback.select(&candidates).unwrap();
        assert_eq!(selected.chain_id.to_string(), "eip155:84532");
    }
}
