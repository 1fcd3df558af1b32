//! Buyer side of the EVM `exact` scheme.
//!
//! Turns an offered requirement into a signed ERC-3009 authorization: a
//! random 32-byte nonce, a validity window derived from the offer's
//! `maxTimeoutSeconds`, and an EIP-712 signature under the token's domain.

use alloy_primitives::{B256, Bytes, U256};
use alloy_signer::Signer;
use alloy_sol_types::{SolStruct, eip712_domain};
use rand::{Rng, rng};
use std::collections::BTreeMap;
use std::sync::Arc;

use pay402::chain::ChainId;
use pay402::proto::codec;
use pay402::proto::v2;
use pay402::scheme::client::{ClientError, PaymentCandidate, SchemeClient};
use pay402::timestamp::UnixTimestamp;

use crate::chain::Eip155ChainReference;
use crate::exact::types::{
    Eip3009Authorization, Eip3009Payload, PaymentRequirements, TransferWithAuthorization,
};

/// Slack subtracted from `validAfter` so freshly signed authorizations are
/// valid despite clock drift between buyer and facilitator.
const VALID_AFTER_SLACK_SECS: u64 = 10 * 60;

/// Scheme client for `exact` payments on any EIP-155 chain.
pub struct Eip155ExactClient<S> {
    signer: Arc<S>,
}

impl<S> Eip155ExactClient<S> {
    /// Creates a client around an EIP-712-capable signer.
    pub fn new(signer: S) -> Self {
        Self {
            signer: Arc::new(signer),
        }
    }
}

#[async_trait::async_trait]
impl<S: Signer + Send + Sync> SchemeClient for Eip155ExactClient<S> {
    fn can_handle(&self, scheme: &str, network: &ChainId) -> bool {
        scheme == "exact" && Eip155ChainReference::try_from(network).is_ok()
    }

    fn to_candidate(
        &self,
        raw: &serde_json::Value,
        client_index: usize,
        resource: Option<v2::ResourceInfo>,
    ) -> Result<PaymentCandidate, ClientError> {
        let requirements: PaymentRequirements = serde_json::from_value(raw.clone())?;
        let amount: U256 = requirements.amount.into();
        Ok(PaymentCandidate {
            chain_id: requirements.network.clone(),
            asset: requirements.asset.to_string(),
            amount: amount.try_into().unwrap_or(u128::MAX),
            scheme: "exact".into(),
            client_index,
            raw_acceptor: raw.clone(),
            resource,
        })
    }

    async fn sign_payment(
        &self,
        candidate: &PaymentCandidate,
        extensions: Option<&BTreeMap<String, serde_json::Value>>,
    ) -> Result<String, ClientError> {
        let requirements: PaymentRequirements =
            serde_json::from_value(candidate.raw_acceptor.clone())?;

        let (name, version) = match &requirements.extra {
            Some(extra) => (extra.name.clone(), extra.version.clone()),
            None => (String::new(), String::new()),
        };
        let chain = Eip155ChainReference::try_from(&requirements.network)
            .map_err(|e| ClientError::SigningError(e.to_string()))?;
        let domain = eip712_domain! {
            name: name,
            version: version,
            chain_id: chain.inner(),
            verifying_contract: requirements.asset.into(),
        };

        let now = UnixTimestamp::now();
        let valid_after = now.saturating_sub(VALID_AFTER_SLACK_SECS);
        let valid_before = now + requirements.max_timeout_seconds;
        let nonce: [u8; 32] = rng().random();

        let authorization = Eip3009Authorization {
            from: self.signer.address().into(),
            to: requirements.pay_to,
            value: requirements.amount,
            valid_after,
            valid_before,
            nonce: B256::from(nonce),
        };

        // The facilitator reconstructs this exact struct from the
        // authorization to verify the signature; every field must agree.
        let message = TransferWithAuthorization {
            from: authorization.from.into(),
            to: authorization.to.into(),
            value: authorization.value.into(),
            validAfter: U256::from(authorization.valid_after.as_secs()),
            validBefore: U256::from(authorization.valid_before.as_secs()),
            nonce: authorization.nonce,
        };
        let digest = message.eip712_signing_hash(&domain);
        let signature = self
            .signer
            .sign_hash(&digest)
            .await
            .map_err(|e| ClientError::SigningError(e.to_string()))?;

        // Echo the acceptor verbatim so the server-side match sees exactly
        // what it offered, unknown extra fields included.
        let payload: v2::PaymentPayload<serde_json::Value, Eip3009Payload> = v2::PaymentPayload {
            x402_version: v2::X402Version2,
            resource: candidate.resource.clone(),
            accepted: candidate.raw_acceptor.clone(),
            payload: Eip3009Payload {
                signature: Bytes::from(signature.as_bytes().to_vec()),
                authorization,
            },
            extensions: extensions.cloned(),
        };
        codec::encode(&payload).map_err(ClientError::Json)
    }
}
