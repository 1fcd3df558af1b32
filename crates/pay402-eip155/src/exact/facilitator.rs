//! Facilitator side of the EVM `exact` scheme: verification and settlement.
//!
//! Verification checks, in order: structural agreement between the accepted
//! and submitted requirements, chain binding, recipient, temporal window,
//! authorized value against the required amount, EIP-712 domain, replay
//! (the on-chain `authorizationState` nonce), payer balance, and finally
//! EOA signature recovery over the typed-data digest. Settlement re-runs
//! the same checks and submits `transferWithAuthorization(v, r, s)` through
//! the provider's signer.

use alloy_primitives::{Address, B256, Signature, U256};
use alloy_provider::Provider;
use alloy_sol_types::{Eip712Domain, SolStruct, eip712_domain};
use tracing::instrument;

use pay402::proto;
use pay402::proto::v2;
use pay402::proto::ErrorReason;
use pay402::scheme::{ExactScheme, SchemeFacilitator, SchemeFacilitatorError};
use pay402::timestamp::UnixTimestamp;

use crate::chain::{
    Eip155ChainReference, Eip155MetaTransactionProvider, MetaTransaction,
    MetaTransactionSendError,
};
use crate::exact::types::{
    self, Eip3009Payload, IEIP3009, TransferWithAuthorization,
};

/// Internal error type for the verification pipeline.
///
/// `Rejected` carries a protocol reason and becomes an invalid/error wire
/// response; `Contract` is an RPC-level failure and surfaces as an
/// infrastructure error.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Eip155ExactError {
    #[error("{reason}: {detail}")]
    Rejected {
        reason: ErrorReason,
        detail: String,
    },
    #[error(transparent)]
    Contract(#[from] alloy_contract::Error),
}

impl Eip155ExactError {
    fn rejected<D: Into<String>>(reason: ErrorReason, detail: D) -> Self {
        Self::Rejected {
            reason,
            detail: detail.into(),
        }
    }
}

/// Facilitator-side handler for one EVM chain.
pub struct Eip155ExactFacilitator<P> {
    provider: P,
}

impl<P> Eip155ExactFacilitator<P> {
    /// Creates a handler over the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl<P> SchemeFacilitator for Eip155ExactFacilitator<P>
where
    P: Eip155MetaTransactionProvider<Error = MetaTransactionSendError>
        + pay402::chain::ChainProviderOps
        + Send
        + Sync,
    P::Inner: Provider,
{
    #[instrument(name = "eip155_exact.verify", skip_all, fields(chain = %self.provider.chain()))]
    async fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> Result<v2::VerifyResponse, SchemeFacilitatorError> {
        let request = match types::VerifyRequest::from_proto(request) {
            Ok(request) => request,
            Err(error) => {
                tracing::debug!(%error, "malformed exact-evm verify request");
                return Ok(v2::VerifyResponse::invalid(ErrorReason::InvalidPayload));
            }
        };
        let outcome = assert_valid_payment(
            self.provider.inner(),
            self.provider.chain(),
            &request.payment_payload,
            &request.payment_requirements,
        )
        .await;
        match outcome {
            Ok((payer, _, _)) => Ok(v2::VerifyResponse::valid(payer.to_checksum(None))),
            Err(Eip155ExactError::Rejected { reason, detail }) => {
                tracing::debug!(%reason, %detail, "payment rejected");
                Ok(v2::VerifyResponse::invalid(reason))
            }
            Err(Eip155ExactError::Contract(error)) => {
                Err(SchemeFacilitatorError::Onchain(error.to_string()))
            }
        }
    }

    #[instrument(name = "eip155_exact.settle", skip_all, fields(chain = %self.provider.chain()))]
    async fn settle(
        &self,
        request: &proto::SettleRequest,
    ) -> Result<v2::SettleResponse, SchemeFacilitatorError> {
        let network = self.provider.chain().as_chain_id();
        let request = match types::SettleRequest::from_proto(request) {
            Ok(request) => request,
            Err(error) => {
                tracing::debug!(%error, "malformed exact-evm settle request");
                return Ok(v2::SettleResponse::Error {
                    reason: ErrorReason::InvalidPayload,
                    network: Some(network),
                });
            }
        };
        let payload = &request.payment_payload;

        // Defensive re-verification before touching the chain.
        let (payer, signature, _domain) = match assert_valid_payment(
            self.provider.inner(),
            self.provider.chain(),
            payload,
            &request.payment_requirements,
        )
        .await
        {
            Ok(verified) => verified,
            Err(Eip155ExactError::Rejected { reason, detail }) => {
                tracing::debug!(%reason, %detail, "settlement rejected before submission");
                return Ok(v2::SettleResponse::Error {
                    reason,
                    network: Some(network),
                });
            }
            Err(Eip155ExactError::Contract(error)) => {
                return Err(SchemeFacilitatorError::Onchain(error.to_string()));
            }
        };

        let authorization = &payload.payload.authorization;
        let asset: Address = payload.accepted.asset.into();
        let contract = IEIP3009::new(asset, self.provider.inner());
        let v = 27 + u8::from(signature.v());
        let r = B256::from(signature.r());
        let s = B256::from(signature.s());
        let call = contract.transferWithAuthorization(
            authorization.from.into(),
            authorization.to.into(),
            authorization.value.into(),
            U256::from(authorization.valid_after.as_secs()),
            U256::from(authorization.valid_before.as_secs()),
            authorization.nonce,
            v,
            r,
            s,
        );
        let calldata = call.calldata().clone();

        let submission = self
            .provider
            .send_transaction(MetaTransaction {
                to: asset,
                calldata,
                confirmations: 1,
            })
            .await;
        match submission {
            Ok(receipt) => {
                tracing::info!(
                    transaction = %receipt.transaction_hash,
                    payer = %payer,
                    "settled exact-evm payment"
                );
                Ok(v2::SettleResponse::Success {
                    payer: Some(payer.to_checksum(None)),
                    transaction: receipt.transaction_hash.to_string(),
                    network,
                })
            }
            Err(MetaTransactionSendError::Transport(error)) => {
                tracing::warn!(%error, "settlement submission failed");
                Ok(v2::SettleResponse::Error {
                    reason: ErrorReason::SettlementSubmissionFailed,
                    network: Some(network),
                })
            }
            Err(MetaTransactionSendError::PendingTransaction(error)) => {
                tracing::warn!(%error, "settlement receipt not observed in time");
                Ok(v2::SettleResponse::Error {
                    reason: ErrorReason::SettlementTimeout,
                    network: Some(network),
                })
            }
        }
    }

    async fn supported(&self) -> Result<proto::SupportedResponse, SchemeFacilitatorError> {
        let kinds = vec![proto::SupportedPaymentKind {
            x402_version: v2::X402Version2.into(),
            scheme: ExactScheme.to_string(),
            network: self.provider.chain().as_chain_id(),
            extra: None,
        }];
        Ok(proto::SupportedResponse {
            kinds,
            extensions: Vec::new(),
        })
    }
}

/// Runs every precondition of a valid payment and returns the recovered
/// payer, the normalized signature, and the EIP-712 domain it verified
/// under.
async fn assert_valid_payment<P: Provider>(
    provider: &P,
    chain: &Eip155ChainReference,
    payload: &types::PaymentPayload,
    requirements: &types::PaymentRequirements,
) -> Result<(Address, Signature, Eip712Domain), Eip155ExactError> {
    let accepted = &payload.accepted;
    assert_requirements_match(accepted, requirements)?;

    if accepted.network != chain.as_chain_id() {
        return Err(Eip155ExactError::rejected(
            ErrorReason::UnsupportedNetwork,
            format!("payment bound to {}, serving {}", accepted.network, chain),
        ));
    }

    let authorization = &payload.payload.authorization;
    if authorization.to != accepted.pay_to {
        return Err(Eip155ExactError::rejected(
            ErrorReason::RecipientMismatch,
            format!("authorized {}, required {}", authorization.to, accepted.pay_to),
        ));
    }

    assert_time(authorization.valid_after, authorization.valid_before)?;
    assert_enough_value(authorization.value.into(), accepted.amount.into())?;

    let asset: Address = accepted.asset.into();
    let contract = IEIP3009::new(asset, provider);
    let domain = assert_domain(chain, &contract, &asset, &accepted.extra).await?;

    assert_nonce_unused(&contract, &authorization.from.into(), &authorization.nonce).await?;
    assert_enough_balance(&contract, &authorization.from.into(), accepted.amount.into()).await?;

    let (payer, signature) = recover_payer(&payload.payload, &domain)?;
    Ok((payer, signature, domain))
}

/// Structural agreement between what the buyer accepted and what the server
/// submitted, over the protocol-critical fields. `maxTimeoutSeconds` is
/// deliberately excluded.
fn assert_requirements_match(
    accepted: &types::PaymentRequirements,
    requirements: &types::PaymentRequirements,
) -> Result<(), Eip155ExactError> {
    let matches = accepted.network == requirements.network
        && accepted.amount == requirements.amount
        && accepted.asset == requirements.asset
        && accepted.pay_to == requirements.pay_to
        && accepted.extra == requirements.extra;
    if matches {
        Ok(())
    } else {
        Err(Eip155ExactError::rejected(
            ErrorReason::RequirementsMismatch,
            "accepted requirements do not match submitted requirements",
        ))
    }
}

/// The authorization window must contain the current moment.
fn assert_time(
    valid_after: UnixTimestamp,
    valid_before: UnixTimestamp,
) -> Result<(), Eip155ExactError> {
    let now = UnixTimestamp::now();
    if valid_before < now {
        return Err(Eip155ExactError::rejected(
            ErrorReason::Expired,
            format!("expired at {valid_before}, now {now}"),
        ));
    }
    if valid_after > now {
        return Err(Eip155ExactError::rejected(
            ErrorReason::Expired,
            format!("not valid until {valid_after}, now {now}"),
        ));
    }
    Ok(())
}

/// The authorized value must cover the required amount.
fn assert_enough_value(sent: U256, required: U256) -> Result<(), Eip155ExactError> {
    if sent < required {
        Err(Eip155ExactError::rejected(
            ErrorReason::AmountMismatch,
            format!("authorized {sent}, required {required}"),
        ))
    } else {
        Ok(())
    }
}

/// Builds the EIP-712 domain, preferring the domain parameters carried in
/// `extra` and falling back to on-chain `name()`/`version()` queries.
async fn assert_domain<P: Provider>(
    chain: &Eip155ChainReference,
    contract: &IEIP3009::IEIP3009Instance<&P>,
    asset: &Address,
    extra: &Option<types::ExactExtra>,
) -> Result<Eip712Domain, Eip155ExactError> {
    let name = match extra.as_ref().map(|e| e.name.clone()) {
        Some(name) => name,
        None => contract.name().call().await?,
    };
    let version = match extra.as_ref().map(|e| e.version.clone()) {
        Some(version) => version,
        None => contract.version().call().await?,
    };
    Ok(eip712_domain! {
        name: name,
        version: version,
        chain_id: chain.inner(),
        verifying_contract: *asset,
    })
}

/// Replay prevention: the EIP-3009 authorization nonce must not be spent.
async fn assert_nonce_unused<P: Provider>(
    contract: &IEIP3009::IEIP3009Instance<&P>,
    authorizer: &Address,
    nonce: &B256,
) -> Result<(), Eip155ExactError> {
    let used = contract.authorizationState(*authorizer, *nonce).call().await?;
    if used {
        Err(Eip155ExactError::rejected(
            ErrorReason::Replay,
            format!("authorization nonce {nonce} already consumed"),
        ))
    } else {
        Ok(())
    }
}

/// Best-effort funds check; settlement re-checks by construction since the
/// transfer itself reverts on insufficient balance.
async fn assert_enough_balance<P: Provider>(
    contract: &IEIP3009::IEIP3009Instance<&P>,
    sender: &Address,
    required: U256,
) -> Result<(), Eip155ExactError> {
    let balance = contract.balanceOf(*sender).call().await?;
    if balance < required {
        Err(Eip155ExactError::rejected(
            ErrorReason::InsufficientFunds,
            format!("balance {balance}, required {required}"),
        ))
    } else {
        Ok(())
    }
}

/// Recovers the signer of the EIP-712 digest and checks it is the declared
/// payer. Accepts 65-byte `(r, s, v)` and 64-byte ERC-2098 signatures.
pub(crate) fn recover_payer(
    payload: &Eip3009Payload,
    domain: &Eip712Domain,
) -> Result<(Address, Signature), Eip155ExactError> {
    let authorization = &payload.authorization;
    let message = TransferWithAuthorization {
        from: authorization.from.into(),
        to: authorization.to.into(),
        value: authorization.value.into(),
        validAfter: U256::from(authorization.valid_after.as_secs()),
        validBefore: U256::from(authorization.valid_before.as_secs()),
        nonce: authorization.nonce,
    };
    let digest = message.eip712_signing_hash(domain);

    let bytes = &payload.signature;
    let signature = if bytes.len() == 65 {
        Signature::from_raw(bytes)
            .map_err(|e| {
                Eip155ExactError::rejected(ErrorReason::InvalidSignature, e.to_string())
            })?
            .normalized_s()
    } else if bytes.len() == 64 {
        Signature::from_erc2098(bytes).normalized_s()
    } else {
        return Err(Eip155ExactError::rejected(
            ErrorReason::InvalidSignature,
            format!("unsupported signature length {}", bytes.len()),
        ));
    };

    let recovered = signature
        .recover_address_from_prehash(&digest)
        .map_err(|e| Eip155ExactError::rejected(ErrorReason::InvalidSignature, e.to_string()))?;
    if recovered != Address::from(authorization.from) {
        return Err(Eip155ExactError::rejected(
            ErrorReason::InvalidSignature,
            "recovered signer does not match payer",
        ));
    }
    Ok((recovered, signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Bytes;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    use crate::chain::TokenAmount;
    use crate::exact::types::Eip3009Authorization;

    fn domain() -> Eip712Domain {
        eip712_domain! {
            name: "USDC",
            version: "2",
            chain_id: 84532u64,
            verifying_contract: Address::repeat_byte(0x22),
        }
    }

    fn signed_payload(signer: &PrivateKeySigner) -> Eip3009Payload {
        let authorization = Eip3009Authorization {
            from: signer.address().into(),
            to: Address::repeat_byte(0x11).into(),
            value: TokenAmount::from(1000u64),
            valid_after: UnixTimestamp::from_secs(1_700_000_000),
            valid_before: UnixTimestamp::from_secs(1_700_000_300),
            nonce: B256::repeat_byte(0x42),
        };
        let message = TransferWithAuthorization {
            from: authorization.from.into(),
            to: authorization.to.into(),
            value: authorization.value.into(),
            validAfter: U256::from(authorization.valid_after.as_secs()),
            validBefore: U256::from(authorization.valid_before.as_secs()),
            nonce: authorization.nonce,
        };
        let digest = message.eip712_signing_hash(&domain());
        let signature = signer.sign_hash_sync(&digest).unwrap();
        Eip3009Payload {
            signature: Bytes::from(signature.as_bytes().to_vec()),
            authorization,
        }
    }

    #[test]
    fn recovers_signer() {
        let signer = PrivateKeySigner::random();
        let payload = signed_payload(&signer);
        let (payer, _) = recover_payer(&payload, &domain()).unwrap();
        assert_eq!(payer, signer.address());
    }

    #[test]
    fn rejects_wrong_signer() {
        let signer = PrivateKeySigner::random();
        let mut payload = signed_payload(&signer);
        // Claim a different payer than the one that signed.
        payload.authorization.from = Address::repeat_byte(0x99).into();
        let err = recover_payer(&payload, &domain()).unwrap_err();
        assert!(matches!(
            err,
            Eip155ExactError::Rejected {
                reason: ErrorReason::InvalidSignature,
                ..
            }
        ));
    }

    #[test]
    fn rejects_garbage_signature() {
        let signer = PrivateKeySigner::random();
        let mut payload = signed_payload(&signer);
        payload.signature = Bytes::from(vec![0xab; 65]);
        assert!(recover_payer(&payload, &domain()).is_err());

        payload.signature = Bytes::from(vec![0xab; 12]);
        let err = recover_payer(&payload, &domain()).unwrap_err();
        assert!(matches!(
            err,
            Eip155ExactError::Rejected {
                reason: ErrorReason::InvalidSignature,
                ..
            }
        ));
    }

    #[test]
    fn rejects_wrong_domain() {
        let signer = PrivateKeySigner::random();
        let payload = signed_payload(&signer);
        let other_domain = eip712_domain! {
            name: "USDC",
            version: "1",
            chain_id: 84532u64,
            verifying_contract: Address::repeat_byte(0x22),
        };
        // Recovery over a different domain yields a different address.
        let err = recover_payer(&payload, &other_domain).unwrap_err();
        assert!(matches!(err, Eip155ExactError::Rejected { .. }));
    }

    #[test]
    fn time_window_checks() {
        let past = UnixTimestamp::from_secs(1_000);
        let future = UnixTimestamp::from_secs(u64::MAX - 1);
        assert!(assert_time(past, future).is_ok());
        assert!(assert_time(past, past).is_err());
        assert!(assert_time(future, future).is_err());
    }

    #[test]
    fn value_check() {
        assert!(assert_enough_value(U256::from(1000), U256::from(1000)).is_ok());
        assert!(assert_enough_value(U256::from(1001), U256::from(1000)).is_ok());
        assert!(assert_enough_value(U256::from(999), U256::from(1000)).is_err());
    }
}
