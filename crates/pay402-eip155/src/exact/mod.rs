//! The `exact` payment scheme on EIP-155 chains.
//!
//! A fixed-amount ERC-20 transfer authorized off-chain via ERC-3009
//! `transferWithAuthorization` and executed by the facilitator's signer, so
//! the buyer pays no gas.
//!
//! The three capability sets live in their own modules:
//! [`client`], [`server`], and [`facilitator`].

pub mod client;
pub mod facilitator;
pub mod server;
pub mod types;

pub use client::Eip155ExactClient;
pub use facilitator::Eip155ExactFacilitator;
pub use server::Eip155ExactServer;
pub use types::{
    Eip3009Authorization, Eip3009Payload, ExactExtra, TransferWithAuthorization,
};

use alloy_provider::Provider;

use pay402::chain::ChainProviderOps;
use pay402::scheme::{ExactScheme, SchemeFacilitator, SchemeFacilitatorBuilder, SchemeId};

use crate::chain::{Eip155MetaTransactionProvider, MetaTransactionSendError};

/// Blueprint for the EVM `exact` mechanism.
///
/// Register it with the facilitator's blueprint set and build handlers per
/// configured chain; the resource server registers
/// [`Eip155ExactServer`] under the `eip155` namespace instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eip155Exact;

impl SchemeId for Eip155Exact {
    fn namespace(&self) -> &str {
        "eip155"
    }

    fn scheme(&self) -> &str {
        ExactScheme.as_ref()
    }
}

impl<P> SchemeFacilitatorBuilder<P> for Eip155Exact
where
    P: Eip155MetaTransactionProvider<Error = MetaTransactionSendError>
        + ChainProviderOps
        + Send
        + Sync
        + 'static,
    P::Inner: Provider,
{
    fn build(
        &self,
        provider: P,
        _config: Option<serde_json::Value>,
    ) -> Result<Box<dyn SchemeFacilitator>, Box<dyn std::error::Error>> {
        Ok(Box::new(Eip155ExactFacilitator::new(provider)))
    }
}
