//! EVM chain plumbing: wire types, configuration, and the alloy provider.

mod provider;
mod types;

pub use provider::{
    Eip155ChainProvider, Eip155MetaTransactionProvider, InnerProvider, MetaTransaction,
    MetaTransactionSendError,
};
pub use types::{
    ChecksummedAddress, EIP155_NAMESPACE, Eip155ChainReference, Eip155ChainReferenceFormatError,
    Eip155TokenDeployment, TokenAmount, TokenEip712,
};

use serde::{Deserialize, Serialize};

use pay402::chain::ChainId;
use pay402::config::{LiteralOrEnv, RpcConfig};

/// Configuration for one EVM chain, as it appears in the facilitator's
/// config file under its CAIP-2 key.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Eip155ChainConfigInner {
    /// RPC endpoints, tried in fallback order.
    pub rpc: Vec<RpcConfig>,
    /// Hex-encoded signer private keys; `$VAR` syntax resolves from the
    /// environment.
    pub signers: Vec<LiteralOrEnv<String>>,
    /// Whether the chain supports EIP-1559 gas pricing.
    #[serde(default = "defaults::eip1559")]
    pub eip1559: bool,
    /// How long to wait for a settlement receipt.
    #[serde(default = "defaults::receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
}

mod defaults {
    pub fn eip1559() -> bool {
        true
    }
    pub fn receipt_timeout_secs() -> u64 {
        30
    }
}

/// An [`Eip155ChainConfigInner`] bound to its chain.
#[derive(Debug, Clone)]
pub struct Eip155ChainConfig {
    chain_reference: Eip155ChainReference,
    /// The chain-family-specific settings.
    pub inner: Eip155ChainConfigInner,
}

impl Eip155ChainConfig {
    /// Binds chain settings to a chain reference.
    pub fn new(chain_reference: Eip155ChainReference, inner: Eip155ChainConfigInner) -> Self {
        Self {
            chain_reference,
            inner,
        }
    }

    /// The numeric chain reference.
    pub fn chain_reference(&self) -> Eip155ChainReference {
        self.chain_reference
    }

    /// The CAIP-2 chain id.
    pub fn chain_id(&self) -> ChainId {
        self.chain_reference.as_chain_id()
    }
}
