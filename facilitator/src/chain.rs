//! The facilitator's chain provider wrapper.
//!
//! Wraps the chain-family-specific providers behind one enum so the scheme
//! registry machinery can be written once. Only EVM chains are wired in this
//! deployment; further families slot in as new variants.

use std::sync::Arc;

use pay402::chain::{ChainId, ChainProviderOps, FromConfig};
use pay402_eip155::chain::Eip155ChainProvider;

use crate::config::ChainConfig;

/// A configured blockchain provider.
#[derive(Debug, Clone)]
pub enum ChainProvider {
    /// Provider for EVM-compatible networks.
    Eip155(Arc<Eip155ChainProvider>),
}

#[async_trait::async_trait]
impl FromConfig<ChainConfig> for ChainProvider {
    async fn from_config(config: &ChainConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let provider = match config {
            ChainConfig::Eip155(config) => {
                let provider = Eip155ChainProvider::from_config(config).await?;
                ChainProvider::Eip155(Arc::new(provider))
            }
        };
        Ok(provider)
    }
}

impl ChainProviderOps for ChainProvider {
    fn signer_addresses(&self) -> Vec<String> {
        match self {
            ChainProvider::Eip155(provider) => provider.signer_addresses(),
        }
    }

    fn chain_id(&self) -> ChainId {
        match self {
            ChainProvider::Eip155(provider) => provider.chain_id(),
        }
    }
}
