//! Blockchain identifiers and provider abstractions.
//!
//! The x402 protocol addresses networks by [CAIP-2](https://standards.chainagnostic.org/CAIPs/caip-2)
//! chain identifiers. This module provides:
//!
//! - [`ChainId`] - a validated CAIP-2 identifier (`namespace:reference`)
//! - [`ChainIdPattern`] - wildcard/exact/set matching over chain ids
//! - [`ChainProviderOps`] / [`FromConfig`] - the minimal surface a chain
//!   provider exposes to the registry machinery
//! - [`ChainRegistry`] - configured providers keyed by chain id

mod chain_id;

pub use chain_id::{ChainId, ChainIdFormatError, ChainIdPattern};

use std::collections::HashMap;

/// Minimal operations every chain provider exposes to the scheme machinery.
pub trait ChainProviderOps {
    /// Addresses of the signers this provider controls, in wire form.
    fn signer_addresses(&self) -> Vec<String>;
    /// The CAIP-2 identifier of the chain this provider talks to.
    fn chain_id(&self) -> ChainId;
}

impl<T: ChainProviderOps> ChainProviderOps for std::sync::Arc<T> {
    fn signer_addresses(&self) -> Vec<String> {
        (**self).signer_addresses()
    }

    fn chain_id(&self) -> ChainId {
        (**self).chain_id()
    }
}

/// Asynchronous construction of a provider from its configuration.
#[async_trait::async_trait]
pub trait FromConfig<TConfig>: Sized {
    /// Builds a provider, connecting to RPC endpoints and loading signers.
    async fn from_config(config: &TConfig) -> Result<Self, Box<dyn std::error::Error>>;
}

/// Configured chain providers keyed by chain id.
///
/// Populated once at startup and read-only thereafter.
#[derive(Debug, Default)]
pub struct ChainRegistry<P>(HashMap<ChainId, P>);

impl<P: ChainProviderOps> ChainRegistry<P> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Inserts a provider under its own chain id.
    pub fn insert(&mut self, provider: P) {
        self.0.insert(provider.chain_id(), provider);
    }

    /// Looks up the provider for an exact chain id.
    pub fn by_chain_id(&self, chain_id: &ChainId) -> Option<&P> {
        self.0.get(chain_id)
    }

    /// Returns every provider whose chain id matches the pattern.
    pub fn by_pattern(&self, pattern: &ChainIdPattern) -> Vec<&P> {
        self.0
            .iter()
            .filter(|(chain_id, _)| pattern.matches(chain_id))
            .map(|(_, provider)| provider)
            .collect()
    }

    /// Iterates over all registered providers.
    pub fn values(&self) -> impl Iterator<Item = &P> {
        self.0.values()
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the registry holds no providers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[async_trait::async_trait]
impl<P, C> FromConfig<Vec<C>> for ChainRegistry<P>
where
    P: ChainProviderOps + FromConfig<C> + Send,
    C: Sync,
{
    async fn from_config(configs: &Vec<C>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut registry = Self::new();
        for config in configs {
            let provider = P::from_config(config).await?;
            registry.insert(provider);
        }
        Ok(registry)
    }
}
