//! Scheme blueprint wiring for the facilitator's [`ChainProvider`].
//!
//! Each blueprint extracts the chain-family provider it needs from the
//! generic enum and delegates to the mechanism crate's own builder.

use std::sync::Arc;

use pay402::scheme::{SchemeFacilitator, SchemeFacilitatorBuilder};
use pay402_eip155::Eip155Exact;
use pay402_eip155::chain::Eip155ChainProvider;

use crate::chain::ChainProvider;

impl SchemeFacilitatorBuilder<&ChainProvider> for Eip155Exact {
    fn build(
        &self,
        provider: &ChainProvider,
        config: Option<serde_json::Value>,
    ) -> Result<Box<dyn SchemeFacilitator>, Box<dyn std::error::Error>> {
        let eip155_provider = match provider {
            ChainProvider::Eip155(provider) => Arc::clone(provider),
        };
        SchemeFacilitatorBuilder::<Arc<Eip155ChainProvider>>::build(self, eip155_provider, config)
    }
}
