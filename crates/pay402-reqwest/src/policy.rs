//! Wallet-side payment policies.

use std::collections::HashMap;

use pay402::chain::ChainId;
use pay402::scheme::client::{PaymentCandidate, PaymentPolicy};

/// Per-`(network, asset)` spending caps.
///
/// An acceptor whose amount exceeds the configured cap for its network and
/// asset is rejected before selection. Assets without a cap are unrestricted.
///
/// # Example
///
/// ```
/// use pay402_reqwest::SpendingCap;
///
/// let cap = SpendingCap::new()
///     .cap("eip155:84532", "0x036CbD53842c5426634e7929541eC2318f3dCF7e", 10_000)
///     .unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct SpendingCap {
    caps: HashMap<(ChainId, String), u128>,
}

impl SpendingCap {
    /// Creates an empty (unrestricted) policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the atomic amount payable in `asset` on `network`.
    ///
    /// `network` accepts CAIP-2 or a legacy network name. Asset comparison
    /// is case-insensitive.
    pub fn cap(
        mut self,
        network: &str,
        asset: &str,
        max_amount: u128,
    ) -> Result<Self, pay402::chain::ChainIdFormatError> {
        let network = ChainId::normalize(network)?;
        self.caps
            .insert((network, asset.to_lowercase()), max_amount);
        Ok(self)
    }
}

impl PaymentPolicy for SpendingCap {
    fn allows(&self, candidate: &PaymentCandidate) -> bool {
        let key = (candidate.chain_id.clone(), candidate.asset.to_lowercase());
        match self.caps.get(&key) {
            Some(max) => candidate.amount <= *max,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(network: &str, asset: &str, amount: u128) -> PaymentCandidate {
        PaymentCandidate {
            chain_id: network.parse().unwrap(),
            asset: asset.into(),
            amount,
            scheme: "exact".into(),
            client_index: 0,
            raw_acceptor: serde_json::Value::Null,
            resource: None,
        }
    }

    const USDC: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";

    #[test]
    fn caps_apply_per_network_and_asset() {
        let policy = SpendingCap::new().cap("eip155:84532", USDC, 1000).unwrap();

        assert!(policy.allows(&candidate("eip155:84532", USDC, 1000)));
        assert!(!policy.allows(&candidate("eip155:84532", USDC, 1001)));

        // Other networks and assets are unrestricted.
        assert!(policy.allows(&candidate("eip155:8453", USDC, 1_000_000)));
        assert!(policy.allows(&candidate("eip155:84532", "0xOTHER", 1_000_000)));
    }

    #[test]
    fn asset_comparison_is_case_insensitive() {
        let policy = SpendingCap::new()
            .cap("eip155:84532", &USDC.to_uppercase(), 1000)
            .unwrap();
        assert!(!policy.allows(&candidate("eip155:84532", USDC, 2000)));
    }
}
