//! Well-known blockchain networks and legacy v1 name normalization.
//!
//! Protocol v1 addressed networks by human-readable names (`"base-sepolia"`);
//! v2 uses CAIP-2 chain ids. This table keeps both worlds connected: incoming
//! legacy names normalize to CAIP-2 at ingress, and chain ids can be rendered
//! back to a friendly name for logs.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::chain::ChainId;

/// A known network definition with its chain id and human-readable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Human-readable network name (e.g., "base-sepolia", "solana").
    pub name: &'static str,
    /// CAIP-2 namespace (e.g., "eip155", "solana").
    pub namespace: &'static str,
    /// Chain reference (e.g., "84532" for Base Sepolia).
    pub reference: &'static str,
}

impl NetworkInfo {
    /// Creates a [`ChainId`] from this network info.
    pub fn chain_id(&self) -> ChainId {
        ChainId::new(self.namespace, self.reference)
    }
}

/// Well-known networks, EVM first, then Solana, then Aptos.
pub static KNOWN_NETWORKS: &[NetworkInfo] = &[
    NetworkInfo {
        name: "ethereum",
        namespace: "eip155",
        reference: "1",
    },
    NetworkInfo {
        name: "base",
        namespace: "eip155",
        reference: "8453",
    },
    NetworkInfo {
        name: "base-sepolia",
        namespace: "eip155",
        reference: "84532",
    },
    NetworkInfo {
        name: "polygon",
        namespace: "eip155",
        reference: "137",
    },
    NetworkInfo {
        name: "polygon-amoy",
        namespace: "eip155",
        reference: "80002",
    },
    NetworkInfo {
        name: "avalanche",
        namespace: "eip155",
        reference: "43114",
    },
    NetworkInfo {
        name: "avalanche-fuji",
        namespace: "eip155",
        reference: "43113",
    },
    NetworkInfo {
        name: "solana",
        namespace: "solana",
        reference: "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp",
    },
    NetworkInfo {
        name: "solana-devnet",
        namespace: "solana",
        reference: "EtWTRABZaYq6iMfeYKouRu166VU2xqa1",
    },
    NetworkInfo {
        name: "aptos",
        namespace: "aptos",
        reference: "1",
    },
    NetworkInfo {
        name: "aptos-testnet",
        namespace: "aptos",
        reference: "2",
    },
];

static NAME_TO_CHAIN_ID: LazyLock<HashMap<&'static str, ChainId>> = LazyLock::new(|| {
    KNOWN_NETWORKS
        .iter()
        .map(|info| (info.name, info.chain_id()))
        .collect()
});

static CHAIN_ID_TO_NAME: LazyLock<HashMap<ChainId, &'static str>> = LazyLock::new(|| {
    KNOWN_NETWORKS
        .iter()
        .map(|info| (info.chain_id(), info.name))
        .collect()
});

/// Looks up a chain id by its well-known network name.
///
/// ```
/// use pay402::networks::chain_id_by_network_name;
///
/// let base = chain_id_by_network_name("base").unwrap();
/// assert_eq!(base.to_string(), "eip155:8453");
/// assert!(chain_id_by_network_name("unknown").is_none());
/// ```
pub fn chain_id_by_network_name(name: &str) -> Option<&'static ChainId> {
    NAME_TO_CHAIN_ID.get(name)
}

/// Reverse lookup: the well-known name for a chain id, if any.
pub fn network_name_by_chain_id(chain_id: &ChainId) -> Option<&'static str> {
    CHAIN_ID_TO_NAME.get(chain_id).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_lookups() {
        let base_sepolia = chain_id_by_network_name("base-sepolia").unwrap();
        assert_eq!(base_sepolia.namespace(), "eip155");
        assert_eq!(base_sepolia.reference(), "84532");

        let solana = chain_id_by_network_name("solana").unwrap();
        assert_eq!(solana.reference(), "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp");
    }

    #[test]
    fn reverse_lookups() {
        let chain_id = ChainId::new("eip155", "8453");
        assert_eq!(network_name_by_chain_id(&chain_id), Some("base"));

        let unknown = ChainId::new("eip155", "999999");
        assert!(network_name_by_chain_id(&unknown).is_none());
    }

    #[test]
    fn table_is_bijective() {
        assert_eq!(NAME_TO_CHAIN_ID.len(), KNOWN_NETWORKS.len());
        assert_eq!(CHAIN_ID_TO_NAME.len(), KNOWN_NETWORKS.len());
    }
}
