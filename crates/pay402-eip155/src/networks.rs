//! Known EVM networks and their USDC deployments.
//!
//! USDC is the pricing anchor of the `exact` scheme: a money price like
//! `"$0.001"` resolves to the network's USDC deployment scaled by its six
//! decimals.

use alloy_primitives::address;

use crate::chain::{Eip155ChainReference, Eip155TokenDeployment, TokenEip712};
use pay402::chain::ChainId;

/// Marker for USDC token deployments.
#[derive(Debug, Clone, Copy)]
#[allow(clippy::upper_case_acronyms)]
pub struct USDC;

impl USDC {
    /// USDC on Ethereum mainnet.
    pub fn ethereum() -> Eip155TokenDeployment {
        Eip155TokenDeployment {
            chain_reference: Eip155ChainReference::new(1),
            address: address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            decimals: 6,
            eip712: Some(TokenEip712 {
                name: "USD Coin".into(),
                version: "2".into(),
            }),
        }
    }

    /// USDC on Base.
    pub fn base() -> Eip155TokenDeployment {
        Eip155TokenDeployment {
            chain_reference: Eip155ChainReference::new(8453),
            address: address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
            decimals: 6,
            eip712: Some(TokenEip712 {
                name: "USD Coin".into(),
                version: "2".into(),
            }),
        }
    }

    /// USDC on Base Sepolia.
    pub fn base_sepolia() -> Eip155TokenDeployment {
        Eip155TokenDeployment {
            chain_reference: Eip155ChainReference::new(84532),
            address: address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
            decimals: 6,
            eip712: Some(TokenEip712 {
                name: "USDC".into(),
                version: "2".into(),
            }),
        }
    }

    /// USDC on Polygon PoS.
    pub fn polygon() -> Eip155TokenDeployment {
        Eip155TokenDeployment {
            chain_reference: Eip155ChainReference::new(137),
            address: address!("0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359"),
            decimals: 6,
            eip712: Some(TokenEip712 {
                name: "USD Coin".into(),
                version: "2".into(),
            }),
        }
    }

    /// USDC on Polygon Amoy.
    pub fn polygon_amoy() -> Eip155TokenDeployment {
        Eip155TokenDeployment {
            chain_reference: Eip155ChainReference::new(80002),
            address: address!("0x41E94Eb019C0762f9Bfcf9Fb1E58725BfB0e7582"),
            decimals: 6,
            eip712: Some(TokenEip712 {
                name: "USDC".into(),
                version: "2".into(),
            }),
        }
    }

    /// USDC on Avalanche C-Chain.
    pub fn avalanche() -> Eip155TokenDeployment {
        Eip155TokenDeployment {
            chain_reference: Eip155ChainReference::new(43114),
            address: address!("0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"),
            decimals: 6,
            eip712: Some(TokenEip712 {
                name: "USD Coin".into(),
                version: "2".into(),
            }),
        }
    }

    /// USDC on Avalanche Fuji.
    pub fn avalanche_fuji() -> Eip155TokenDeployment {
        Eip155TokenDeployment {
            chain_reference: Eip155ChainReference::new(43113),
            address: address!("0x5425890298aed601595a70AB815c96711a31Bc65"),
            decimals: 6,
            eip712: Some(TokenEip712 {
                name: "USD Coin".into(),
                version: "2".into(),
            }),
        }
    }

    /// Resolves the USDC deployment for a chain id, if one is known.
    pub fn by_chain_id(chain_id: &ChainId) -> Option<Eip155TokenDeployment> {
        let reference = Eip155ChainReference::try_from(chain_id).ok()?;
        let deployment = match reference.inner() {
            1 => Self::ethereum(),
            8453 => Self::base(),
            84532 => Self::base_sepolia(),
            137 => Self::polygon(),
            80002 => Self::polygon_amoy(),
            43114 => Self::avalanche(),
            43113 => Self::avalanche_fuji(),
            _ => return None,
        };
        Some(deployment)
    }
}
