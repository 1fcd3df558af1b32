//! EVM (EIP-155) mechanism for the x402 `exact` payment scheme.
//!
//! Implements the full mechanism trio for fixed-amount ERC-20 transfers
//! authorized via ERC-3009 `transferWithAuthorization`:
//!
//! - [`exact::Eip155ExactClient`] signs EIP-712 authorizations (buyer side)
//! - [`exact::Eip155ExactServer`] converts prices and matches payloads
//!   (resource-server side)
//! - [`exact::Eip155ExactFacilitator`] verifies and settles on-chain
//!   (facilitator side)
//!
//! The [`chain`] module carries the alloy-based provider plumbing and the
//! wire types for EVM values; [`networks`] the known EVM networks and USDC
//! deployments used for price conversion.

pub mod chain;
pub mod exact;
pub mod networks;

pub use exact::Eip155Exact;
