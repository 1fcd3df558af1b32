//! Wire types for the EIP-155 `exact` scheme.
//!
//! Payments are authorized off-chain with an ERC-3009
//! `transferWithAuthorization` message signed under the token's EIP-712
//! domain, and executed on-chain by the facilitator.

use alloy_primitives::{B256, Bytes};
use alloy_sol_types::sol;
use serde::{Deserialize, Serialize};

use pay402::proto::v2;
use pay402::scheme::ExactScheme;
use pay402::timestamp::UnixTimestamp;

use crate::chain::{ChecksummedAddress, TokenAmount};

/// Typed payment requirements for the EVM exact scheme.
pub type PaymentRequirements =
    v2::PaymentRequirements<ExactScheme, TokenAmount, ChecksummedAddress, Option<ExactExtra>>;

/// Typed payment payload for the EVM exact scheme.
pub type PaymentPayload = v2::PaymentPayload<PaymentRequirements, Eip3009Payload>;

/// Typed verify request for the EVM exact scheme.
pub type VerifyRequest = v2::VerifyRequest<PaymentPayload, PaymentRequirements>;

/// Typed settle request (same structure as verify).
pub type SettleRequest = VerifyRequest;

/// Scheme-specific `extra` data: the token's EIP-712 domain parameters.
///
/// Both are required to reconstruct the domain the buyer signed under
/// without an extra RPC round-trip. Unknown additional keys are tolerated.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactExtra {
    /// The token name as used in the EIP-712 domain.
    pub name: String,
    /// The token version as used in the EIP-712 domain.
    pub version: String,
}

/// EIP-712 structured data for an ERC-3009 transfer authorization.
///
/// Defines who can transfer, to whom, how much, during what window, under
/// which unique nonce.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip3009Authorization {
    /// The address authorizing the transfer (token owner).
    pub from: ChecksummedAddress,
    /// The recipient of the transfer.
    pub to: ChecksummedAddress,
    /// The amount, in the token's smallest unit.
    pub value: TokenAmount,
    /// Not valid before this timestamp (inclusive).
    pub valid_after: UnixTimestamp,
    /// Expires at this timestamp (exclusive).
    pub valid_before: UnixTimestamp,
    /// Unique 32-byte nonce preventing replay.
    pub nonce: B256,
}

/// The cryptographic artifact the buyer submits: signature + the structured
/// authorization it covers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip3009Payload {
    /// EIP-712 signature over [`TransferWithAuthorization`]. 65-byte
    /// `(r, s, v)` or 64-byte ERC-2098 compact form.
    pub signature: Bytes,
    /// The structured authorization data that was signed.
    pub authorization: Eip3009Authorization,
}

sol! {
    /// Solidity-compatible struct for ERC-3009 `transferWithAuthorization`
    /// typed-data signing. Field order and types must match EIP-3009.
    #[derive(Serialize, Deserialize)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
}

sol! {
    /// Minimal ERC-3009 + ERC-20 interface for USDC-style tokens.
    ///
    /// Only the functions the facilitator actually calls are declared.
    ///
    /// References:
    /// - ERC-3009: <https://eips.ethereum.org/EIPS/eip-3009>
    /// - USDC `FiatTokenV2_2`: <https://github.com/circlefin/stablecoin-evm>
    #[allow(missing_docs)]
    #[allow(clippy::too_many_arguments)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IEIP3009 {
        function name() external view returns (string);
        function version() external view returns (string);
        function balanceOf(address account) external view returns (uint256);
        function authorizationState(address authorizer, bytes32 nonce) external view returns (bool);
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;
    }
}
