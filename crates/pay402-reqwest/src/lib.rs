//! Client-side x402 payment handling for reqwest.
//!
//! [`X402Client`] implements `reqwest_middleware::Middleware`: when a
//! request comes back `402 Payment Required`, it parses the challenge,
//! selects an acceptor it can pay, signs the payment with a registered
//! mechanism client, and retries the request once with the
//! `PAYMENT-SIGNATURE` header attached. A second 402 is a permanent failure
//! and is returned to the caller untouched.
//!
//! ## Example
//!
//! ```rust,no_run
//! use alloy_signer_local::PrivateKeySigner;
//! use pay402_reqwest::{ReqwestWithPayments, X402Client};
//! use pay402_eip155::exact::Eip155ExactClient;
//!
//! # fn build() -> Result<(), Box<dyn std::error::Error>> {
//! let signer: PrivateKeySigner = "0xPRIVATE_KEY".parse()?;
//! let http = reqwest::Client::new().with_payments(
//!     X402Client::new().register(Eip155ExactClient::new(signer)),
//! );
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod policy;

pub use client::{ParsedChallenge, ReqwestWithPayments, X402Client, decode_receipt};
pub use policy::SpendingCap;
