//! Axum middleware for enforcing x402 payments on protected routes.
//!
//! The middleware intercepts requests to configured routes, emits a `402`
//! challenge when no payment accompanies the request, verifies and settles
//! submitted payments through a [`pay402::facilitator::Facilitator`]
//! (in-process or remote over HTTP), and attaches the settlement receipt to
//! successful responses.
//!
//! ## Example
//!
//! ```rust,no_run
//! use pay402::extensions::ExtensionRegistry;
//! use pay402::scheme::ServerSchemes;
//! use pay402_axum::{AcceptorConfig, Price, RouteTable, X402Middleware};
//! use pay402_axum::facilitator_client::FacilitatorClient;
//! use pay402_eip155::exact::Eip155ExactServer;
//!
//! # async fn build() -> Result<(), Box<dyn std::error::Error>> {
//! let routes = RouteTable::new().route(
//!     "GET /protected",
//!     vec![AcceptorConfig::new(
//!         "exact",
//!         "eip155:84532",
//!         "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
//!         Price::money("$0.001"),
//!     )?],
//! )?;
//!
//! let schemes = ServerSchemes::new()
//!     .with_namespace("exact", "eip155", Eip155ExactServer);
//! let facilitator = FacilitatorClient::try_from("https://facilitator.example/")?;
//! let middleware = X402Middleware::new(routes, schemes, facilitator)
//!     .with_extensions(ExtensionRegistry::new())
//!     .initialize()
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! The `pay402-eip155` dev-dependency in the example stands in for whatever
//! mechanism crates the application registers.

pub mod facilitator_client;
pub mod hooks;
pub mod layer;
pub mod paygate;
pub mod routes;

pub use hooks::{NoopHooks, PaygateHooks, PaymentContext};
pub use layer::{InitError, X402Layer, X402Middleware, X402MiddlewareService};
pub use paygate::InfraFailure;
pub use routes::{AcceptorConfig, Price, RouteConfig, RouteTable, RouteTableError};

/// Client → server header carrying the base64url payment payload.
pub const PAYMENT_SIGNATURE_HEADER: &str = "PAYMENT-SIGNATURE";
/// Server → client header duplicating the 402 challenge body.
pub const PAYMENT_REQUIRED_HEADER: &str = "PAYMENT-REQUIRED";
/// Server → client header carrying the base64url settlement receipt.
pub const PAYMENT_RESPONSE_HEADER: &str = "PAYMENT-RESPONSE";
