//! x402 facilitator server: HTTP surface over the local facilitator engine.
//!
//! Endpoints:
//! - `POST /verify` - verify a payment payload against requirements
//! - `POST /settle` - settle an accepted payment on-chain
//! - `GET /supported` - list supported payment kinds
//! - `GET /verify`, `GET /settle` - endpoint descriptions
//! - `GET /health` - liveness through the full dispatch path
//!
//! Configuration comes from a JSON file (chains keyed by CAIP-2 id, schemes
//! by blueprint id) with `.env` support for secrets.

pub mod chain;
pub mod config;
pub mod handlers;
pub mod run;
pub mod schemes;
pub mod sig_down;
