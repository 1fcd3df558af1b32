//! Core types for the x402 payment protocol.
//!
//! This crate provides the foundational types used throughout the pay402
//! workspace for implementing HTTP 402 Payment Required flows. It is
//! blockchain-agnostic; chain-specific mechanisms live in separate crates.
//!
//! # Overview
//!
//! When a client requests a paid resource, the resource server responds with
//! a `402` challenge listing acceptable payments. The client signs a payment
//! authorization bound to one of the offered requirements and retries. A
//! facilitator — in-process or reached over HTTP — verifies the
//! authorization and settles the transfer on the underlying network.
//!
//! # Modules
//!
//! - [`chain`] - CAIP-2 chain identifiers, patterns, and provider abstractions
//! - [`config`] - RPC config, environment variable resolution, scheme config
//! - [`extensions`] - Declarative protocol extensions (idempotency id, ...)
//! - [`facilitator`] - Core trait for payment verification and settlement
//! - [`facilitator_local`] - In-process facilitator dispatching to mechanisms
//! - [`networks`] - Registry of well-known networks and legacy v1 names
//! - [`proto`] - Wire format types for protocol messages
//! - [`scheme`] - The `(scheme, network)` mechanism registry
//! - [`timestamp`] - Unix timestamp utilities for authorization windows
//! - [`util`] - Helper types (base64url, money amounts)

pub mod chain;
pub mod config;
pub mod extensions;
pub mod facilitator;
pub mod facilitator_local;
pub mod networks;
pub mod proto;
pub mod scheme;
pub mod timestamp;
pub mod util;
