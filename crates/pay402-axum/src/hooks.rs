//! Lifecycle hooks for the payment gate.
//!
//! Three ordered hook points surround handler execution:
//!
//! 1. `on_before_execution` — after a successful verify, before the handler
//!    runs. Returning `false` aborts the request with `402 execution_blocked`.
//! 2. `on_after_execution` — after the handler returned, before settlement.
//! 3. `on_after_settlement` — after the settle attempt, success or failure.
//!
//! Hooks are best-effort observation surfaces (logging, metrics, quotas);
//! apart from the documented abort signal they cannot change the protocol
//! outcome. All methods have default no-op implementations.

use std::future::Future;
use std::pin::Pin;

use pay402::proto::v2;

/// Payment state visible to hooks.
#[derive(Debug, Clone)]
pub struct PaymentContext {
    /// The protected resource.
    pub resource: v2::ResourceInfo,
    /// The requirements the client accepted.
    pub accepted: v2::PaymentRequirements,
    /// The verified payer, once verification succeeded.
    pub payer: Option<String>,
    /// The settlement receipt, once a settle attempt completed.
    pub receipt: Option<v2::SettleResponse>,
}

/// Hook points around handler execution. Dyn-compatible; override only what
/// you need.
pub trait PaygateHooks: Send + Sync {
    /// Runs after verification, before the handler. Return `false` to abort
    /// with `402 execution_blocked`.
    fn on_before_execution<'a>(
        &'a self,
        _ctx: &'a PaymentContext,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async { true })
    }

    /// Runs after the handler produced a response, before settlement.
    fn on_after_execution<'a>(
        &'a self,
        _ctx: &'a PaymentContext,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }

    /// Runs after the settlement attempt; `ctx.receipt` carries the outcome.
    fn on_after_settlement<'a>(
        &'a self,
        _ctx: &'a PaymentContext,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }
}

/// The default hook set: observes nothing, blocks nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl PaygateHooks for NoopHooks {}
