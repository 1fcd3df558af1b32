//! The `(scheme, network)` mechanism registry.
//!
//! A mechanism is the concrete implementation of one payment scheme on one
//! chain family. It exposes up to three capability sets, and each protocol
//! role registers only the sides it plays:
//!
//! - [`client::SchemeClient`] - builds and signs payment payloads (buyer)
//! - [`SchemeServer`] - enriches requirements, parses prices, matches
//!   payloads to offers (resource server)
//! - [`SchemeFacilitator`] - verifies and settles payments (facilitator)
//!
//! Registries are keyed by [`SchemeKey`]. Lookups resolve an exact
//! `(scheme, network)` entry first, then fall back to a namespace wildcard
//! (`exact` @ `eip155:*`) so one chain-family-generic registration covers
//! every chain in the family.
//!
//! All registries are populated at startup and read-only afterwards;
//! concurrent reads need no synchronization.

pub mod client;

use std::collections::HashMap;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::chain::{ChainId, ChainProviderOps};
use crate::proto;
use crate::proto::v2;

/// Marker for the `"exact"` payment scheme: a fixed-amount transfer of a
/// specific asset. Serializes as the string `"exact"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ExactScheme;

impl ExactScheme {
    pub const NAME: &'static str = "exact";
}

impl AsRef<str> for ExactScheme {
    fn as_ref(&self) -> &str {
        Self::NAME
    }
}

impl Display for ExactScheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::NAME)
    }
}

impl serde::Serialize for ExactScheme {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(Self::NAME)
    }
}

impl<'de> serde::Deserialize<'de> for ExactScheme {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        if s == Self::NAME {
            Ok(ExactScheme)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected scheme {:?}, got {s:?}",
                Self::NAME
            )))
        }
    }
}

/// Lookup key for mechanism dispatch: one scheme on one network.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct SchemeKey {
    /// The scheme name (e.g., "exact").
    pub scheme: String,
    /// The network, exact or namespace wildcard (reference `*`).
    pub network: ChainId,
}

impl SchemeKey {
    /// Creates a key for an exact network.
    pub fn new<S: Into<String>>(scheme: S, network: ChainId) -> Self {
        Self {
            scheme: scheme.into(),
            network,
        }
    }

    /// The namespace-wildcard version of this key.
    ///
    /// `exact@eip155:8453` becomes `exact@eip155:*`.
    pub fn as_wildcard(&self) -> Self {
        Self {
            scheme: self.scheme.clone(),
            network: ChainId::new(self.network.namespace(), "*"),
        }
    }

    /// Whether this key uses a wildcard network reference.
    pub fn is_wildcard(&self) -> bool {
        self.network.reference() == "*"
    }
}

impl Display for SchemeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.scheme, self.network)
    }
}

/// A price converted into concrete on-network terms.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    /// Atomic-unit amount as a decimal string.
    pub amount: String,
    /// Network-scoped asset identifier.
    pub asset: String,
    /// Scheme-specific extra data the quote requires (e.g. EIP-712 domain).
    pub extra: Option<serde_json::Value>,
}

/// Server-side capabilities of a mechanism.
///
/// Used by the resource server when building challenges and matching
/// submitted payloads against offers. Implementations are chain-family
/// generic and typically registered under a namespace wildcard.
pub trait SchemeServer: Send + Sync {
    /// Merges facilitator-advertised data into an acceptor.
    ///
    /// Called at challenge build time with the cached supported kind for the
    /// acceptor's `(scheme, network)`, when the facilitator advertises one.
    /// The default keeps the requirements untouched.
    fn enhance_requirements(
        &self,
        requirements: v2::PaymentRequirements,
        kind: Option<&proto::SupportedPaymentKind>,
    ) -> v2::PaymentRequirements {
        let _ = kind;
        requirements
    }

    /// Converts an abstract price (e.g. `"$0.001"`) into on-network terms.
    ///
    /// Returns `None` when the mechanism has no converter for the price or
    /// network; the route configuration must then carry an atomic amount.
    fn parse_price(&self, price: &str, network: &ChainId) -> Option<PriceQuote>;

    /// Whether an offered requirement and the payload's accepted
    /// requirements denote the same payment terms.
    ///
    /// Compares the protocol-critical fields, deliberately ignoring
    /// `max_timeout_seconds` to avoid false-negative rejections.
    fn matches(&self, offered: &v2::PaymentRequirements, accepted: &v2::PaymentRequirements) -> bool {
        offered.scheme == accepted.scheme
            && offered.network == accepted.network
            && offered.amount == accepted.amount
            && offered.asset == accepted.asset
            && offered.pay_to == accepted.pay_to
    }
}

/// Facilitator-side capabilities of a mechanism.
///
/// Verification failures are values (`Ok(Invalid { .. })`), not errors; the
/// error type is reserved for infrastructure failures (RPC transport down,
/// signer unavailable) that map to 5xx at the HTTP boundary.
#[async_trait::async_trait]
pub trait SchemeFacilitator: Send + Sync {
    /// Verifies a payment authorization without settling it.
    async fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> Result<v2::VerifyResponse, SchemeFacilitatorError>;

    /// Settles a verified payment on-chain.
    async fn settle(
        &self,
        request: &proto::SettleRequest,
    ) -> Result<v2::SettleResponse, SchemeFacilitatorError>;

    /// The payment kinds this mechanism handles.
    async fn supported(&self) -> Result<proto::SupportedResponse, SchemeFacilitatorError>;
}

/// Infrastructure failures inside a mechanism.
#[derive(Debug, thiserror::Error)]
pub enum SchemeFacilitatorError {
    /// An on-chain interaction failed at the transport level.
    #[error("onchain error: {0}")]
    Onchain(String),
    /// Anything else unexpected.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Identity of a scheme implementation.
pub trait SchemeId {
    /// The chain namespace this scheme serves (e.g., "eip155").
    fn namespace(&self) -> &str;
    /// The scheme name (e.g., "exact").
    fn scheme(&self) -> &str;
    /// Stable blueprint id, e.g. `"eip155-exact"`.
    fn id(&self) -> String {
        format!("{}-{}", self.namespace(), self.scheme())
    }
}

/// Builds facilitator-side handlers from chain providers.
pub trait SchemeFacilitatorBuilder<P> {
    /// Creates a handler bound to the given provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is of the wrong chain family or the
    /// scheme-specific configuration is invalid.
    fn build(
        &self,
        provider: P,
        config: Option<serde_json::Value>,
    ) -> Result<Box<dyn SchemeFacilitator>, Box<dyn std::error::Error>>;
}

/// Marker trait for types that are both identifiable and buildable.
pub trait SchemeBlueprint<P>: SchemeId + for<'a> SchemeFacilitatorBuilder<&'a P> {}
impl<T, P> SchemeBlueprint<P> for T where T: SchemeId + for<'a> SchemeFacilitatorBuilder<&'a P> {}

/// Registry of scheme blueprints (factories), keyed by blueprint id.
pub struct SchemeBlueprints<P>(HashMap<String, Box<dyn SchemeBlueprint<P>>>, PhantomData<P>);

impl<P> Default for SchemeBlueprints<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Debug for SchemeBlueprints<P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let ids: Vec<&String> = self.0.keys().collect();
        f.debug_tuple("SchemeBlueprints").field(&ids).finish()
    }
}

impl<P> SchemeBlueprints<P> {
    /// Creates an empty blueprint registry.
    pub fn new() -> Self {
        Self(HashMap::new(), PhantomData)
    }

    /// Registers a blueprint and returns self for chaining.
    pub fn and_register<B: SchemeBlueprint<P> + 'static>(mut self, blueprint: B) -> Self {
        self.register(blueprint);
        self
    }

    /// Registers a scheme blueprint under its id.
    pub fn register<B: SchemeBlueprint<P> + 'static>(&mut self, blueprint: B) {
        self.0.insert(blueprint.id(), Box::new(blueprint));
    }

    /// Gets a blueprint by its id.
    pub fn get(&self, id: &str) -> Option<&dyn SchemeBlueprint<P>> {
        self.0.get(id).map(|v| &**v)
    }
}

/// Registry of active facilitator-side handlers.
///
/// Built once at startup from blueprints and chain providers; frozen
/// afterwards.
#[derive(Default)]
pub struct SchemeRegistry(HashMap<SchemeKey, Box<dyn SchemeFacilitator>>);

impl Debug for SchemeRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.0.keys().map(ToString::to_string).collect();
        f.debug_tuple("SchemeRegistry").field(&keys).finish()
    }
}

impl SchemeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Builds and registers a handler for a blueprint and provider.
    ///
    /// # Errors
    ///
    /// Propagates blueprint build failures.
    pub fn register<P: ChainProviderOps>(
        &mut self,
        blueprint: &dyn SchemeBlueprint<P>,
        provider: &P,
        config: Option<serde_json::Value>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let chain_id = provider.chain_id();
        let handler = blueprint.build(provider, config)?;
        let key = SchemeKey::new(blueprint.scheme(), chain_id.clone());
        tracing::info!(scheme = %blueprint.scheme(), network = %chain_id, "registered scheme handler");
        self.0.insert(key, handler);
        Ok(())
    }

    /// Looks up a handler: exact key first, namespace wildcard fallback.
    pub fn by_key(&self, key: &SchemeKey) -> Option<&dyn SchemeFacilitator> {
        self.0
            .get(key)
            .or_else(|| self.0.get(&key.as_wildcard()))
            .map(|h| &**h)
    }

    /// Whether any handler serves this scheme on any network.
    pub fn knows_scheme(&self, scheme: &str) -> bool {
        self.0.keys().any(|key| key.scheme == scheme)
    }

    /// Iterates over all registered handlers.
    pub fn values(&self) -> impl Iterator<Item = &dyn SchemeFacilitator> {
        self.0.values().map(|h| &**h)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Registry of server-side mechanism capabilities.
///
/// The resource server resolves each configured acceptor through this table
/// at startup and per request (for `matches`).
#[derive(Default, Clone)]
pub struct ServerSchemes(HashMap<SchemeKey, Arc<dyn SchemeServer>>);

impl Debug for ServerSchemes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.0.keys().map(ToString::to_string).collect();
        f.debug_tuple("ServerSchemes").field(&keys).finish()
    }
}

impl ServerSchemes {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Registers a server-side implementation for an exact network.
    pub fn register<S: SchemeServer + 'static>(
        &mut self,
        scheme: &str,
        network: ChainId,
        server: S,
    ) {
        self.0
            .insert(SchemeKey::new(scheme, network), Arc::new(server));
    }

    /// Registers a server-side implementation for a whole namespace.
    pub fn register_namespace<S: SchemeServer + 'static>(
        &mut self,
        scheme: &str,
        namespace: &str,
        server: S,
    ) {
        self.0.insert(
            SchemeKey::new(scheme, ChainId::new(namespace, "*")),
            Arc::new(server),
        );
    }

    /// Builder-style registration for a whole namespace.
    pub fn with_namespace<S: SchemeServer + 'static>(
        mut self,
        scheme: &str,
        namespace: &str,
        server: S,
    ) -> Self {
        self.register_namespace(scheme, namespace, server);
        self
    }

    /// Looks up the implementation: exact key first, wildcard fallback.
    pub fn by_key(&self, key: &SchemeKey) -> Option<Arc<dyn SchemeServer>> {
        self.0
            .get(key)
            .or_else(|| self.0.get(&key.as_wildcard()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamespaceWide;

    impl SchemeServer for NamespaceWide {
        fn parse_price(&self, _price: &str, _network: &ChainId) -> Option<PriceQuote> {
            None
        }
    }

    #[test]
    fn scheme_key_display_and_wildcard() {
        let key = SchemeKey::new("exact", ChainId::new("eip155", "8453"));
        assert_eq!(key.to_string(), "exact@eip155:8453");
        assert!(!key.is_wildcard());
        let wildcard = key.as_wildcard();
        assert_eq!(wildcard.to_string(), "exact@eip155:*");
        assert!(wildcard.is_wildcard());
    }

    #[test]
    fn server_schemes_wildcard_fallback() {
        let mut schemes = ServerSchemes::new();
        schemes.register_namespace("exact", "eip155", NamespaceWide);

        let base = SchemeKey::new("exact", ChainId::new("eip155", "8453"));
        let polygon = SchemeKey::new("exact", ChainId::new("eip155", "137"));
        let solana = SchemeKey::new(
            "exact",
            ChainId::new("solana", "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp"),
        );

        assert!(schemes.by_key(&base).is_some());
        assert!(schemes.by_key(&polygon).is_some());
        assert!(schemes.by_key(&solana).is_none());
    }

    #[test]
    fn default_matches_ignores_timeout() {
        let server = NamespaceWide;
        let offered: v2::PaymentRequirements = serde_json::from_value(serde_json::json!({
            "scheme": "exact",
            "network": "eip155:84532",
            "amount": "1000",
            "payTo": "0xP",
            "maxTimeoutSeconds": 300,
            "asset": "0xA",
            "extra": null
        }))
        .unwrap();
        let mut accepted = offered.clone();
        accepted.max_timeout_seconds = 60;
        assert!(server.matches(&offered, &accepted));

        accepted.amount = "2000".to_string();
        assert!(!server.matches(&offered, &accepted));
    }
}
