//! Declarative protocol extensions.
//!
//! Extensions are keyed attachments that ride along the core flow without
//! touching the billing decision. On the resource server they hook into two
//! points:
//!
//! - `enrich_challenge` runs at challenge build time and may refine the
//!   declaration advertised in `PaymentRequired.extensions`;
//! - `validate_payload` runs between `verify` and handler dispatch against
//!   the value the client attached under the same key.
//!
//! A validation failure is treated exactly like a verification failure
//! (`402 extension_validation_failed`); extensions cannot turn an invalid
//! payment valid or a valid one invalid.

pub mod idempotency;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::proto::v2;

/// A declarative extension attachment in a challenge.
///
/// Opaque to the core; only the extension logic on both sides inspects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionDecl {
    /// Extension-defined payload describing the attachment.
    pub info: serde_json::Value,
    /// Optional JSON schema for the value clients should attach.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

/// A protocol extension registered on the resource server.
#[async_trait::async_trait]
pub trait Extension: Send + Sync {
    /// The key this extension owns in `extensions` maps.
    fn key(&self) -> &str;

    /// The base declaration advertised in challenges.
    fn declaration(&self) -> ExtensionDecl;

    /// Refines the declaration for a concrete challenge.
    ///
    /// The default returns the declaration untouched.
    fn enrich_challenge(
        &self,
        decl: ExtensionDecl,
        requirements: &[v2::PaymentRequirements],
    ) -> ExtensionDecl {
        let _ = requirements;
        decl
    }

    /// Validates the value the client attached under this extension's key.
    ///
    /// `value` is `None` when the client attached nothing.
    async fn validate_payload(
        &self,
        value: Option<&serde_json::Value>,
    ) -> Result<(), ExtensionError>;
}

/// Why an extension rejected a payload.
#[derive(Debug, thiserror::Error)]
#[error("extension {key}: {message}")]
pub struct ExtensionError {
    /// The extension that rejected the payload.
    pub key: String,
    /// Human-readable detail, logged but not sent over the wire.
    pub message: String,
}

impl ExtensionError {
    /// Creates an error for the given extension key.
    pub fn new<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Registered extensions keyed by name.
///
/// Populated at startup and read-only afterwards.
#[derive(Default, Clone)]
pub struct ExtensionRegistry(BTreeMap<String, Arc<dyn Extension>>);

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&String> = self.0.keys().collect();
        f.debug_tuple("ExtensionRegistry").field(&keys).finish()
    }
}

impl ExtensionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Registers an extension under its own key.
    pub fn register<E: Extension + 'static>(&mut self, extension: E) {
        self.0.insert(extension.key().to_string(), Arc::new(extension));
    }

    /// Builder-style registration.
    pub fn with<E: Extension + 'static>(mut self, extension: E) -> Self {
        self.register(extension);
        self
    }

    /// Looks up an extension by key.
    pub fn get(&self, key: &str) -> Option<&Arc<dyn Extension>> {
        self.0.get(key)
    }

    /// Whether all of the given keys are registered.
    pub fn knows_all(&self, keys: &[String]) -> bool {
        keys.iter().all(|key| self.0.contains_key(key))
    }

    /// Builds the enriched declaration map for a challenge.
    ///
    /// Only extensions named by `keys` (the route's declared extensions)
    /// contribute; unknown keys are skipped and logged.
    pub fn declarations(
        &self,
        keys: &[String],
        requirements: &[v2::PaymentRequirements],
    ) -> BTreeMap<String, ExtensionDecl> {
        let mut declarations = BTreeMap::new();
        for key in keys {
            let Some(extension) = self.0.get(key) else {
                tracing::warn!(%key, "route names an unregistered extension");
                continue;
            };
            let decl = extension.enrich_challenge(extension.declaration(), requirements);
            declarations.insert(key.clone(), decl);
        }
        declarations
    }

    /// Runs `validate_payload` for every applicable extension.
    ///
    /// Returns the first failure; extensions not named by `keys` do not run.
    pub async fn validate(
        &self,
        keys: &[String],
        payload_extensions: Option<&BTreeMap<String, serde_json::Value>>,
    ) -> Result<(), ExtensionError> {
        for key in keys {
            let Some(extension) = self.0.get(key) else {
                continue;
            };
            let value = payload_extensions.and_then(|map| map.get(key));
            extension.validate_payload(value).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct RequiresMarker;

    #[async_trait::async_trait]
    impl Extension for RequiresMarker {
        fn key(&self) -> &str {
            "marker"
        }

        fn declaration(&self) -> ExtensionDecl {
            ExtensionDecl {
                info: json!({ "description": "attach a marker" }),
                schema: None,
            }
        }

        async fn validate_payload(
            &self,
            value: Option<&serde_json::Value>,
        ) -> Result<(), ExtensionError> {
            match value {
                Some(serde_json::Value::String(_)) => Ok(()),
                Some(_) => Err(ExtensionError::new("marker", "must be a string")),
                None => Err(ExtensionError::new("marker", "missing")),
            }
        }
    }

    #[tokio::test]
    async fn validates_applicable_extensions_only() {
        let registry = ExtensionRegistry::new().with(RequiresMarker);

        // Not named by the route: does not run.
        assert!(registry.validate(&[], None).await.is_ok());

        // Named and missing: fails.
        let keys = vec!["marker".to_string()];
        assert!(registry.validate(&keys, None).await.is_err());

        // Named and present: passes.
        let mut values = BTreeMap::new();
        values.insert("marker".to_string(), json!("hello"));
        assert!(registry.validate(&keys, Some(&values)).await.is_ok());
    }

    #[test]
    fn declarations_skip_unknown_keys() {
        let registry = ExtensionRegistry::new().with(RequiresMarker);
        let declarations =
            registry.declarations(&["marker".to_string(), "missing".to_string()], &[]);
        assert_eq!(declarations.len(), 1);
        assert!(declarations.contains_key("marker"));
    }
}
