//! The idempotency-id extension.
//!
//! A client may attach an opaque identifier under the `idempotency-id` key
//! of the payload's `extensions` map. When the route declares idempotency
//! required, the resource server may short-circuit duplicate requests by
//! returning the cached receipt instead of settling twice.
//!
//! The core defines the key grammar and the store contract; the store itself
//! is an external collaborator (the in-memory [`MemoryIdempotencyStore`] is
//! a reference, not a durability promise).

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use crate::extensions::{Extension, ExtensionDecl, ExtensionError};
use crate::proto::v2;
use crate::timestamp::UnixTimestamp;

/// Wire key of the idempotency extension.
pub const IDEMPOTENCY_KEY: &str = "idempotency-id";

static KEY_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Za-z0-9_-]{16,128}$").expect("valid key regex"));

/// A validated client-chosen idempotency identifier.
///
/// 16 to 128 characters from `[A-Za-z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// The raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IdempotencyKey {
    type Err = IdempotencyKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if KEY_RE.is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(IdempotencyKeyError(s.len()))
        }
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = IdempotencyKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IdempotencyKey> for String {
    fn from(value: IdempotencyKey) -> Self {
        value.0
    }
}

/// The key violates the grammar `[A-Za-z0-9_-]{16,128}`.
#[derive(Debug, thiserror::Error)]
#[error("idempotency key must be 16-128 chars of [A-Za-z0-9_-], got {0} chars or bad alphabet")]
pub struct IdempotencyKeyError(usize);

/// A receipt cached under an idempotency key.
#[derive(Debug, Clone)]
pub struct StoredReceipt {
    /// Fingerprint of the payload that earned the receipt.
    pub fingerprint: u64,
    /// The cached settlement receipt.
    pub receipt: v2::SettleResponse,
}

/// Fingerprints a payload for duplicate detection.
///
/// A duplicate key with a different fingerprint is a replay attempt and
/// must be refused.
pub fn payload_fingerprint(payload: &v2::PaymentPayload) -> u64 {
    let mut hasher = DefaultHasher::new();
    // Compact JSON is deterministic for the same payload value.
    if let Ok(json) = serde_json::to_string(payload) {
        json.hash(&mut hasher);
    }
    hasher.finish()
}

/// The store contract for idempotency receipts.
///
/// Entries must live at least as long as the route's `maxTimeoutSeconds`.
#[async_trait::async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Looks up a cached receipt.
    async fn get(&self, key: &IdempotencyKey) -> Option<StoredReceipt>;

    /// Stores a receipt under the key with the given time-to-live.
    async fn put(&self, key: IdempotencyKey, receipt: StoredReceipt, ttl: Duration);
}

/// In-memory reference store with per-entry expiry.
#[derive(Debug, Default)]
pub struct MemoryIdempotencyStore {
    entries: DashMap<IdempotencyKey, (StoredReceipt, UnixTimestamp)>,
}

impl MemoryIdempotencyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn get(&self, key: &IdempotencyKey) -> Option<StoredReceipt> {
        let entry = self.entries.get(key)?;
        let (stored, expires_at) = entry.value();
        if *expires_at < UnixTimestamp::now() {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(stored.clone())
    }

    async fn put(&self, key: IdempotencyKey, receipt: StoredReceipt, ttl: Duration) {
        let expires_at = UnixTimestamp::now() + ttl.as_secs();
        self.entries.insert(key, (receipt, expires_at));
    }
}

/// The resource-server side of the idempotency extension.
///
/// Validates the key grammar; requiredness and receipt caching are the
/// paygate's business, driven by the route configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdempotencyExtension;

#[async_trait::async_trait]
impl Extension for IdempotencyExtension {
    fn key(&self) -> &str {
        IDEMPOTENCY_KEY
    }

    fn declaration(&self) -> ExtensionDecl {
        ExtensionDecl {
            info: serde_json::json!({
                "description": "client-chosen duplicate-suppression identifier",
            }),
            schema: Some(serde_json::json!({
                "type": "string",
                "pattern": "^[A-Za-z0-9_-]{16,128}$",
            })),
        }
    }

    async fn validate_payload(
        &self,
        value: Option<&serde_json::Value>,
    ) -> Result<(), ExtensionError> {
        match value {
            None => Ok(()),
            Some(serde_json::Value::String(s)) => s
                .parse::<IdempotencyKey>()
                .map(|_| ())
                .map_err(|e| ExtensionError::new(IDEMPOTENCY_KEY, e.to_string())),
            Some(_) => Err(ExtensionError::new(
                IDEMPOTENCY_KEY,
                "value must be a string",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainId;

    #[test]
    fn key_grammar() {
        assert!("a".repeat(16).parse::<IdempotencyKey>().is_ok());
        assert!("a".repeat(128).parse::<IdempotencyKey>().is_ok());
        assert!("Ab0_-Ab0_-Ab0_-Z".parse::<IdempotencyKey>().is_ok());

        assert!("short".parse::<IdempotencyKey>().is_err());
        assert!("a".repeat(129).parse::<IdempotencyKey>().is_err());
        assert!("has spaces spaces".parse::<IdempotencyKey>().is_err());
        assert!("unicode-ключ-16chars".parse::<IdempotencyKey>().is_err());
    }

    fn receipt() -> StoredReceipt {
        StoredReceipt {
            fingerprint: 42,
            receipt: v2::SettleResponse::Success {
                payer: None,
                transaction: "0xtx".into(),
                network: ChainId::new("eip155", "84532"),
            },
        }
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryIdempotencyStore::new();
        let key: IdempotencyKey = "request-0000000001".parse().unwrap();

        assert!(store.get(&key).await.is_none());
        store
            .put(key.clone(), receipt(), Duration::from_secs(300))
            .await;
        let found = store.get(&key).await.unwrap();
        assert_eq!(found.fingerprint, 42);
    }

    #[tokio::test]
    async fn memory_store_expires() {
        let store = MemoryIdempotencyStore::new();
        let key: IdempotencyKey = "request-0000000002".parse().unwrap();
        store.put(key.clone(), receipt(), Duration::ZERO).await;
        // TTL of zero expires immediately relative to second granularity once
        // the clock ticks; force the comparison by waiting out the boundary.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(store.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn extension_validates_grammar_only() {
        let extension = IdempotencyExtension;
        assert!(extension.validate_payload(None).await.is_ok());
        assert!(
            extension
                .validate_payload(Some(&serde_json::json!("request-0000000003")))
                .await
                .is_ok()
        );
        assert!(
            extension
                .validate_payload(Some(&serde_json::json!("short")))
                .await
                .is_err()
        );
        assert!(
            extension
                .validate_payload(Some(&serde_json::json!(12)))
                .await
                .is_err()
        );
    }
}
