//! CAIP-2 chain identifier types.
//!
//! A CAIP-2 chain id is `namespace:reference`, e.g. `eip155:8453` for Base or
//! `solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp` for Solana mainnet. The
//! namespace names the blockchain family, the reference the concrete chain
//! within it.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::networks;

/// `namespace:reference` grammar from the protocol: lowercase alphanumeric
/// namespace, mixed-case alphanumeric reference, dashes allowed in both.
static CHAIN_ID_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[a-z0-9-]+:[a-zA-Z0-9-]+$").expect("valid chain id regex")
});

/// A CAIP-2 compliant blockchain identifier.
///
/// # Serialization
///
/// Serializes to/from a colon-separated string: `"eip155:8453"`.
///
/// # Example
///
/// ```
/// use pay402::chain::ChainId;
///
/// let base: ChainId = "eip155:8453".parse().unwrap();
/// assert_eq!(base.namespace(), "eip155");
/// assert_eq!(base.reference(), "8453");
/// assert_eq!(base.to_string(), "eip155:8453");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainId {
    namespace: String,
    reference: String,
}

impl ChainId {
    /// Creates a chain id from namespace and reference components.
    ///
    /// The components are not re-validated; use [`FromStr`] for untrusted
    /// input.
    pub fn new<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    /// The blockchain family, e.g. `eip155`.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The chain within the family, e.g. `8453`.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Resolves a wire value into a canonical chain id.
    ///
    /// Accepts either a CAIP-2 string or a legacy v1 network name
    /// (`"base-sepolia"` → `eip155:84532`). This is the ingress
    /// normalization point; outgoing wire values are always CAIP-2.
    pub fn normalize(value: &str) -> Result<Self, ChainIdFormatError> {
        if let Some(chain_id) = networks::chain_id_by_network_name(value) {
            return Ok(chain_id.clone());
        }
        value.parse()
    }

    /// Looks up a chain id by its well-known v1 network name.
    pub fn from_network_name(network_name: &str) -> Option<Self> {
        networks::chain_id_by_network_name(network_name).cloned()
    }

    /// The well-known v1 network name for this chain id, if any.
    pub fn as_network_name(&self) -> Option<&'static str> {
        networks::network_name_by_chain_id(self)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl From<ChainId> for String {
    fn from(value: ChainId) -> Self {
        value.to_string()
    }
}

/// Error returned when parsing an invalid chain id string.
#[derive(Debug, thiserror::Error)]
#[error("invalid chain id format: {0}")]
pub struct ChainIdFormatError(String);

impl FromStr for ChainId {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !CHAIN_ID_RE.is_match(s) {
            return Err(ChainIdFormatError(s.into()));
        }
        let (namespace, reference) = s.split_once(':').ok_or_else(|| ChainIdFormatError(s.into()))?;
        Ok(ChainId {
            namespace: namespace.into(),
            reference: reference.into(),
        })
    }
}

impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ChainId::from_str(&s).map_err(de::Error::custom)
    }
}

/// A pattern for matching chain ids.
///
/// - **Wildcard** matches any chain within a namespace (`eip155:*`)
/// - **Exact** matches one chain (`eip155:8453`)
/// - **Set** matches any chain from a reference set (`eip155:{1,8453,137}`)
#[derive(Debug, Clone)]
pub enum ChainIdPattern {
    /// Matches any chain within the namespace.
    Wildcard {
        /// The namespace to match.
        namespace: String,
    },
    /// Matches exactly one chain.
    Exact {
        /// The namespace of the chain.
        namespace: String,
        /// The reference of the chain.
        reference: String,
    },
    /// Matches any chain whose reference is in the set.
    Set {
        /// The namespace of the chains.
        namespace: String,
        /// The set of references to match.
        references: HashSet<String>,
    },
}

impl ChainIdPattern {
    /// Wildcard pattern over a namespace.
    pub fn wildcard<S: Into<String>>(namespace: S) -> Self {
        Self::Wildcard {
            namespace: namespace.into(),
        }
    }

    /// Exact pattern for one chain.
    pub fn exact<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self::Exact {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    /// Set pattern over references within a namespace.
    pub fn set<N: Into<String>>(namespace: N, references: HashSet<String>) -> Self {
        Self::Set {
            namespace: namespace.into(),
            references,
        }
    }

    /// Checks whether a chain id matches this pattern.
    pub fn matches(&self, chain_id: &ChainId) -> bool {
        match self {
            ChainIdPattern::Wildcard { namespace } => chain_id.namespace == *namespace,
            ChainIdPattern::Exact {
                namespace,
                reference,
            } => chain_id.namespace == *namespace && chain_id.reference == *reference,
            ChainIdPattern::Set {
                namespace,
                references,
            } => chain_id.namespace == *namespace && references.contains(&chain_id.reference),
        }
    }

    /// The namespace of this pattern.
    pub fn namespace(&self) -> &str {
        match self {
            ChainIdPattern::Wildcard { namespace } => namespace,
            ChainIdPattern::Exact { namespace, .. } => namespace,
            ChainIdPattern::Set { namespace, .. } => namespace,
        }
    }
}

impl fmt::Display for ChainIdPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainIdPattern::Wildcard { namespace } => write!(f, "{namespace}:*"),
            ChainIdPattern::Exact {
                namespace,
                reference,
            } => write!(f, "{namespace}:{reference}"),
            ChainIdPattern::Set {
                namespace,
                references,
            } => {
                let refs: Vec<&str> = references.iter().map(|s| s.as_ref()).collect();
                write!(f, "{}:{{{}}}", namespace, refs.join(","))
            }
        }
    }
}

impl FromStr for ChainIdPattern {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, rest) = s.split_once(':').ok_or_else(|| ChainIdFormatError(s.into()))?;
        if namespace.is_empty() {
            return Err(ChainIdFormatError(s.into()));
        }
        if rest == "*" {
            return Ok(ChainIdPattern::wildcard(namespace));
        }
        if let Some(inner) = rest.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
            let mut references = HashSet::new();
            for item in inner.split(',') {
                let item = item.trim();
                if item.is_empty() {
                    return Err(ChainIdFormatError(s.into()));
                }
                references.insert(item.into());
            }
            if references.is_empty() {
                return Err(ChainIdFormatError(s.into()));
            }
            return Ok(ChainIdPattern::set(namespace, references));
        }
        if rest.is_empty() {
            return Err(ChainIdFormatError(s.into()));
        }
        Ok(ChainIdPattern::exact(namespace, rest))
    }
}

impl Serialize for ChainIdPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainIdPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ChainIdPattern::from_str(&s).map_err(de::Error::custom)
    }
}

impl From<ChainId> for ChainIdPattern {
    fn from(chain_id: ChainId) -> Self {
        ChainIdPattern::exact(chain_id.namespace, chain_id.reference)
    }
}
