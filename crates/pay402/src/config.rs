//! Configuration types shared by facilitator deployments.
//!
//! Values that are secrets (signer keys, authenticated RPC URLs) can be
//! written as `$VAR` or `${VAR}` in configuration files and resolved from
//! the environment at load time via [`LiteralOrEnv`].

use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use url::Url;

use crate::chain::ChainIdPattern;

/// RPC provider configuration for a single endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcConfig {
    /// HTTP URL for the RPC endpoint.
    pub http: Url,
    /// Rate limit in requests per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
}

/// Enables one scheme over a set of chains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemeConfig {
    /// Blueprint id, e.g. `"eip155-exact"`.
    pub id: String,
    /// Chains the scheme is enabled for, e.g. `"eip155:{8453,84532}"`.
    pub chains: ChainIdPattern,
    /// Whether the scheme is active.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Scheme-specific configuration passed to the blueprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

/// A transparent wrapper that resolves environment variables during
/// deserialization.
///
/// Accepts a literal value, `$VAR`, or `${VAR}`. Dereferences to the inner
/// type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    /// Wraps an already-resolved value.
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    /// A reference to the inner value.
    pub fn inner(&self) -> &T {
        &self.0
    }

    /// Consumes the wrapper and returns the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }

    fn parse_env_var_syntax(s: &str) -> Option<String> {
        if let Some(braced) = s.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
            Some(braced.to_string())
        } else if let Some(bare) = s.strip_prefix('$') {
            if !bare.is_empty() && bare.chars().all(|c| c.is_alphanumeric() || c == '_') {
                Some(bare.to_string())
            } else {
                None
            }
        } else {
            None
        }
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for LiteralOrEnv<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        let value = if let Some(var_name) = Self::parse_env_var_syntax(&s) {
            std::env::var(&var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "environment variable '{var_name}' not found (referenced as '{s}')"
                ))
            })?
        } else {
            s
        };

        let parsed = value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("failed to parse value: {e}")))?;

        Ok(LiteralOrEnv(parsed))
    }
}

impl<T: Serialize> Serialize for LiteralOrEnv<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}
