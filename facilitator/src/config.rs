//! Configuration for the facilitator server.
//!
//! Loaded from a JSON file pointed at by `--config` (or the `CONFIG`
//! environment variable). Chains are keyed by CAIP-2 id; signer keys inside
//! chain configs resolve `$VAR` references from the environment.

use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use pay402::chain::ChainId;
use pay402::config::SchemeConfig;
use pay402_eip155::chain::{Eip155ChainConfig, Eip155ChainConfigInner, Eip155ChainReference};

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "pay402-facilitator")]
#[command(about = "x402 facilitator HTTP server")]
struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::port")]
    port: u16,
    #[serde(default = "config_defaults::host")]
    host: IpAddr,
    #[serde(default)]
    chains: ChainsConfig,
    #[serde(default)]
    schemes: Vec<SchemeConfig>,
}

mod config_defaults {
    use super::*;

    pub fn port() -> u16 {
        8080
    }

    pub fn host() -> IpAddr {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    }
}

impl Config {
    /// Loads the configuration named by the CLI arguments.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let args = CliArgs::parse();
        let contents = fs::read_to_string(&args.config)
            .map_err(|e| format!("cannot read {}: {e}", args.config.display()))?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Parses configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The port to bind.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The host address to bind.
    pub fn host(&self) -> IpAddr {
        self.host
    }

    /// The configured chains.
    pub fn chains(&self) -> &Vec<ChainConfig> {
        &self.chains.0
    }

    /// The configured schemes.
    pub fn schemes(&self) -> &Vec<SchemeConfig> {
        &self.schemes
    }
}

/// Configuration for one chain, dispatched by CAIP-2 namespace.
#[derive(Debug, Clone)]
pub enum ChainConfig {
    /// An EVM chain (`eip155:` prefix).
    Eip155(Box<Eip155ChainConfig>),
}

/// The `chains` config section: a map from CAIP-2 id to chain settings.
#[derive(Debug, Clone, Default)]
pub struct ChainsConfig(pub Vec<ChainConfig>);

impl<'de> Deserialize<'de> for ChainsConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{Error as DeError, MapAccess, Visitor};
        use std::fmt;

        struct ChainsVisitor;

        impl<'de> Visitor<'de> for ChainsVisitor {
            type Value = ChainsConfig;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of CAIP-2 chain ids to chain configurations")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<Self::Value, M::Error> {
                let mut chains = Vec::new();
                while let Some(key) = map.next_key::<String>()? {
                    let chain_id: ChainId = key
                        .parse()
                        .map_err(|e| M::Error::custom(format!("chain key {key:?}: {e}")))?;
                    match chain_id.namespace() {
                        "eip155" => {
                            let inner: Eip155ChainConfigInner = map.next_value()?;
                            let reference =
                                Eip155ChainReference::try_from(&chain_id).map_err(|e| {
                                    M::Error::custom(format!("chain key {key:?}: {e}"))
                                })?;
                            chains.push(ChainConfig::Eip155(Box::new(Eip155ChainConfig::new(
                                reference, inner,
                            ))));
                        }
                        other => {
                            return Err(M::Error::custom(format!(
                                "unsupported chain namespace {other:?} in key {key:?}"
                            )));
                        }
                    }
                }
                Ok(ChainsConfig(chains))
            }
        }

        deserializer.deserialize_map(ChainsVisitor)
    }
}
