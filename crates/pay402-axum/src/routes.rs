//! The protected-route table.
//!
//! Routes are keyed by `"METHOD PATH"`. Each route carries one or more
//! acceptor configurations — the disjunction offered to the client — plus
//! resource metadata, declared extensions, and the idempotency flag.
//! Network strings are normalized (CAIP-2 or legacy v1 name) when the table
//! is built, so configuration mistakes surface before the server starts.

use http::Method;
use std::collections::HashMap;
use url::Url;

use pay402::chain::{ChainId, ChainIdFormatError};

/// How a route is priced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Price {
    /// An abstract money amount (`"$0.001"`) converted per-network by the
    /// mechanism's price parser.
    Money(String),
    /// An explicit atomic amount of a specific asset.
    Atomic {
        /// Atomic-unit amount as a decimal string.
        amount: String,
        /// Network-scoped asset identifier.
        asset: String,
    },
}

impl Price {
    /// An abstract money price.
    pub fn money<S: Into<String>>(price: S) -> Self {
        Price::Money(price.into())
    }

    /// An explicit atomic amount of a specific asset.
    pub fn atomic<A: Into<String>, T: Into<String>>(amount: A, asset: T) -> Self {
        Price::Atomic {
            amount: amount.into(),
            asset: asset.into(),
        }
    }
}

/// One acceptable way to pay for a route.
#[derive(Debug, Clone)]
pub struct AcceptorConfig {
    /// The payment scheme (e.g., "exact").
    pub scheme: String,
    /// The network, normalized to CAIP-2.
    pub network: ChainId,
    /// Recipient identifier on that network.
    pub pay_to: String,
    /// The price of the resource.
    pub price: Price,
    /// Offer validity bound handed to the facilitator.
    pub max_timeout_seconds: u64,
    /// Scheme-specific extra data merged into the requirements.
    pub extra: Option<serde_json::Value>,
}

impl AcceptorConfig {
    /// Default offer validity bound, in seconds.
    pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 300;

    /// Creates an acceptor, normalizing `network` from CAIP-2 or a legacy
    /// network name.
    pub fn new<S, P>(
        scheme: S,
        network: &str,
        pay_to: P,
        price: Price,
    ) -> Result<Self, ChainIdFormatError>
    where
        S: Into<String>,
        P: Into<String>,
    {
        Ok(Self {
            scheme: scheme.into(),
            network: ChainId::normalize(network)?,
            pay_to: pay_to.into(),
            price,
            max_timeout_seconds: Self::DEFAULT_MAX_TIMEOUT_SECONDS,
            extra: None,
        })
    }

    /// Overrides the offer validity bound.
    pub fn with_max_timeout_seconds(mut self, seconds: u64) -> Self {
        self.max_timeout_seconds = seconds;
        self
    }

    /// Attaches scheme-specific extra data.
    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// Everything configured for one protected route.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    /// The disjunction of acceptable payments.
    pub acceptors: Vec<AcceptorConfig>,
    /// Human-readable description of the resource.
    pub description: String,
    /// MIME type of the resource content.
    pub mime_type: String,
    /// Canonical resource URL; derived from the request when absent.
    pub resource: Option<Url>,
    /// Keys of extensions declared on this route.
    pub extensions: Vec<String>,
    /// Whether clients must supply an idempotency id.
    pub idempotency_required: bool,
}

impl RouteConfig {
    fn from_acceptors(acceptors: Vec<AcceptorConfig>) -> Self {
        Self {
            acceptors,
            description: String::new(),
            mime_type: "application/json".to_string(),
            resource: None,
            extensions: Vec::new(),
            idempotency_required: false,
        }
    }

    /// Sets the resource description.
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the resource MIME type.
    pub fn with_mime_type<S: Into<String>>(mut self, mime: S) -> Self {
        self.mime_type = mime.into();
        self
    }

    /// Sets the canonical resource URL.
    pub fn with_resource(mut self, resource: Url) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Declares an extension on this route.
    pub fn with_extension<S: Into<String>>(mut self, key: S) -> Self {
        self.extensions.push(key.into());
        self
    }

    /// Requires an idempotency id on this route.
    pub fn require_idempotency(mut self) -> Self {
        self.idempotency_required = true;
        self
    }
}

/// Route lookup key: method plus normalized path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    /// The HTTP method.
    pub method: Method,
    /// The normalized request path.
    pub path: String,
}

impl RouteKey {
    /// Parses a `"METHOD PATH"` route string.
    pub fn parse(route: &str) -> Result<Self, RouteTableError> {
        let (method, path) = route
            .split_once(' ')
            .ok_or_else(|| RouteTableError::InvalidRoute(route.to_string()))?;
        let method: Method = method
            .parse()
            .map_err(|_| RouteTableError::InvalidRoute(route.to_string()))?;
        if !path.starts_with('/') {
            return Err(RouteTableError::InvalidRoute(route.to_string()));
        }
        Ok(Self {
            method,
            path: normalize_path(path),
        })
    }
}

/// Trims the trailing slash, keeping `/` itself intact.
pub(crate) fn normalize_path(path: &str) -> String {
    if path.len() > 1 {
        path.trim_end_matches('/').to_string()
    } else {
        path.to_string()
    }
}

/// The table of protected routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<RouteKey, RouteConfig>,
}

impl RouteTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds acceptors for a `"METHOD PATH"` route.
    ///
    /// Adding to an existing route extends its disjunction; route-level
    /// settings of the first registration win.
    pub fn route(
        mut self,
        route: &str,
        acceptors: Vec<AcceptorConfig>,
    ) -> Result<Self, RouteTableError> {
        let key = RouteKey::parse(route)?;
        if acceptors.is_empty() {
            return Err(RouteTableError::EmptyRoute(route.to_string()));
        }
        self.routes
            .entry(key)
            .and_modify(|existing| existing.acceptors.extend(acceptors.clone()))
            .or_insert_with(|| RouteConfig::from_acceptors(acceptors));
        Ok(self)
    }

    /// Adds a fully configured route.
    pub fn route_config(
        mut self,
        route: &str,
        config: RouteConfig,
    ) -> Result<Self, RouteTableError> {
        let key = RouteKey::parse(route)?;
        if config.acceptors.is_empty() {
            return Err(RouteTableError::EmptyRoute(route.to_string()));
        }
        self.routes.insert(key, config);
        Ok(self)
    }

    /// Looks up the route for a request.
    pub fn lookup(&self, method: &Method, path: &str) -> Option<&RouteConfig> {
        let key = RouteKey {
            method: method.clone(),
            path: normalize_path(path),
        };
        self.routes.get(&key)
    }

    /// Iterates over all configured routes.
    pub fn iter(&self) -> impl Iterator<Item = (&RouteKey, &RouteConfig)> {
        self.routes.iter()
    }

    /// Consumes the table into its route map.
    pub(crate) fn into_routes(self) -> HashMap<RouteKey, RouteConfig> {
        self.routes
    }
}

/// Errors from building a route table.
#[derive(Debug, thiserror::Error)]
pub enum RouteTableError {
    /// The route string is not `"METHOD /path"`.
    #[error("invalid route {0:?}, expected \"METHOD /path\"")]
    InvalidRoute(String),
    /// A route was configured without acceptors.
    #[error("route {0:?} has no acceptors")]
    EmptyRoute(String),
}
