//! The middleware layer: configuration, initialization, and the tower
//! service that wraps protected routers.
//!
//! [`X402Middleware`] is the builder. [`X402Middleware::initialize`]
//! resolves every configured `(scheme, network)` against the server-side
//! registry — a miss is a configuration error, not a runtime surprise —
//! fetches the facilitator's supported kinds once, caches them, and
//! pre-computes the concrete payment requirements per route. The resulting
//! [`X402Layer`] is cheap to clone onto a router.

use axum_core::extract::Request;
use axum_core::response::Response;
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use url::Url;

use pay402::extensions::ExtensionRegistry;
use pay402::extensions::idempotency::IdempotencyStore;
use pay402::facilitator::Facilitator;
use pay402::proto::{SupportedResponse, v2};
use pay402::scheme::{SchemeKey, ServerSchemes};

use crate::hooks::{NoopHooks, PaygateHooks};
use crate::paygate::{InfraFailure, Paygate, RoutePlan};
use crate::routes::{Price, RouteKey, RouteTable, normalize_path};

/// Builder for the payment middleware.
pub struct X402Middleware<F> {
    routes: RouteTable,
    schemes: ServerSchemes,
    facilitator: Arc<F>,
    extensions: ExtensionRegistry,
    hooks: Arc<dyn PaygateHooks>,
    idempotency: Option<Arc<dyn IdempotencyStore>>,
    base_url: Option<Url>,
}

impl<F> X402Middleware<F>
where
    F: Facilitator,
{
    /// Creates a builder over a route table, a server-side scheme registry,
    /// and a facilitator (in-process or remote).
    pub fn new(routes: RouteTable, schemes: ServerSchemes, facilitator: F) -> Self {
        Self {
            routes,
            schemes,
            facilitator: Arc::new(facilitator),
            extensions: ExtensionRegistry::new(),
            hooks: Arc::new(NoopHooks),
            idempotency: None,
            base_url: None,
        }
    }

    /// Registers protocol extensions.
    pub fn with_extensions(mut self, extensions: ExtensionRegistry) -> Self {
        self.extensions = extensions;
        self
    }

    /// Installs lifecycle hooks.
    pub fn with_hooks<H: PaygateHooks + 'static>(mut self, hooks: H) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Installs the idempotency receipt store.
    pub fn with_idempotency_store<S: IdempotencyStore + 'static>(mut self, store: S) -> Self {
        self.idempotency = Some(Arc::new(store));
        self
    }

    /// Sets the base URL used to derive canonical resource URLs.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Resolves the configuration and freezes the middleware.
    ///
    /// Fetches the facilitator's supported kinds once and caches them; warns
    /// about configured kinds the facilitator does not advertise; errors on
    /// any `(scheme, network)` missing from the registry or any price that
    /// does not convert.
    pub async fn initialize(self) -> Result<X402Layer<F>, InitError> {
        let supported = match self.facilitator.supported().await {
            Ok(supported) => supported,
            Err(error) => {
                tracing::warn!(%error, "could not fetch facilitator supported kinds; proceeding without enrichment");
                SupportedResponse::default()
            }
        };

        let mut plans = HashMap::new();
        for (key, config) in self.routes.into_routes() {
            let route_label = format!("{} {}", key.method, key.path);
            if !self.extensions.knows_all(&config.extensions) {
                tracing::warn!(route = %route_label, "route declares extensions that are not registered");
            }
            let mut requirements = Vec::with_capacity(config.acceptors.len());
            let mut servers = Vec::with_capacity(config.acceptors.len());
            for acceptor in &config.acceptors {
                let scheme_key = SchemeKey::new(acceptor.scheme.clone(), acceptor.network.clone());
                let server = self.schemes.by_key(&scheme_key).ok_or_else(|| {
                    InitError::UnknownScheme {
                        route: route_label.clone(),
                        key: scheme_key.to_string(),
                    }
                })?;
                let kind = supported.kind_for(&acceptor.scheme, &acceptor.network);
                if kind.is_none() {
                    tracing::warn!(
                        route = %route_label,
                        key = %scheme_key,
                        "facilitator does not advertise this payment kind"
                    );
                }

                let (amount, asset, quote_extra) = match &acceptor.price {
                    Price::Money(price) => {
                        let quote = server
                            .parse_price(price, &acceptor.network)
                            .ok_or_else(|| InitError::UnparsablePrice {
                                route: route_label.clone(),
                                price: price.clone(),
                                network: acceptor.network.to_string(),
                            })?;
                        (quote.amount, quote.asset, quote.extra)
                    }
                    Price::Atomic { amount, asset } => (amount.clone(), asset.clone(), None),
                };

                let extra = merge_extra(quote_extra, acceptor.extra.clone());
                let built = v2::PaymentRequirements {
                    scheme: acceptor.scheme.clone(),
                    network: acceptor.network.clone(),
                    amount,
                    pay_to: acceptor.pay_to.clone(),
                    max_timeout_seconds: acceptor.max_timeout_seconds,
                    asset,
                    extra,
                };
                let built = server.enhance_requirements(built, kind);
                built
                    .validate()
                    .map_err(|error| InitError::InvalidRequirements {
                        route: route_label.clone(),
                        error: error.to_string(),
                    })?;
                requirements.push(built);
                servers.push(server);
            }
            plans.insert(
                key,
                Arc::new(RoutePlan {
                    config,
                    requirements,
                    servers,
                }),
            );
        }

        if self.base_url.is_none() {
            tracing::warn!(
                "no base_url configured; resource URLs fall back to the request host header"
            );
        }

        Ok(X402Layer {
            state: Arc::new(MiddlewareState {
                plans,
                facilitator: self.facilitator,
                extensions: self.extensions,
                hooks: self.hooks,
                idempotency: self.idempotency,
                base_url: self.base_url,
            }),
        })
    }
}

/// Merges a mechanism price quote's extra with the route's own extra; the
/// route wins on key conflicts.
fn merge_extra(
    quote: Option<serde_json::Value>,
    route: Option<serde_json::Value>,
) -> Option<serde_json::Value> {
    match (quote, route) {
        (None, route) => route,
        (quote, None) => quote,
        (Some(serde_json::Value::Object(mut base)), Some(serde_json::Value::Object(overlay))) => {
            for (key, value) in overlay {
                base.insert(key, value);
            }
            Some(serde_json::Value::Object(base))
        }
        (_, Some(route)) => Some(route),
    }
}

/// Initialization failures: configuration errors surfaced at startup.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// A route references a `(scheme, network)` with no registered
    /// server-side mechanism.
    #[error("route {route}: no mechanism registered for {key}")]
    UnknownScheme { route: String, key: String },
    /// A money price cannot be converted on the configured network.
    #[error("route {route}: cannot convert price {price:?} on {network}")]
    UnparsablePrice {
        route: String,
        price: String,
        network: String,
    },
    /// A built requirement violates the wire invariants.
    #[error("route {route}: invalid requirements: {error}")]
    InvalidRequirements { route: String, error: String },
}

struct MiddlewareState<F> {
    plans: HashMap<RouteKey, Arc<RoutePlan>>,
    facilitator: Arc<F>,
    extensions: ExtensionRegistry,
    hooks: Arc<dyn PaygateHooks>,
    idempotency: Option<Arc<dyn IdempotencyStore>>,
    base_url: Option<Url>,
}

/// The initialized, cloneable middleware layer.
pub struct X402Layer<F> {
    state: Arc<MiddlewareState<F>>,
}

impl<F> Clone for X402Layer<F> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<S, F> Layer<S> for X402Layer<F>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    F: Facilitator + Send + Sync + 'static,
    F::Error: Send + 'static,
    InfraFailure: From<F::Error>,
{
    type Service = X402MiddlewareService<F>;

    fn layer(&self, inner: S) -> Self::Service {
        X402MiddlewareService {
            state: Arc::clone(&self.state),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// The service that fronts protected routes.
pub struct X402MiddlewareService<F> {
    state: Arc<MiddlewareState<F>>,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<F> Clone for X402MiddlewareService<F> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            inner: self.inner.clone(),
        }
    }
}

impl<F> Service<Request> for X402MiddlewareService<F>
where
    F: Facilitator + Send + Sync + 'static,
    F::Error: Send + 'static,
    InfraFailure: From<F::Error>,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let state = Arc::clone(&self.state);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            // Match: unmatched routes pass straight through.
            let key = RouteKey {
                method: req.method().clone(),
                path: normalize_path(req.uri().path()),
            };
            let Some(plan) = state.plans.get(&key) else {
                return inner.call(req).await;
            };

            let resource = resource_info(plan, state.base_url.as_ref(), &req);
            let gate = Paygate {
                facilitator: Arc::clone(&state.facilitator),
                plan: Arc::clone(plan),
                extensions: state.extensions.clone(),
                hooks: Arc::clone(&state.hooks),
                idempotency: state.idempotency.clone(),
                resource,
            };
            Ok(gate.handle_request(inner, req).await)
        })
    }
}

/// Determines the canonical resource info for a request.
///
/// A route-level `resource` URL wins; otherwise the URL is the configured
/// base (or the request's `Host` header as a last resort) joined with the
/// request path and query.
fn resource_info(plan: &RoutePlan, base_url: Option<&Url>, req: &Request) -> v2::ResourceInfo {
    let url = match &plan.config.resource {
        Some(resource) => resource.to_string(),
        None => {
            let mut url = base_url.cloned().unwrap_or_else(|| {
                let host = req
                    .headers()
                    .get(http::header::HOST)
                    .and_then(|h| h.to_str().ok())
                    .unwrap_or("localhost");
                let origin = format!("http://{host}");
                Url::parse(&origin)
                    .unwrap_or_else(|_| Url::parse("http://localhost").expect("static url parses"))
            });
            url.set_path(req.uri().path());
            url.set_query(req.uri().query());
            url.to_string()
        }
    };
    v2::ResourceInfo {
        url,
        description: plan.config.description.clone(),
        mime_type: plan.config.mime_type.clone(),
    }
}
