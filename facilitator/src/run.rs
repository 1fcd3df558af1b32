//! Facilitator server startup.
//!
//! Loads `.env` and the JSON config, connects chain providers, builds the
//! scheme registry, and serves the HTTP endpoints with CORS and graceful
//! shutdown.

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;
use tracing_subscriber::EnvFilter;

use pay402::chain::{ChainRegistry, FromConfig};
use pay402::facilitator_local::FacilitatorLocal;
use pay402::scheme::{SchemeBlueprints, SchemeRegistry};
use pay402_eip155::Eip155Exact;

use crate::chain::ChainProvider;
use crate::config::Config;
use crate::handlers;
use crate::sig_down::SigDown;

/// Initializes and runs the facilitator until a shutdown signal.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .expect("failed to initialize rustls crypto provider");

    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::load()?;

    let chain_registry: ChainRegistry<ChainProvider> =
        ChainRegistry::from_config(config.chains()).await?;
    let blueprints = SchemeBlueprints::<ChainProvider>::new().and_register(Eip155Exact);

    let mut scheme_registry = SchemeRegistry::new();
    for scheme in config.schemes() {
        if !scheme.enabled {
            tracing::info!(id = %scheme.id, chains = %scheme.chains, "skipping disabled scheme");
            continue;
        }
        let Some(blueprint) = blueprints.get(&scheme.id) else {
            tracing::warn!(id = %scheme.id, "no scheme blueprint registered");
            continue;
        };
        let providers = chain_registry.by_pattern(&scheme.chains);
        if providers.is_empty() {
            tracing::warn!(chains = %scheme.chains, "no chain provider matches scheme config");
            continue;
        }
        for provider in providers {
            if let Err(error) = scheme_registry.register(blueprint, provider, scheme.config.clone())
            {
                tracing::error!(id = %scheme.id, %error, "failed to build scheme handler");
            }
        }
    }

    let facilitator = FacilitatorLocal::new(scheme_registry);
    let state = Arc::new(facilitator);

    let app = Router::new()
        .merge(handlers::routes().with_state(state))
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!(%addr, "starting facilitator");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|error| tracing::error!(%addr, %error, "failed to bind"))?;

    let sig_down = SigDown::try_new()?;
    let cancellation_token = sig_down.cancellation_token();
    let graceful_shutdown = async move { cancellation_token.cancelled().await };
    axum::serve(listener, app)
        .with_graceful_shutdown(graceful_shutdown)
        .await?;

    Ok(())
}
