//! The per-request payment state machine.
//!
//! For a matched route the flow is: build requirements → challenge (no
//! header) | decode & select → verify → extension validation → hooks →
//! dispatch → settle → respond. Protocol invariants enforced here:
//!
//! - settlement is attempted at most once per request, and never without a
//!   prior successful verify (or a cached idempotent receipt);
//! - the handler runs at most once per request;
//! - `PAYMENT-RESPONSE` is attached iff settlement and the handler both
//!   succeeded;
//! - an inbound disconnect does not cancel an in-flight settle: the settle
//!   future runs detached on the runtime and logs its receipt even if
//!   nobody is left to read it.

use axum_core::body::Body;
use axum_core::extract::Request;
use axum_core::response::Response;
use http::{HeaderValue, StatusCode, header};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower::Service;

use pay402::extensions::ExtensionRegistry;
use pay402::extensions::idempotency::{
    IDEMPOTENCY_KEY, IdempotencyKey, IdempotencyStore, StoredReceipt, payload_fingerprint,
};
use pay402::facilitator::Facilitator;
use pay402::proto;
use pay402::proto::v2;
use pay402::proto::{ErrorReason, codec};
use pay402::scheme::SchemeServer;

use crate::hooks::{PaygateHooks, PaymentContext};
use crate::routes::RouteConfig;
use crate::{PAYMENT_REQUIRED_HEADER, PAYMENT_RESPONSE_HEADER, PAYMENT_SIGNATURE_HEADER};

/// A route resolved against the scheme registry at initialization time.
pub struct RoutePlan {
    /// The route's configuration.
    pub config: RouteConfig,
    /// Concrete requirements, one per acceptor, facilitator-enhanced.
    pub requirements: Vec<v2::PaymentRequirements>,
    /// The server-side mechanism for each requirement, index-parallel.
    pub servers: Vec<Arc<dyn SchemeServer>>,
}

/// Infrastructure failures surfaced as 5xx instead of a 402 challenge.
#[derive(Debug, thiserror::Error)]
pub enum InfraFailure {
    /// The facilitator could not be reached; maps to 502.
    #[error("facilitator unreachable: {0}")]
    Unreachable(String),
    /// Anything else unexpected; maps to 500.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<crate::facilitator_client::FacilitatorClientError> for InfraFailure {
    fn from(error: crate::facilitator_client::FacilitatorClientError) -> Self {
        if error.is_unreachable() {
            InfraFailure::Unreachable(error.to_string())
        } else {
            InfraFailure::Internal(error.to_string())
        }
    }
}

impl From<pay402::facilitator_local::FacilitatorLocalError> for InfraFailure {
    fn from(error: pay402::facilitator_local::FacilitatorLocalError) -> Self {
        InfraFailure::Internal(error.to_string())
    }
}

/// The paygate for one request on one protected route.
pub struct Paygate<F> {
    /// The facilitator used to verify and settle payments.
    pub facilitator: Arc<F>,
    /// The resolved route.
    pub plan: Arc<RoutePlan>,
    /// Registered protocol extensions.
    pub extensions: ExtensionRegistry,
    /// Lifecycle hooks.
    pub hooks: Arc<dyn PaygateHooks>,
    /// Receipt cache for idempotent routes.
    pub idempotency: Option<Arc<dyn IdempotencyStore>>,
    /// The resource this request protects.
    pub resource: v2::ResourceInfo,
}

impl<F> Paygate<F>
where
    F: Facilitator + Send + Sync + 'static,
    F::Error: Send + 'static,
    InfraFailure: From<F::Error>,
{
    /// Runs the full state machine for one request.
    pub async fn handle_request<S>(self, mut inner: S, req: Request) -> Response
    where
        S: Service<Request, Response = Response, Error = Infallible> + Send,
        S::Future: Send,
    {
        // Challenge emission: no payment header, no side effects.
        let Some(header_value) = req.headers().get(PAYMENT_SIGNATURE_HEADER) else {
            return self.challenge("payment required");
        };

        // Decode.
        let payload = match codec::decode_payment_signature(header_value.as_bytes()) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::debug!(%error, "rejecting malformed payment header");
                return self.challenge(&error.reason().to_string());
            }
        };

        // Select the offered requirement the payload claims to satisfy.
        let Some(selected) = self
            .plan
            .requirements
            .iter()
            .zip(self.plan.servers.iter())
            .position(|(offered, server)| server.matches(offered, &payload.accepted))
        else {
            return self.challenge(&ErrorReason::NoMatchingRequirements.to_string());
        };
        let offered = &self.plan.requirements[selected];

        let mut ctx = PaymentContext {
            resource: self.resource.clone(),
            accepted: offered.clone(),
            payer: None,
            receipt: None,
        };

        // Idempotency: resolve the client-supplied key and a possibly cached
        // receipt before spending a verify on a duplicate.
        let idempotency_key = payload
            .extensions
            .as_ref()
            .and_then(|map| map.get(IDEMPOTENCY_KEY))
            .and_then(|value| value.as_str())
            .and_then(|s| s.parse::<IdempotencyKey>().ok());
        if self.plan.config.idempotency_required && idempotency_key.is_none() {
            return self.challenge(&ErrorReason::ExtensionValidationFailed.to_string());
        }
        let fingerprint = payload_fingerprint(&payload);
        let cached_receipt = match (&idempotency_key, &self.idempotency) {
            (Some(key), Some(store)) if self.plan.config.idempotency_required => {
                match store.get(key).await {
                    Some(stored) if stored.fingerprint != fingerprint => {
                        tracing::warn!(key = %key, "idempotency key reused with a different payload");
                        return self.challenge(&ErrorReason::Replay.to_string());
                    }
                    Some(stored) => Some(stored.receipt),
                    None => None,
                }
            }
            _ => None,
        };

        // Verify; a duplicate rides its cached receipt instead.
        if cached_receipt.is_none() {
            let verify_request = match proto::VerifyRequest::from_parts(&payload, offered) {
                Ok(request) => request,
                Err(error) => {
                    return infra_response(InfraFailure::Internal(error.to_string()));
                }
            };
            match self.facilitator.verify(&verify_request).await {
                Ok(v2::VerifyResponse::Valid { payer }) => {
                    ctx.payer = Some(payer);
                }
                Ok(v2::VerifyResponse::Invalid { reason, .. }) => {
                    tracing::debug!(%reason, "payment failed verification");
                    return self.challenge(&reason.to_string());
                }
                Err(error) => {
                    let failure = InfraFailure::from(error);
                    tracing::error!(%failure, "facilitator verify failed");
                    return infra_response(failure);
                }
            }
        }

        // Extension validation: treated exactly like a verification failure.
        if let Err(error) = self
            .extensions
            .validate(&self.plan.config.extensions, payload.extensions.as_ref())
            .await
        {
            tracing::debug!(%error, "extension rejected payload");
            return self.challenge(&ErrorReason::ExtensionValidationFailed.to_string());
        }

        // Hook: the one sanctioned way to abort after a valid payment.
        if !self.hooks.on_before_execution(&ctx).await {
            return self.challenge(&ErrorReason::ExecutionBlocked.to_string());
        }

        // Dispatch the handler, exactly once.
        let response = match inner.call(req).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        self.hooks.on_after_execution(&ctx).await;

        // A failed handler means no value delivered: pass the status through
        // untouched and never settle.
        if response.status().as_u16() >= 400 {
            return response;
        }

        // Settle, detached from the inbound connection: once the handler has
        // succeeded the payer is charged even if the client goes away.
        let receipt = match cached_receipt {
            Some(receipt) => receipt,
            None => {
                let settle_request = match proto::VerifyRequest::from_parts(&payload, offered) {
                    Ok(request) => request,
                    Err(error) => {
                        return infra_response(InfraFailure::Internal(error.to_string()));
                    }
                };
                let facilitator = Arc::clone(&self.facilitator);
                let settle_task = tokio::spawn(async move {
                    let result = facilitator.settle(&settle_request).await;
                    match &result {
                        Ok(receipt) => {
                            tracing::info!(success = receipt.is_success(), "settlement completed");
                        }
                        Err(error) => tracing::warn!(%error, "settlement errored"),
                    }
                    result
                });
                match settle_task.await {
                    Ok(Ok(receipt)) => receipt,
                    Ok(Err(error)) => {
                        // The transfer may or may not have left the building;
                        // do not serve the resource for free either way.
                        tracing::warn!(failure = %InfraFailure::from(error), "settle infrastructure failure");
                        ctx.receipt = Some(v2::SettleResponse::Error {
                            reason: ErrorReason::NetworkError,
                            network: Some(offered.network.clone()),
                        });
                        self.hooks.on_after_settlement(&ctx).await;
                        return self.challenge(&ErrorReason::NetworkError.to_string());
                    }
                    Err(join_error) => {
                        return infra_response(InfraFailure::Internal(join_error.to_string()));
                    }
                }
            }
        };

        if !receipt.is_success() {
            let reason = receipt.error_reason().unwrap_or(ErrorReason::InternalError);
            ctx.receipt = Some(receipt);
            self.hooks.on_after_settlement(&ctx).await;
            tracing::warn!(%reason, "settlement failed, discarding handler response");
            return self.challenge(&reason.to_string());
        }

        // Cache the receipt for idempotent replays.
        if let (Some(key), Some(store)) = (idempotency_key, &self.idempotency) {
            if self.plan.config.idempotency_required {
                let ttl = Duration::from_secs(offered.max_timeout_seconds);
                store
                    .put(
                        key,
                        StoredReceipt {
                            fingerprint,
                            receipt: receipt.clone(),
                        },
                        ttl,
                    )
                    .await;
            }
        }

        let mut response = response;
        match codec::encode(&receipt) {
            Ok(encoded) => match HeaderValue::from_str(&encoded) {
                Ok(value) => {
                    response.headers_mut().insert(PAYMENT_RESPONSE_HEADER, value);
                }
                Err(error) => {
                    tracing::error!(%error, "receipt not representable as a header");
                }
            },
            Err(error) => {
                tracing::error!(%error, "failed to encode settlement receipt");
            }
        }

        ctx.receipt = Some(receipt);
        self.hooks.on_after_settlement(&ctx).await;
        response
    }

    /// Builds the 402 challenge carried both as the JSON body and,
    /// base64url-encoded byte-for-byte, in the `PAYMENT-REQUIRED` header.
    fn challenge(&self, error: &str) -> Response {
        let payment_required = v2::PaymentRequired {
            x402_version: v2::X402Version2,
            error: Some(error.to_string()),
            resource: self.resource.clone(),
            accepts: self.plan.requirements.clone(),
            extensions: self
                .extensions
                .declarations(&self.plan.config.extensions, &self.plan.requirements),
        };
        let body = match serde_json::to_vec(&payment_required) {
            Ok(body) => body,
            Err(error) => {
                return infra_response(InfraFailure::Internal(error.to_string()));
            }
        };
        let encoded = codec::encode_bytes(&body);
        let mut builder = Response::builder()
            .status(StatusCode::PAYMENT_REQUIRED)
            .header(header::CONTENT_TYPE, "application/json");
        if let Ok(value) = HeaderValue::from_str(&encoded) {
            builder = builder.header(PAYMENT_REQUIRED_HEADER, value);
        }
        builder
            .body(Body::from(body))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response_plain())
    }
}

/// Maps an infrastructure failure to its status code with a minimal JSON
/// problem body.
pub(crate) fn infra_response(failure: InfraFailure) -> Response {
    let (status, reason) = match &failure {
        InfraFailure::Unreachable(_) => (
            StatusCode::BAD_GATEWAY,
            ErrorReason::FacilitatorUnreachable,
        ),
        InfraFailure::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorReason::InternalError),
    };
    let body = serde_json::json!({ "error": reason }).to_string();
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| status.into_response_plain())
}

/// Fallback response construction that cannot fail.
trait IntoResponsePlain {
    fn into_response_plain(self) -> Response;
}

impl IntoResponsePlain for StatusCode {
    fn into_response_plain(self) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = self;
        response
    }
}
