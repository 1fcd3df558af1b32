//! End-to-end tests of the payment gate against a scripted facilitator.

use axum::body::Body;
use axum::routing::get;
use axum::{Json, Router};
use http::{Request, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::ServiceExt;

use pay402::chain::ChainId;
use pay402::extensions::ExtensionRegistry;
use pay402::extensions::idempotency::{IdempotencyExtension, MemoryIdempotencyStore};
use pay402::facilitator::Facilitator;
use pay402::proto::codec;
use pay402::proto::v2;
use pay402::proto::{ErrorReason, SupportedPaymentKind, SupportedResponse, VerifyRequest};
use pay402::scheme::ServerSchemes;
use pay402::util::Base64Bytes;
use pay402_axum::{
    AcceptorConfig, InfraFailure, NoopHooks, PaygateHooks, PaymentContext, Price, RouteConfig,
    RouteTable, X402Layer, X402Middleware,
};
use pay402_eip155::exact::Eip155ExactServer;

const PAY_TO: &str = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C";
const BASE_SEPOLIA_USDC: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";

#[derive(Debug, thiserror::Error)]
#[error("scripted facilitator failure")]
struct ScriptedError;

impl From<ScriptedError> for InfraFailure {
    fn from(error: ScriptedError) -> Self {
        InfraFailure::Unreachable(error.to_string())
    }
}

/// A facilitator whose outcomes are fixed per test, with call counters.
#[derive(Clone)]
struct ScriptedFacilitator {
    verify_outcome: Arc<v2::VerifyResponse>,
    settle_outcome: Arc<v2::SettleResponse>,
    supported: Arc<SupportedResponse>,
    verify_calls: Arc<AtomicUsize>,
    settle_calls: Arc<AtomicUsize>,
}

impl ScriptedFacilitator {
    fn happy() -> Self {
        Self::new(
            v2::VerifyResponse::valid("0xPAYER"),
            v2::SettleResponse::Success {
                payer: Some("0xPAYER".into()),
                transaction: "0xdeadbeef".into(),
                network: "eip155:84532".parse().unwrap(),
            },
        )
    }

    fn new(verify: v2::VerifyResponse, settle: v2::SettleResponse) -> Self {
        Self {
            verify_outcome: Arc::new(verify),
            settle_outcome: Arc::new(settle),
            supported: Arc::new(SupportedResponse {
                kinds: vec![SupportedPaymentKind {
                    x402_version: 2,
                    scheme: "exact".into(),
                    network: "eip155:84532".parse().unwrap(),
                    extra: None,
                }],
                extensions: vec![],
            }),
            verify_calls: Arc::new(AtomicUsize::new(0)),
            settle_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_supported(mut self, supported: SupportedResponse) -> Self {
        self.supported = Arc::new(supported);
        self
    }
}

impl Facilitator for ScriptedFacilitator {
    type Error = ScriptedError;

    async fn verify(&self, _request: &VerifyRequest) -> Result<v2::VerifyResponse, ScriptedError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        Ok((*self.verify_outcome).clone())
    }

    async fn settle(&self, _request: &VerifyRequest) -> Result<v2::SettleResponse, ScriptedError> {
        self.settle_calls.fetch_add(1, Ordering::SeqCst);
        Ok((*self.settle_outcome).clone())
    }

    async fn supported(&self) -> Result<SupportedResponse, ScriptedError> {
        Ok((*self.supported).clone())
    }
}

fn schemes() -> ServerSchemes {
    ServerSchemes::new().with_namespace("exact", "eip155", Eip155ExactServer)
}

fn protected_routes() -> RouteTable {
    RouteTable::new()
        .route(
            "GET /protected",
            vec![
                AcceptorConfig::new("exact", "eip155:84532", PAY_TO, Price::money("$0.001"))
                    .unwrap(),
            ],
        )
        .unwrap()
}

async fn layer(facilitator: ScriptedFacilitator) -> X402Layer<ScriptedFacilitator> {
    X402Middleware::new(protected_routes(), schemes(), facilitator)
        .initialize()
        .await
        .unwrap()
}

fn app<H>(layer: X402Layer<ScriptedFacilitator>, handler_calls: Arc<AtomicUsize>, handler: H) -> Router
where
    H: Fn() -> (StatusCode, Json<Value>) + Clone + Send + Sync + 'static,
{
    Router::new()
        .route(
            "/protected",
            get(move || {
                let handler = handler.clone();
                let handler_calls = handler_calls.clone();
                async move {
                    handler_calls.fetch_add(1, Ordering::SeqCst);
                    handler()
                }
            }),
        )
        .route("/open", get(|| async { "open" }))
        .layer(layer)
}

fn ok_handler() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "hello": "world" })))
}

async fn body_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn challenge(app: &Router) -> (http::response::Parts, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/protected")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let (parts, body) = response.into_parts();
    (parts, body_json(body).await)
}

/// Builds a payment header echoing the given acceptor verbatim.
fn payment_header(accepted: &Value, extensions: Option<Value>) -> String {
    let mut payload = json!({
        "x402Version": 2,
        "accepted": accepted,
        "payload": { "signature": "0xsigned", "authorization": {} }
    });
    if let Some(extensions) = extensions {
        payload["extensions"] = extensions;
    }
    codec::encode(&payload).unwrap()
}

async fn paid_request(app: &Router, header: &str) -> http::Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .uri("/protected")
                .header("PAYMENT-SIGNATURE", header)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn happy_path() {
    let facilitator = ScriptedFacilitator::happy();
    let handler_calls = Arc::new(AtomicUsize::new(0));
    let app = app(layer(facilitator.clone()).await, handler_calls.clone(), ok_handler);

    // First request: 402 with the priced challenge.
    let (parts, challenge_body) = challenge(&app).await;
    let acceptor = &challenge_body["accepts"][0];
    assert_eq!(challenge_body["x402Version"], 2);
    assert_eq!(challenge_body["error"], "payment required");
    assert_eq!(acceptor["amount"], "1000");
    assert_eq!(acceptor["asset"], BASE_SEPOLIA_USDC);
    assert_eq!(acceptor["payTo"], PAY_TO);
    assert_eq!(handler_calls.load(Ordering::SeqCst), 0);

    // The PAYMENT-REQUIRED header decodes byte-identically to the body.
    let header = parts.headers.get("PAYMENT-REQUIRED").unwrap();
    let decoded = Base64Bytes::from(header.as_bytes()).decode().unwrap();
    let header_json: Value = serde_json::from_slice(&decoded).unwrap();
    assert_eq!(header_json, challenge_body);

    // Retry with the payment attached.
    let header = payment_header(acceptor, None);
    let response = paid_request(&app, &header).await;
    assert_eq!(response.status(), StatusCode::OK);

    let receipt_header = response.headers().get("PAYMENT-RESPONSE").unwrap().clone();
    let receipt: v2::SettleResponse =
        codec::decode(receipt_header.as_bytes()).unwrap();
    assert_eq!(
        receipt,
        v2::SettleResponse::Success {
            payer: Some("0xPAYER".into()),
            transaction: "0xdeadbeef".into(),
            network: "eip155:84532".parse().unwrap(),
        }
    );
    assert_eq!(body_json(response.into_body()).await, json!({ "hello": "world" }));

    assert_eq!(handler_calls.load(Ordering::SeqCst), 1);
    assert_eq!(facilitator.verify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn verify_rejection_skips_handler_and_settle() {
    let facilitator = ScriptedFacilitator::new(
        v2::VerifyResponse::invalid(ErrorReason::InvalidSignature),
        ScriptedFacilitator::happy().settle_outcome.as_ref().clone(),
    );
    let handler_calls = Arc::new(AtomicUsize::new(0));
    let app = app(layer(facilitator.clone()).await, handler_calls.clone(), ok_handler);

    let (_, challenge_body) = challenge(&app).await;
    let header = payment_header(&challenge_body["accepts"][0], None);
    let response = paid_request(&app, &header).await;

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert!(response.headers().get("PAYMENT-RESPONSE").is_none());
    let body = body_json(response.into_body()).await;
    assert_eq!(body["error"], "invalid_signature");
    assert!(body["accepts"].is_array());

    assert_eq!(handler_calls.load(Ordering::SeqCst), 0);
    assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_handler_is_not_billed() {
    let facilitator = ScriptedFacilitator::happy();
    let handler_calls = Arc::new(AtomicUsize::new(0));
    let app = app(layer(facilitator.clone()).await, handler_calls.clone(), || {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "oops": true })))
    });

    let (_, challenge_body) = challenge(&app).await;
    let header = payment_header(&challenge_body["accepts"][0], None);
    let response = paid_request(&app, &header).await;

    // The handler's status passes through untouched; no settle, no receipt.
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get("PAYMENT-RESPONSE").is_none());
    assert_eq!(handler_calls.load(Ordering::SeqCst), 1);
    assert_eq!(facilitator.verify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_settlement_discards_handler_output() {
    let facilitator = ScriptedFacilitator::new(
        v2::VerifyResponse::valid("0xPAYER"),
        v2::SettleResponse::Error {
            reason: ErrorReason::SettlementSubmissionFailed,
            network: Some("eip155:84532".parse().unwrap()),
        },
    );
    let handler_calls = Arc::new(AtomicUsize::new(0));
    let app = app(layer(facilitator.clone()).await, handler_calls.clone(), ok_handler);

    let (_, challenge_body) = challenge(&app).await;
    let header = payment_header(&challenge_body["accepts"][0], None);
    let response = paid_request(&app, &header).await;

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert!(response.headers().get("PAYMENT-RESPONSE").is_none());
    let body = body_json(response.into_body()).await;
    assert_eq!(body["error"], "settlement_submission_failed");

    assert_eq!(handler_calls.load(Ordering::SeqCst), 1);
    assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_and_mismatched_payments() {
    let facilitator = ScriptedFacilitator::happy();
    let app = app(
        layer(facilitator.clone()).await,
        Arc::new(AtomicUsize::new(0)),
        ok_handler,
    );

    // Garbage base64.
    let response = paid_request(&app, "!!!").await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = body_json(response.into_body()).await;
    assert_eq!(body["error"], "invalid_header");

    // Valid base64, foreign version.
    let header = codec::encode(&json!({ "x402Version": 3, "accepted": {}, "payload": {} })).unwrap();
    let response = paid_request(&app, &header).await;
    let body = body_json(response.into_body()).await;
    assert_eq!(body["error"], "unsupported_version");

    // Accepted requirements that were never offered.
    let (_, challenge_body) = challenge(&app).await;
    let mut acceptor = challenge_body["accepts"][0].clone();
    acceptor["amount"] = json!("999999");
    let header = payment_header(&acceptor, None);
    let response = paid_request(&app, &header).await;
    let body = body_json(response.into_body()).await;
    assert_eq!(body["error"], "no_matching_requirements");

    assert_eq!(facilitator.verify_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unmatched_routes_pass_through() {
    let facilitator = ScriptedFacilitator::happy();
    let app = app(
        layer(facilitator.clone()).await,
        Arc::new(AtomicUsize::new(0)),
        ok_handler,
    );

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/open").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(facilitator.verify_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn multi_acceptor_disjunction() {
    let facilitator = ScriptedFacilitator::happy();
    let routes = RouteTable::new()
        .route(
            "GET /protected",
            vec![
                AcceptorConfig::new("exact", "eip155:84532", PAY_TO, Price::money("$0.001"))
                    .unwrap(),
                AcceptorConfig::new(
                    "exact",
                    "base",
                    PAY_TO,
                    Price::atomic("2500", "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
                )
                .unwrap(),
            ],
        )
        .unwrap();
    let layer = X402Middleware::new(routes, schemes(), facilitator.clone())
        .initialize()
        .await
        .unwrap();
    let handler_calls = Arc::new(AtomicUsize::new(0));
    let app = app(layer, handler_calls.clone(), ok_handler);

    let (_, challenge_body) = challenge(&app).await;
    let accepts = challenge_body["accepts"].as_array().unwrap();
    assert_eq!(accepts.len(), 2);
    assert_eq!(accepts[1]["network"], "eip155:8453");

    // A client paying with the second acceptor is served.
    let header = payment_header(&accepts[1], None);
    let response = paid_request(&app, &header).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(facilitator.verify_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sponsored_extra_is_advertised() {
    let facilitator = ScriptedFacilitator::happy().with_supported(SupportedResponse {
        kinds: vec![SupportedPaymentKind {
            x402_version: 2,
            scheme: "exact".into(),
            network: "eip155:84532".parse().unwrap(),
            extra: Some(json!({ "feePayer": "FeeSponsor1111111111111111111111" })),
        }],
        extensions: vec![],
    });
    let app = app(
        layer(facilitator).await,
        Arc::new(AtomicUsize::new(0)),
        ok_handler,
    );

    let (_, challenge_body) = challenge(&app).await;
    let extra = &challenge_body["accepts"][0]["extra"];
    // Facilitator-advertised sponsor data merged into the challenge,
    // alongside the price quote's own domain parameters.
    assert_eq!(extra["feePayer"], "FeeSponsor1111111111111111111111");
    assert_eq!(extra["name"], "USDC");
}

#[tokio::test]
async fn blocking_hook_aborts_before_handler() {
    struct Blocker;
    impl PaygateHooks for Blocker {
        fn on_before_execution<'a>(
            &'a self,
            _ctx: &'a PaymentContext,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + 'a>> {
            Box::pin(async { false })
        }
    }

    let facilitator = ScriptedFacilitator::happy();
    let layer = X402Middleware::new(protected_routes(), schemes(), facilitator.clone())
        .with_hooks(Blocker)
        .initialize()
        .await
        .unwrap();
    let handler_calls = Arc::new(AtomicUsize::new(0));
    let app = app(layer, handler_calls.clone(), ok_handler);

    let (_, challenge_body) = challenge(&app).await;
    let header = payment_header(&challenge_body["accepts"][0], None);
    let response = paid_request(&app, &header).await;

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = body_json(response.into_body()).await;
    assert_eq!(body["error"], "execution_blocked");
    assert_eq!(handler_calls.load(Ordering::SeqCst), 0);
    assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn noop_hooks_leave_outcome_alone() {
    let facilitator = ScriptedFacilitator::happy();
    let layer = X402Middleware::new(protected_routes(), schemes(), facilitator.clone())
        .with_hooks(NoopHooks)
        .initialize()
        .await
        .unwrap();
    let app = app(layer, Arc::new(AtomicUsize::new(0)), ok_handler);

    let (_, challenge_body) = challenge(&app).await;
    let header = payment_header(&challenge_body["accepts"][0], None);
    let response = paid_request(&app, &header).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn idempotent_duplicate_reuses_receipt() {
    let facilitator = ScriptedFacilitator::happy();
    let routes = RouteTable::new()
        .route_config(
            "GET /protected",
            RouteConfig {
                acceptors: vec![
                    AcceptorConfig::new("exact", "eip155:84532", PAY_TO, Price::money("$0.001"))
                        .unwrap(),
                ],
                description: String::new(),
                mime_type: "application/json".into(),
                resource: None,
                extensions: vec!["idempotency-id".into()],
                idempotency_required: true,
            },
        )
        .unwrap();
    let layer = X402Middleware::new(routes, schemes(), facilitator.clone())
        .with_extensions(ExtensionRegistry::new().with(IdempotencyExtension))
        .with_idempotency_store(MemoryIdempotencyStore::new())
        .initialize()
        .await
        .unwrap();
    let handler_calls = Arc::new(AtomicUsize::new(0));
    let app = app(layer, handler_calls.clone(), ok_handler);

    let (_, challenge_body) = challenge(&app).await;
    let acceptor = &challenge_body["accepts"][0];
    let extensions = json!({ "idempotency-id": "client-chosen-id-0001" });

    // Missing key on an idempotent route is rejected.
    let header = payment_header(acceptor, None);
    let response = paid_request(&app, &header).await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = body_json(response.into_body()).await;
    assert_eq!(body["error"], "extension_validation_failed");

    // First settled request.
    let header = payment_header(acceptor, Some(extensions.clone()));
    let response = paid_request(&app, &header).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("PAYMENT-RESPONSE").is_some());
    assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 1);

    // Exact duplicate: served with the cached receipt, no second settle,
    // no second verify.
    let response = paid_request(&app, &header).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("PAYMENT-RESPONSE").is_some());
    assert_eq!(facilitator.verify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 1);
    assert_eq!(handler_calls.load(Ordering::SeqCst), 2);

    // Same key, different payload: refused.
    let mut other = json!({
        "x402Version": 2,
        "accepted": acceptor,
        "payload": { "signature": "0xDIFFERENT", "authorization": {} }
    });
    other["extensions"] = extensions;
    let header = codec::encode(&other).unwrap();
    let response = paid_request(&app, &header).await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = body_json(response.into_body()).await;
    assert_eq!(body["error"], "replay");
}

#[tokio::test]
async fn concurrent_requests_settle_independently() {
    let facilitator = ScriptedFacilitator::happy();
    let handler_calls = Arc::new(AtomicUsize::new(0));
    let app = app(layer(facilitator.clone()).await, handler_calls.clone(), ok_handler);

    let (_, challenge_body) = challenge(&app).await;
    let header = payment_header(&challenge_body["accepts"][0], None);

    let mut join_set = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let app = app.clone();
        let header = header.clone();
        join_set.spawn(async move {
            let response = paid_request(&app, &header).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get("PAYMENT-RESPONSE").is_some());
        });
    }
    while let Some(result) = join_set.join_next().await {
        result.unwrap();
    }

    assert_eq!(facilitator.verify_calls.load(Ordering::SeqCst), 8);
    assert_eq!(facilitator.settle_calls.load(Ordering::SeqCst), 8);
    assert_eq!(handler_calls.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn unknown_scheme_is_a_startup_error() {
    let routes = RouteTable::new()
        .route(
            "GET /protected",
            vec![
                AcceptorConfig::new(
                    "exact",
                    "solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp",
                    "SellerPubkey11111111111111111111",
                    Price::atomic("1000", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
                )
                .unwrap(),
            ],
        )
        .unwrap();
    let result = X402Middleware::new(routes, schemes(), ScriptedFacilitator::happy())
        .initialize()
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn legacy_network_names_normalize_in_challenges() {
    let facilitator = ScriptedFacilitator::happy();
    let routes = RouteTable::new()
        .route(
            "GET /protected",
            vec![
                AcceptorConfig::new("exact", "base-sepolia", PAY_TO, Price::money("$0.001"))
                    .unwrap(),
            ],
        )
        .unwrap();
    let layer = X402Middleware::new(routes, schemes(), facilitator)
        .initialize()
        .await
        .unwrap();
    let app = app(layer, Arc::new(AtomicUsize::new(0)), ok_handler);

    let (_, challenge_body) = challenge(&app).await;
    // Outgoing wire values are canonical CAIP-2.
    assert_eq!(challenge_body["accepts"][0]["network"], "eip155:84532");
    let _: ChainId = challenge_body["accepts"][0]["network"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
}
