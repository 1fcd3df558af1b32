//! HTTP surface tests against a stubbed scheme handler.

use axum::Router;
use axum::body::Body;
use http::{Request, StatusCode, header};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use pay402::chain::{ChainId, ChainProviderOps};
use pay402::facilitator_local::FacilitatorLocal;
use pay402::proto;
use pay402::proto::v2;
use pay402::scheme::{
    SchemeFacilitator, SchemeFacilitatorBuilder, SchemeFacilitatorError, SchemeId, SchemeRegistry,
};
use pay402_facilitator::handlers;

struct StaticProvider(ChainId);

impl ChainProviderOps for StaticProvider {
    fn signer_addresses(&self) -> Vec<String> {
        vec!["0xSIGNER".into()]
    }
    fn chain_id(&self) -> ChainId {
        self.0.clone()
    }
}

struct StubHandler;

#[async_trait::async_trait]
impl SchemeFacilitator for StubHandler {
    async fn verify(
        &self,
        _request: &proto::VerifyRequest,
    ) -> Result<v2::VerifyResponse, SchemeFacilitatorError> {
        Ok(v2::VerifyResponse::valid("0xPAYER"))
    }

    async fn settle(
        &self,
        _request: &proto::SettleRequest,
    ) -> Result<v2::SettleResponse, SchemeFacilitatorError> {
        Ok(v2::SettleResponse::Success {
            payer: Some("0xPAYER".into()),
            transaction: "0xtx".into(),
            network: ChainId::new("eip155", "84532"),
        })
    }

    async fn supported(&self) -> Result<proto::SupportedResponse, SchemeFacilitatorError> {
        Ok(proto::SupportedResponse {
            kinds: vec![proto::SupportedPaymentKind {
                x402_version: 2,
                scheme: "exact".into(),
                network: ChainId::new("eip155", "84532"),
                extra: None,
            }],
            extensions: vec![],
        })
    }
}

struct StubBlueprint;

impl SchemeId for StubBlueprint {
    fn namespace(&self) -> &str {
        "eip155"
    }
    fn scheme(&self) -> &str {
        "exact"
    }
}

impl SchemeFacilitatorBuilder<&StaticProvider> for StubBlueprint {
    fn build(
        &self,
        _provider: &StaticProvider,
        _config: Option<serde_json::Value>,
    ) -> Result<Box<dyn SchemeFacilitator>, Box<dyn std::error::Error>> {
        Ok(Box::new(StubHandler))
    }
}

fn app() -> Router {
    let provider = StaticProvider(ChainId::new("eip155", "84532"));
    let mut registry = SchemeRegistry::new();
    registry.register(&StubBlueprint, &provider, None).unwrap();
    let facilitator = Arc::new(FacilitatorLocal::new(registry));
    Router::new().merge(handlers::routes().with_state(facilitator))
}

fn verify_body(version: u64, scheme: &str, network: &str) -> Value {
    json!({
        "paymentPayload": {
            "x402Version": version,
            "accepted": { "scheme": scheme, "network": network },
            "payload": {}
        },
        "paymentRequirements": {}
    })
}

async fn post_json(app: &Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn verify_routes_to_handler() {
    let app = app();
    let (status, body) = post_json(&app, "/verify", &verify_body(2, "exact", "eip155:84532")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "valid": true, "payer": "0xPAYER" }));
}

#[tokio::test]
async fn verify_rejects_unsupported_kinds_with_200() {
    let app = app();

    let (status, body) = post_json(&app, "/verify", &verify_body(2, "upto", "eip155:84532")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert_eq!(body["reason"], "unsupported_scheme");

    let (_, body) = post_json(&app, "/verify", &verify_body(2, "exact", "eip155:1")).await;
    assert_eq!(body["reason"], "unsupported_network");

    let (_, body) = post_json(&app, "/verify", &verify_body(1, "exact", "eip155:84532")).await;
    assert_eq!(body["reason"], "unsupported_version");
}

#[tokio::test]
async fn settle_returns_receipt() {
    let app = app();
    let (status, body) = post_json(&app, "/settle", &verify_body(2, "exact", "eip155:84532")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["transaction"], "0xtx");
    assert_eq!(body["network"], "eip155:84532");
}

#[tokio::test]
async fn supported_lists_kinds() {
    let app = app();
    let (status, body) = get_json(&app, "/supported").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kinds"][0]["scheme"], "exact");
    assert_eq!(body["kinds"][0]["network"], "eip155:84532");
    assert_eq!(body["extensions"], json!([]));

    let (health_status, _) = get_json(&app, "/health").await;
    assert_eq!(health_status, StatusCode::OK);
}

#[tokio::test]
async fn endpoint_descriptions() {
    let app = app();
    let (status, body) = get_json(&app, "/verify").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["endpoint"], "/verify");
    let (_, body) = get_json(&app, "/settle").await;
    assert_eq!(body["endpoint"], "/settle");
}
