//! End-to-end client flow against a mock resource server.

use alloy_signer_local::PrivateKeySigner;
use serde_json::json;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pay402::proto::codec;
use pay402::proto::v2;
use pay402_eip155::exact::Eip155ExactClient;
use pay402_reqwest::{ReqwestWithPayments, SpendingCap, X402Client, decode_receipt};

const BASE_SEPOLIA_USDC: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";

fn challenge_json() -> serde_json::Value {
    json!({
        "x402Version": 2,
        "error": "payment required",
        "resource": {
            "url": "https://api.example/premium",
            "description": "premium data",
            "mimeType": "application/json"
        },
        "accepts": [{
            "scheme": "exact",
            "network": "eip155:84532",
            "amount": "1000",
            "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
            "maxTimeoutSeconds": 300,
            "asset": BASE_SEPOLIA_USDC,
            "extra": { "name": "USDC", "version": "2" }
        }]
    })
}

fn challenge_response() -> ResponseTemplate {
    let body = challenge_json();
    let header = codec::encode(&body).unwrap();
    ResponseTemplate::new(402)
        .insert_header("PAYMENT-REQUIRED", header.as_str())
        .set_body_json(body)
}

async fn mock_paid_endpoint(server: &MockServer) {
    let receipt = v2::SettleResponse::Success {
        payer: None,
        transaction: "0xfeedface".into(),
        network: "eip155:84532".parse().unwrap(),
    };
    Mock::given(method("GET"))
        .and(path("/premium"))
        .and(header_exists("PAYMENT-SIGNATURE"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("PAYMENT-RESPONSE", codec::encode(&receipt).unwrap().as_str())
                .set_body_json(json!({ "data": "premium" })),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/premium"))
        .respond_with(challenge_response())
        .mount(server)
        .await;
}

#[tokio::test]
async fn pays_a_402_and_retries_once() {
    let server = MockServer::start().await;
    mock_paid_endpoint(&server).await;

    let signer = PrivateKeySigner::random();
    let client = reqwest::Client::new()
        .with_payments(X402Client::new().register(Eip155ExactClient::new(signer)));

    let response = client
        .get(format!("{}/premium", server.uri()))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let receipt = decode_receipt(&response).unwrap();
    assert!(receipt.is_success());
    assert_eq!(response.json::<serde_json::Value>().await.unwrap()["data"], "premium");

    // The server saw the unpaid probe and exactly one paid retry, carrying
    // a payload that echoes the offered acceptor.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let paid = &requests[1];
    let header = paid.headers.get("PAYMENT-SIGNATURE").unwrap();
    let payload = codec::decode_payment_signature(header.as_bytes()).unwrap();
    assert_eq!(
        serde_json::to_value(&payload.accepted).unwrap(),
        challenge_json()["accepts"][0]
    );
}

#[tokio::test]
async fn second_402_is_returned_to_the_caller() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/premium"))
        .respond_with(challenge_response())
        .mount(&server)
        .await;

    let client = reqwest::Client::new().with_payments(
        X402Client::new().register(Eip155ExactClient::new(PrivateKeySigner::random())),
    );

    let response = client
        .get(format!("{}/premium", server.uri()))
        .send()
        .await
        .unwrap();

    // Retried once, still 402: permanent failure, surfaced untouched.
    assert_eq!(response.status(), 402);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn spending_cap_blocks_expensive_acceptors() {
    let server = MockServer::start().await;
    mock_paid_endpoint(&server).await;

    let client = reqwest::Client::new().with_payments(
        X402Client::new()
            .register(Eip155ExactClient::new(PrivateKeySigner::random()))
            .with_policy(
                SpendingCap::new()
                    .cap("eip155:84532", BASE_SEPOLIA_USDC, 999)
                    .unwrap(),
            ),
    );

    let result = client
        .get(format!("{}/premium", server.uri()))
        .send()
        .await;

    // No candidate survives the cap: the middleware reports the failure
    // instead of paying.
    assert!(result.is_err());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn no_signer_for_any_acceptor_is_an_error() {
    let server = MockServer::start().await;
    mock_paid_endpoint(&server).await;

    // A client with no registered mechanisms cannot pay anything.
    let client = reqwest::Client::new().with_payments(X402Client::new());
    let result = client
        .get(format!("{}/premium", server.uri()))
        .send()
        .await;
    assert!(result.is_err());
}
