//! The paying client: challenge parsing, candidate selection, signing, and
//! the retry-once middleware.

use http::{Extensions, HeaderMap, StatusCode};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
use std::collections::BTreeMap;
use std::sync::Arc;

use pay402::proto::codec;
use pay402::proto::v2;
use pay402::scheme::client::{
    ClientError, FirstMatch, PaymentCandidate, PaymentPolicy, PaymentSelector, SchemeClient,
};
use pay402::util::Base64Bytes;

/// Client → server header carrying the base64url payment payload.
const PAYMENT_SIGNATURE_HEADER: &str = "PAYMENT-SIGNATURE";
/// Server → client header duplicating the 402 challenge body.
const PAYMENT_REQUIRED_HEADER: &str = "PAYMENT-REQUIRED";
/// Server → client header carrying the base64url settlement receipt.
const PAYMENT_RESPONSE_HEADER: &str = "PAYMENT-RESPONSE";

/// A 402 challenge reduced to what selection needs: the resource metadata
/// and the raw acceptors, order preserved.
#[derive(Debug, Clone)]
pub struct ParsedChallenge {
    /// Resource metadata from the challenge.
    pub resource: Option<v2::ResourceInfo>,
    /// The offered acceptors, verbatim.
    pub accepts: Vec<serde_json::Value>,
}

/// The x402-paying reqwest middleware.
pub struct X402Client<TSelector = FirstMatch> {
    schemes: ClientSchemes,
    selector: TSelector,
    policies: Vec<Arc<dyn PaymentPolicy>>,
    extensions: BTreeMap<String, serde_json::Value>,
}

impl X402Client<FirstMatch> {
    /// Creates a client with [`FirstMatch`] selection: the first acceptor a
    /// registered mechanism can pay, in challenge order.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for X402Client<FirstMatch> {
    fn default() -> Self {
        Self {
            schemes: ClientSchemes::default(),
            selector: FirstMatch,
            policies: Vec::new(),
            extensions: BTreeMap::new(),
        }
    }
}

impl<TSelector> X402Client<TSelector> {
    /// Registers a mechanism client. Registration order breaks ties when
    /// several clients can pay the same acceptor.
    pub fn register<S: SchemeClient + 'static>(mut self, scheme: S) -> Self {
        self.schemes.push(scheme);
        self
    }

    /// Replaces the payment selector.
    pub fn with_selector<P: PaymentSelector + 'static>(self, selector: P) -> X402Client<P> {
        X402Client {
            schemes: self.schemes,
            selector,
            policies: self.policies,
            extensions: self.extensions,
        }
    }

    /// Adds a wallet policy filter, applied before selection.
    pub fn with_policy<P: PaymentPolicy + 'static>(mut self, policy: P) -> Self {
        self.policies.push(Arc::new(policy));
        self
    }

    /// Attaches an extension value to every payment payload (e.g. an
    /// idempotency id or a client identity).
    pub fn with_extension<K: Into<String>>(mut self, key: K, value: serde_json::Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }
}

impl<TSelector> X402Client<TSelector>
where
    TSelector: PaymentSelector,
{
    /// Builds the retry headers for a 402 response.
    pub async fn make_payment_headers(&self, res: Response) -> Result<HeaderMap, ClientError> {
        let challenge = parse_payment_required(res)
            .await
            .ok_or_else(|| ClientError::ParseError("invalid 402 response".to_string()))?;

        let candidates = self.schemes.candidates(&challenge);
        let allowed: Vec<PaymentCandidate> = candidates
            .into_iter()
            .filter(|candidate| self.policies.iter().all(|policy| policy.allows(candidate)))
            .collect();
        let selected = self
            .selector
            .select(&allowed)
            .ok_or(ClientError::NoMatchingPaymentOption)?;

        tracing::debug!(
            scheme = %selected.scheme,
            network = %selected.chain_id,
            amount = selected.amount,
            "selected payment acceptor"
        );

        let extensions = if self.extensions.is_empty() {
            None
        } else {
            Some(&self.extensions)
        };
        let signed = self
            .schemes
            .sign(selected, extensions)
            .await?;

        let mut headers = HeaderMap::new();
        headers.insert(
            PAYMENT_SIGNATURE_HEADER,
            signed
                .parse()
                .map_err(|e| ClientError::SigningError(format!("header encoding: {e}")))?,
        );
        Ok(headers)
    }
}

/// Registered mechanism clients, in registration order.
#[derive(Default)]
pub struct ClientSchemes(Vec<Arc<dyn SchemeClient>>);

impl ClientSchemes {
    /// Adds a mechanism client.
    pub fn push<T: SchemeClient + 'static>(&mut self, client: T) {
        self.0.push(Arc::new(client));
    }

    /// Builds candidates: for each acceptor in challenge order, the first
    /// registered client that can handle it contributes one candidate.
    pub fn candidates(&self, challenge: &ParsedChallenge) -> Vec<PaymentCandidate> {
        let mut candidates = Vec::new();
        for raw in &challenge.accepts {
            let scheme = raw.get("scheme").and_then(|v| v.as_str()).unwrap_or("");
            let Some(network) = raw
                .get("network")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
            else {
                continue;
            };
            for (client_index, client) in self.0.iter().enumerate() {
                if !client.can_handle(scheme, &network) {
                    continue;
                }
                match client.to_candidate(raw, client_index, challenge.resource.clone()) {
                    Ok(candidate) => {
                        candidates.push(candidate);
                        break;
                    }
                    Err(error) => {
                        tracing::debug!(%error, "client could not parse acceptor");
                    }
                }
            }
        }
        candidates
    }

    async fn sign(
        &self,
        candidate: &PaymentCandidate,
        extensions: Option<&BTreeMap<String, serde_json::Value>>,
    ) -> Result<String, ClientError> {
        let client = self
            .0
            .get(candidate.client_index)
            .ok_or(ClientError::NoMatchingPaymentOption)?;
        client.sign_payment(candidate, extensions).await
    }
}

#[async_trait::async_trait]
impl<TSelector> rqm::Middleware for X402Client<TSelector>
where
    TSelector: PaymentSelector + Send + Sync + 'static,
{
    /// Passes the request through; on a 402, signs a payment and retries
    /// exactly once.
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone();
        let res = next.clone().run(req, extensions).await?;

        if res.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(res);
        }

        tracing::info!(url = %res.url(), "received 402 Payment Required, constructing payment");

        let headers = self
            .make_payment_headers(res)
            .await
            .map_err(|e| rqm::Error::Middleware(e.into()))?;

        let mut retry = retry_req.ok_or(rqm::Error::Middleware(
            ClientError::RequestNotCloneable.into(),
        ))?;
        retry.headers_mut().extend(headers);

        // At most one retry per request: whatever comes back now — a second
        // 402 included — is the final answer.
        next.run(retry, extensions).await
    }
}

/// Parses a 402 response into a [`ParsedChallenge`].
///
/// The `PAYMENT-REQUIRED` header is authoritative when present; the JSON
/// body is the fallback for servers that only emit one of the two.
pub async fn parse_payment_required(response: Response) -> Option<ParsedChallenge> {
    let from_header = response
        .headers()
        .get(PAYMENT_REQUIRED_HEADER)
        .and_then(|h| Base64Bytes::from(h.as_bytes()).decode().ok())
        .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok());

    let value = match from_header {
        Some(value) => value,
        None => {
            let bytes = response.bytes().await.ok()?;
            serde_json::from_slice::<serde_json::Value>(&bytes).ok()?
        }
    };

    if value.get("x402Version").and_then(|v| v.as_u64()) != Some(u64::from(v2::X402Version2::VALUE))
    {
        return None;
    }
    let resource = value
        .get("resource")
        .and_then(|r| serde_json::from_value(r.clone()).ok());
    let accepts = value.get("accepts")?.as_array()?.clone();
    Some(ParsedChallenge { resource, accepts })
}

/// Decodes the settlement receipt attached to a successful response, if
/// any.
pub fn decode_receipt(response: &Response) -> Option<v2::SettleResponse> {
    let header = response.headers().get(PAYMENT_RESPONSE_HEADER)?;
    codec::decode(header.as_bytes()).ok()
}

/// Sugar for wiring the middleware onto a reqwest client.
pub trait ReqwestWithPayments {
    /// Wraps this client with automatic x402 payment handling.
    fn with_payments<TSelector>(self, x402: X402Client<TSelector>) -> rqm::ClientWithMiddleware
    where
        TSelector: PaymentSelector + Send + Sync + 'static;
}

impl ReqwestWithPayments for reqwest::Client {
    fn with_payments<TSelector>(self, x402: X402Client<TSelector>) -> rqm::ClientWithMiddleware
    where
        TSelector: PaymentSelector + Send + Sync + 'static,
    {
        rqm::ClientBuilder::new(self).with(x402).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pay402::chain::ChainId;
    use serde_json::json;

    struct StubClient {
        network: &'static str,
    }

    #[async_trait::async_trait]
    impl SchemeClient for StubClient {
        fn can_handle(&self, scheme: &str, network: &ChainId) -> bool {
            scheme == "exact" && network.namespace() == self.network
        }

        fn to_candidate(
            &self,
            raw: &serde_json::Value,
            client_index: usize,
            resource: Option<v2::ResourceInfo>,
        ) -> Result<PaymentCandidate, ClientError> {
            Ok(PaymentCandidate {
                chain_id: raw["network"].as_str().unwrap().parse().unwrap(),
                asset: raw["asset"].as_str().unwrap_or_default().to_string(),
                amount: raw["amount"]
                    .as_str()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_default(),
                scheme: "exact".into(),
                client_index,
                raw_acceptor: raw.clone(),
                resource,
            })
        }

        async fn sign_payment(
            &self,
            _candidate: &PaymentCandidate,
            _extensions: Option<&BTreeMap<String, serde_json::Value>>,
        ) -> Result<String, ClientError> {
            Ok("c2lnbmVk".to_string())
        }
    }

    fn acceptor(network: &str, amount: &str) -> serde_json::Value {
        json!({
            "scheme": "exact",
            "network": network,
            "amount": amount,
            "payTo": "0xP",
            "maxTimeoutSeconds": 300,
            "asset": "0xA",
            "extra": null
        })
    }

    #[test]
    fn candidates_follow_challenge_order_and_signer_coverage() {
        let mut schemes = ClientSchemes::default();
        schemes.push(StubClient { network: "eip155" });

        let challenge = ParsedChallenge {
            resource: None,
            accepts: vec![
                acceptor("solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp", "10"),
                acceptor("eip155:84532", "1000"),
                acceptor("eip155:8453", "900"),
            ],
        };
        let candidates = schemes.candidates(&challenge);
        // The Solana acceptor has no registered signer; the EVM ones keep
        // their challenge order.
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].chain_id.to_string(), "eip155:84532");
        assert_eq!(candidates[1].chain_id.to_string(), "eip155:8453");
    }
}
