//! A [`Facilitator`] implementation that talks to a remote facilitator over
//! HTTP.
//!
//! Handles `POST /verify`, `POST /settle`, and `GET /supported` relative to
//! a base URL. Cheap to clone: the underlying `reqwest::Client` shares its
//! connection pool.

use http::{HeaderMap, StatusCode};
use reqwest::Client;
use std::time::Duration;
use url::Url;

use pay402::facilitator::Facilitator;
use pay402::proto;
use pay402::proto::v2;

/// Default timeout on each facilitator call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A client for a remote x402 facilitator.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    base_url: Url,
    verify_url: Url,
    settle_url: Url,
    supported_url: Url,
    client: Client,
    headers: HeaderMap,
    timeout: Duration,
}

impl Facilitator for FacilitatorClient {
    type Error = FacilitatorClientError;

    async fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> Result<v2::VerifyResponse, FacilitatorClientError> {
        self.post_json(&self.verify_url, "POST /verify", request)
            .await
    }

    async fn settle(
        &self,
        request: &proto::SettleRequest,
    ) -> Result<v2::SettleResponse, FacilitatorClientError> {
        self.post_json(&self.settle_url, "POST /settle", request)
            .await
    }

    async fn supported(&self) -> Result<proto::SupportedResponse, FacilitatorClientError> {
        self.get_json(&self.supported_url, "GET /supported").await
    }
}

/// Errors while interacting with a remote facilitator.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    /// A derived endpoint URL could not be constructed.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    /// The HTTP request failed at the transport level.
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// The response body was not the expected JSON.
    #[error("failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// The facilitator answered with an unexpected status.
    #[error("unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
    /// The response body could not be read.
    #[error("failed to read response body: {context}: {source}")]
    ResponseBodyRead {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl FacilitatorClientError {
    /// Whether the facilitator could not be reached at all, as opposed to
    /// answering badly.
    pub fn is_unreachable(&self) -> bool {
        match self {
            FacilitatorClientError::Http { source, .. } => {
                source.is_connect() || source.is_timeout() || source.is_request()
            }
            _ => false,
        }
    }
}

impl FacilitatorClient {
    /// Constructs a client from a base URL, deriving the `./verify`,
    /// `./settle`, and `./supported` endpoints.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let client = Client::new();
        let verify_url = base_url
            .join("./verify")
            .map_err(|e| FacilitatorClientError::UrlParse {
                context: "failed to construct ./verify URL",
                source: e,
            })?;
        let settle_url = base_url
            .join("./settle")
            .map_err(|e| FacilitatorClientError::UrlParse {
                context: "failed to construct ./settle URL",
                source: e,
            })?;
        let supported_url =
            base_url
                .join("./supported")
                .map_err(|e| FacilitatorClientError::UrlParse {
                    context: "failed to construct ./supported URL",
                    source: e,
                })?;
        Ok(Self {
            client,
            base_url,
            verify_url,
            settle_url,
            supported_url,
            headers: HeaderMap::new(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// The base URL this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Attaches custom headers to all future requests.
    pub fn with_headers(&self, headers: HeaderMap) -> Self {
        let mut this = self.clone();
        this.headers = headers;
        this
    }

    /// Overrides the per-call timeout (default 30 s).
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = timeout;
        this
    }

    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, FacilitatorClientError>
    where
        T: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut req = self
            .client
            .post(url.clone())
            .json(payload)
            .timeout(self.timeout);
        for (key, value) in self.headers.iter() {
            req = req.header(key, value);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| FacilitatorClientError::Http { context, source: e })?;
        Self::read_json(http_response, context).await
    }

    async fn get_json<R>(&self, url: &Url, context: &'static str) -> Result<R, FacilitatorClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        let mut req = self.client.get(url.clone()).timeout(self.timeout);
        for (key, value) in self.headers.iter() {
            req = req.header(key, value);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| FacilitatorClientError::Http { context, source: e })?;
        Self::read_json(http_response, context).await
    }

    async fn read_json<R: serde::de::DeserializeOwned>(
        http_response: reqwest::Response,
        context: &'static str,
    ) -> Result<R, FacilitatorClientError> {
        if http_response.status() == StatusCode::OK {
            http_response
                .json::<R>()
                .await
                .map_err(|e| FacilitatorClientError::JsonDeserialization { context, source: e })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| FacilitatorClientError::ResponseBodyRead { context, source: e })?;
            tracing::warn!(%status, context, "facilitator request failed");
            Err(FacilitatorClientError::HttpStatus {
                context,
                status,
                body,
            })
        }
    }
}

impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Normalize: a single trailing slash so ./verify joins correctly.
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorClientError::UrlParse {
            context: "failed to parse base url",
            source: e,
        })?;
        FacilitatorClient::try_new(url)
    }
}

impl TryFrom<String> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FacilitatorClient::try_from(value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_endpoint_urls() {
        let client = FacilitatorClient::try_from("https://facilitator.example/api").unwrap();
        assert_eq!(client.base_url().as_str(), "https://facilitator.example/api/");
        assert_eq!(
            client.verify_url.as_str(),
            "https://facilitator.example/api/verify"
        );
        assert_eq!(
            client.settle_url.as_str(),
            "https://facilitator.example/api/settle"
        );
        assert_eq!(
            client.supported_url.as_str(),
            "https://facilitator.example/api/supported"
        );
    }

    #[test]
    fn default_timeout_is_thirty_seconds() {
        let client = FacilitatorClient::try_from("https://facilitator.example/").unwrap();
        assert_eq!(client.timeout, Duration::from_secs(30));
        let faster = client.with_timeout(Duration::from_secs(5));
        assert_eq!(faster.timeout, Duration::from_secs(5));
    }
}
