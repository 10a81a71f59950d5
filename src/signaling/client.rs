//! Signaling client - one JSON POST carrying the offer, one answer back.
//!
//! Flow:
//! 1. Serialize `{offer, prompt}` as the request body
//! 2. POST it to the fixed endpoint (`Content-Type: application/json`)
//! 3. Await the full response body
//! 4. Decode the body as a session description
//!
//! There is no timeout and no retry. The HTTP status is not validated;
//! a body that does not decode as a description is the failure signal.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

use super::message::{OfferRequest, SessionDescription};

/// Errors from the signaling round-trip
#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("Invalid signaling URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to encode offer request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to build request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("Signaling request failed: {0}")]
    Unreachable(#[source] hyper_util::client::legacy::Error),

    #[error("Failed to read response body: {0}")]
    Body(#[source] hyper::Error),

    #[error("Malformed answer (HTTP {status}): {source}")]
    MalformedResponse {
        status: StatusCode,
        #[source]
        source: serde_json::Error,
    },
}

/// HTTP client for a single signaling endpoint
#[derive(Clone)]
pub struct SignalingClient {
    /// Endpoint URL (e.g., "http://127.0.0.1:8888/offer")
    endpoint_url: String,
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl SignalingClient {
    /// Create a client for `endpoint_url`. Only http and https are accepted.
    pub fn new(endpoint_url: &str) -> Result<Self, SignalingError> {
        let parsed = url::Url::parse(endpoint_url).map_err(|e| SignalingError::InvalidUrl {
            url: endpoint_url.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(SignalingError::InvalidUrl {
                url: endpoint_url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        // HTTP client with webpki roots for TLS
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(https);

        Ok(Self {
            endpoint_url: endpoint_url.to_string(),
            client,
        })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// POST the offer request and decode the answer.
    pub async fn post_offer(
        &self,
        offer: &OfferRequest,
    ) -> Result<SessionDescription, SignalingError> {
        let body = serde_json::to_vec(offer).map_err(SignalingError::Encode)?;

        let request = Request::builder()
            .method(Method::POST)
            .uri(&self.endpoint_url)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(body)))?;

        log::info!("Posting offer to {}", self.endpoint_url);

        let response = self
            .client
            .request(request)
            .await
            .map_err(SignalingError::Unreachable)?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("Signaling endpoint returned {}", status);
        }

        let body_bytes = response
            .into_body()
            .collect()
            .await
            .map_err(SignalingError::Body)?
            .to_bytes();

        let answer: SessionDescription = serde_json::from_slice(&body_bytes)
            .map_err(|source| SignalingError::MalformedResponse { status, source })?;

        log::debug!("Received {} ({} bytes of SDP)", answer.sdp_type, answer.sdp.len());

        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::message::{default_prompt, SdpType};
    use crate::signaling::test_support::{spawn_canned_server, CannedResponse};

    #[test]
    fn test_rejects_bad_urls() {
        assert!(matches!(
            SignalingClient::new("not a url"),
            Err(SignalingError::InvalidUrl { .. })
        ));
        assert!(matches!(
            SignalingClient::new("ws://127.0.0.1:8888/offer"),
            Err(SignalingError::InvalidUrl { .. })
        ));
        assert!(SignalingClient::new("https://example.org/offer").is_ok());
    }

    #[tokio::test]
    async fn test_posts_json_and_decodes_answer() {
        let server = spawn_canned_server(CannedResponse::json(
            200,
            r#"{"sdp":"v=0\r\n","type":"answer"}"#,
        ))
        .await;

        let client = SignalingClient::new(&server.url("/offer")).unwrap();
        let answer = client
            .post_offer(&OfferRequest::new("v=0\r\noffer\r\n", default_prompt()))
            .await
            .unwrap();

        assert_eq!(answer.sdp_type, SdpType::Answer);
        assert_eq!(answer.sdp, "v=0\r\n");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/offer");
        assert_eq!(requests[0].content_type.as_deref(), Some("application/json"));

        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["offer"]["type"], "offer");
        assert_eq!(body["offer"]["sdp"], "v=0\r\noffer\r\n");
        assert_eq!(body["prompt"], default_prompt());
    }

    #[tokio::test]
    async fn test_status_is_not_validated() {
        let server = spawn_canned_server(CannedResponse::json(
            500,
            r#"{"sdp":"v=0\r\n","type":"answer"}"#,
        ))
        .await;

        let client = SignalingClient::new(&server.url("/offer")).unwrap();
        let answer = client
            .post_offer(&OfferRequest::new("v=0\r\n", default_prompt()))
            .await
            .unwrap();
        assert_eq!(answer.sdp_type, SdpType::Answer);
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let server = spawn_canned_server(CannedResponse::text(502, "Bad Gateway")).await;

        let client = SignalingClient::new(&server.url("/offer")).unwrap();
        let err = client
            .post_offer(&OfferRequest::new("v=0\r\n", default_prompt()))
            .await
            .unwrap_err();

        match err {
            SignalingError::MalformedResponse { status, .. } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY)
            }
            other => panic!("Expected MalformedResponse, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = SignalingClient::new(&format!("http://{}/offer", addr)).unwrap();
        let err = client
            .post_offer(&OfferRequest::new("v=0\r\n", default_prompt()))
            .await
            .unwrap_err();
        assert!(matches!(err, SignalingError::Unreachable(_)));
    }
}
