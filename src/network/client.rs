//! HTTP Peer Client
//!
//! JSON-over-HTTP implementation of `PeerTransport`.

use std::time::Duration;
use serde::Serialize;

use super::{PeerTransport, REPLICATION_PATH};
use crate::error::{Error, Result};
use crate::replication::{DecisionRequest, PrepareRequest, TransactionResponse};

/// reqwest-backed client for peer transaction handlers
#[derive(Clone)]
pub struct HttpPeerClient {
    client: reqwest::Client,
}

impl HttpPeerClient {
    /// Create a client whose requests give up after `request_timeout`
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            // Cluster traffic goes direct
            .no_proxy()
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Full URL of a replication endpoint on `peer`
    pub fn endpoint(peer: &str, action: &str) -> String {
        let base = peer.trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{}{}/{}", base, REPLICATION_PATH, action)
        } else {
            format!("http://{}{}/{}", base, REPLICATION_PATH, action)
        }
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        peer: &str,
        action: &str,
        body: &T,
    ) -> Result<TransactionResponse> {
        let url = Self::endpoint(peer, action);
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(peer, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::PeerRejected {
                address: peer.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<TransactionResponse>()
            .await
            .map_err(|e| request_error(peer, e))
    }
}

fn request_error(peer: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::ConnectionTimeout(peer.to_string())
    } else if e.is_connect() {
        Error::ConnectionFailed {
            address: peer.to_string(),
            reason: e.to_string(),
        }
    } else {
        Error::Network(format!("{}: {}", peer, e))
    }
}

#[async_trait::async_trait]
impl PeerTransport for HttpPeerClient {
    async fn prepare(&self, peer: &str, request: &PrepareRequest) -> Result<TransactionResponse> {
        self.post(peer, "prepare", request).await
    }

    async fn commit(&self, peer: &str, request: &DecisionRequest) -> Result<TransactionResponse> {
        self.post(peer, "commit", request).await
    }

    async fn abort(&self, peer: &str, request: &DecisionRequest) -> Result<TransactionResponse> {
        self.post(peer, "abort", request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        assert_eq!(
            HttpPeerClient::endpoint("http://node-b:8080/", "prepare"),
            "http://node-b:8080/internal/replication/prepare"
        );
        assert_eq!(
            HttpPeerClient::endpoint("node-b:8080", "commit"),
            "http://node-b:8080/internal/replication/commit"
        );
    }

    #[tokio::test]
    async fn test_connection_failure() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = HttpPeerClient::new(Duration::from_millis(500)).unwrap();
        let request = DecisionRequest {
            transaction_id: "t1".into(),
            coordinator_id: "node-a".into(),
        };

        let result = client.abort(&address, &request).await;
        assert!(matches!(
            result,
            Err(Error::ConnectionFailed { .. }) | Err(Error::ConnectionTimeout(_)) | Err(Error::Network(_))
        ));
    }
}
