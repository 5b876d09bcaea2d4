//! The HTTP boundary between the provider client and the network
use crate::error::TransportError;
use crate::signer::SignedRequest;
use async_trait::async_trait;
use std::time::Duration;

/// Sends a signed request and returns the raw response body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &SignedRequest) -> Result<String, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self { client })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &SignedRequest) -> Result<String, TransportError> {
        let mut builder = self.client.post(request.url()).body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        let body = response.text().await.map_err(classify)?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}
