//! HTTP transport seam.
//!
//! The orchestrator only needs "send this request, give me the status and a
//! stream of body bytes". Keeping that behind a trait lets tests script a
//! response without a network.

use crate::model::ModelError;
use crate::providers::HttpRequest;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::future::Future;

/// Body bytes as they arrive.
pub type ByteStream = BoxStream<'static, Result<Bytes, ModelError>>;

/// Status plus a body that has not been read yet.
pub struct StreamResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Sends a request and returns the streaming response.
pub trait Transport: Send + Sync + 'static {
    fn open(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<StreamResponse, ModelError>> + Send;
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    async fn open(&self, request: HttpRequest) -> Result<StreamResponse, ModelError> {
        let mut req = self.client.post(&request.url);
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let response = req
            .json(&request.body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = futures::stream::unfold(Some(response), |response| async move {
            let Some(mut response) = response else {
                return None;
            };
            match response.chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(response))),
                Ok(None) => None,
                Err(e) => Some((Err(ModelError::Network(e.to_string())), None)),
            }
        })
        .boxed();

        Ok(StreamResponse { status, body })
    }
}
