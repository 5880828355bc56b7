use crate::error::{Result, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// Sends one JSON `POST` and returns the decoded JSON reply.
///
/// Implementations do not apply timeouts; the client races every call
/// against its own timer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value>;
}

/// Transport backed by a `reqwest` client.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client that ignores ambient proxy settings and, when given,
    /// sends everything through `forward_proxy`.
    pub fn new(forward_proxy: Option<&str>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().no_proxy();

        if let Some(proxy) = forward_proxy {
            debug!(proxy, "Routing open platform calls through forward proxy");
            let proxy =
                reqwest::Proxy::all(proxy).map_err(|e| TransportError::Proxy(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        // The platform reports errors in the JSON body, so any status with a
        // parseable body is handed back to the caller.
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(value),
            Err(_) if !status.is_success() => Err(TransportError::Status(status.as_u16()).into()),
            Err(e) => Err(TransportError::InvalidResponse(e.to_string()).into()),
        }
    }
}
