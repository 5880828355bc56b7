use crate::api::HttpTransport;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;

/// One request seen by a [`RecordingTransport`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub body: Value,
}

/// Transport that records every call and replays queued replies.
///
/// With nothing queued it answers `{"code": 0}` with null data.
pub struct RecordingTransport {
    calls: Mutex<Vec<RecordedCall>>,
    responses: Mutex<VecDeque<Result<Value>>>,
    delay: Option<Duration>,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            delay: None,
        }
    }

    /// Hold every reply for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn push_response(&self, response: Value) {
        self.responses.lock().await.push_back(Ok(response));
    }

    pub async fn push_error(&self, error: crate::error::OpenPlatformError) {
        self.responses.lock().await.push_back(Err(error));
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        self.calls.lock().await.push(RecordedCall {
            url: url.to_string(),
            body: body.clone(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(json!({"code": 0, "msg": "", "data": null})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_transport_answers_success() {
        let transport = RecordingTransport::default();
        let reply = transport.post_json("http://host/p", &json!({"a": 1})).await.unwrap();
        assert_eq!(reply["code"], 0);
        assert!(reply["data"].is_null());

        let calls = transport.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].body["a"], 1);
    }
}
