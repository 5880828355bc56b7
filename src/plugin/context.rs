//! Request-scoped values exchanged with the host gateway.
//!
//! The gateway owns one [`RequestContext`] per inbound request. The plugin
//! fills in identity and routing on request start and reads them back,
//! together with whatever the gateway captured, on response finish.

use crate::directory::RouteTarget;
use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::SocketAddr;
use uuid::Uuid;

/// The parts of an inbound request the plugin looks at.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Path and query as received
    pub url: String,
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
    pub local_addr: Option<SocketAddr>,
}

impl InboundRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            remote_addr: None,
            local_addr: None,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = value.parse() {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Path without the query string.
    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or_default()
    }
}

/// The response as it left the gateway.
#[derive(Debug, Clone)]
pub struct OutboundResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl OutboundResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = value.parse() {
            self.headers.append(name, value);
        }
        self
    }
}

/// One request captured by the gateway while serving the inbound request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedRequest {
    /// Capture sequence number as assigned by the gateway, starting at 0
    #[serde(rename = "SN", default)]
    pub sn: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Gateway specific capture fields, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-request state shared between the two gateway events.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    /// Who made the request, if the resolver could tell
    pub identity: Option<String>,
    /// Routing decision made at request start
    pub target: Option<RouteTarget>,
    pub client_ip: String,
    pub host: Option<String>,
    /// Final status code as seen by the gateway
    pub result_code: Option<u16>,
    /// Gateway log lines collected while serving the request
    pub log_lines: Vec<String>,
    pub current_request: CapturedRequest,
    pub captured_requests: Vec<CapturedRequest>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            identity: None,
            target: None,
            client_ip: String::new(),
            host: None,
            result_code: None,
            log_lines: Vec::new(),
            current_request: CapturedRequest::default(),
            captured_requests: Vec::new(),
        }
    }

    /// Routed host as the gateway sees it: an address, `"alpha"` or nothing.
    pub fn target_host(&self) -> Option<&str> {
        self.target.as_ref().map(RouteTarget::host)
    }

    pub fn target_port(&self) -> Option<u16> {
        self.target.as_ref().and_then(RouteTarget::port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_strips_query() {
        let req = InboundRequest::new(Method::GET, "/a/b.json?x=1");
        assert_eq!(req.path(), "/a/b.json");
    }

    #[test]
    fn test_captured_request_keeps_unknown_fields() {
        let captured: CapturedRequest = serde_json::from_value(json!({
            "SN": 2,
            "statusCode": 404,
            "path": "/missing",
            "method": "GET"
        }))
        .unwrap();
        assert_eq!(captured.sn, 2);
        assert_eq!(captured.status_code, Some(404));
        assert_eq!(captured.extra.get("method"), Some(&json!("GET")));

        let value = serde_json::to_value(&captured).unwrap();
        assert_eq!(value["SN"], 2);
        assert_eq!(value["method"], "GET");
        assert!(value.get("url").is_none());
    }

    #[test]
    fn test_target_accessors() {
        let mut context = RequestContext::new();
        assert_eq!(context.target_host(), None);

        context.target = Some(RouteTarget::Proxy {
            host: "10.0.0.2".into(),
            port: 8080,
        });
        assert_eq!(context.target_host(), Some("10.0.0.2"));
        assert_eq!(context.target_port(), Some(8080));

        context.target = Some(RouteTarget::Alpha);
        assert_eq!(context.target_host(), Some("alpha"));
        assert_eq!(context.target_port(), None);
    }
}
