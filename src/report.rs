//! Whether a finished request is shipped to the platform, and what gets sent.

use crate::api::RequestLog;
use crate::classify::classify;
use crate::directory::RouteTarget;
use crate::error::ConfigError;
use crate::plugin::context::{CapturedRequest, InboundRequest, OutboundResponse, RequestContext};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStrategy {
    /// Never report
    Never,
    /// Report every request
    Always,
    /// Report requests that were routed to a proxy or marked for capture
    Proxied,
}

impl ReportStrategy {
    pub const ALL: [ReportStrategy; 3] = [Self::Never, Self::Always, Self::Proxied];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Always => "always",
            Self::Proxied => "proxied",
        }
    }
}

impl fmt::Display for ReportStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "reportStrategy must be one of never, always, proxied (got {s:?})"
                ))
            })
    }
}

/// Decide whether the request routed to `target` should be reported.
pub fn should_report(strategy: ReportStrategy, target: Option<&RouteTarget>) -> bool {
    match strategy {
        ReportStrategy::Never => false,
        ReportStrategy::Always => true,
        ReportStrategy::Proxied => match target {
            Some(RouteTarget::Alpha) => true,
            Some(target) => target.is_ip(),
            None => false,
        },
    }
}

/// Build the log for one finished exchange.
///
/// Captured sub-requests are renumbered from 1 and gain `resultCode`/`url`
/// copies of their status and path.
pub fn compose_request_log(
    context: &RequestContext,
    req: &InboundRequest,
    res: &OutboundResponse,
) -> RequestLog {
    let captured: Vec<CapturedRequest> = context
        .captured_requests
        .iter()
        .cloned()
        .map(|mut item| {
            item.sn += 1;
            item.result_code = item.status_code;
            item.url = Some(item.path.clone());
            item
        })
        .collect();

    let mut current = context.current_request.clone();
    current.result_code = current.status_code;
    current.url = Some(current.path.clone());

    let mut lines = context.log_lines.clone();
    lines.push(format!(
        "\r\nresponse {} {}",
        current
            .result_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "undefined".to_string()),
        pretty_headers(&res.headers)
    ));

    let category = classify(&req.headers, &res.headers, req.path());

    RequestLog {
        log_text: lines.join("\r\n"),
        log_json: json!({
            "curr": current,
            "ajax": captured,
            "category": category.as_str(),
        }),
        key: context.identity.clone(),
        ua: req.header("user-agent").map(str::to_string),
        userip: Some(context.client_ip.clone()),
        host: context.host.clone(),
        pathname: Some(req.url.clone()),
        status_code: context.result_code,
    }
}

/// Response headers as JSON with a four space indent. Repeated headers
/// become arrays.
fn pretty_headers(headers: &HeaderMap) -> String {
    let mut map = Map::new();
    for name in headers.keys() {
        let values: Vec<Value> = headers
            .get_all(name)
            .iter()
            .map(|value| Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();
        let value = match <[Value; 1]>::try_from(values) {
            Ok([single]) => single,
            Err(many) => Value::Array(many),
        };
        map.insert(name.as_str().to_string(), value);
    }

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    if Value::Object(map).serialize(&mut serializer).is_err() {
        return "{}".to_string();
    }
    String::from_utf8(out).unwrap_or_else(|_| "{}".to_string())
}
