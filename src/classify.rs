//! Tags captured traffic with a coarse category for the platform's log view.

use http::header::CONTENT_TYPE;
use http::HeaderMap;
use std::fmt;

/// Category attached to a reported request log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficCategory {
    Html,
    WebSocket,
    Xhr,
    Js,
    Image,
    Font,
    Xml,
    /// Nothing matched
    Unknown,
}

impl TrafficCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::WebSocket => "websocket",
            Self::Xhr => "XHR",
            Self::Js => "js",
            Self::Image => "image",
            Self::Font => "font",
            Self::Xml => "xml",
            Self::Unknown => "",
        }
    }
}

impl fmt::Display for TrafficCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify one exchange. The first matching rule wins.
pub fn classify(request_headers: &HeaderMap, response_headers: &HeaderMap, path: &str) -> TrafficCategory {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let content_type = response_headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_ascii_lowercase());

    match content_type.as_deref() {
        None if path.is_empty() || path.ends_with('/') => return TrafficCategory::Html,
        Some(ct) if ct.starts_with("text/html") => return TrafficCategory::Html,
        Some("websocket") => return TrafficCategory::WebSocket,
        _ => {}
    }

    let requested_with = request_headers
        .get("x-requested-with")
        .and_then(|value| value.to_str().ok());
    if requested_with == Some("XMLHttpRequest") {
        return TrafficCategory::Xhr;
    }

    if let Some(ct) = content_type.as_deref() {
        if ct.starts_with("text/javascript") {
            return TrafficCategory::Js;
        }
        if ct.starts_with("image/") {
            return TrafficCategory::Image;
        }
    }

    let Some(extension) = extension(path) else {
        return TrafficCategory::Unknown;
    };

    match extension.as_str() {
        "json" | "cgi" | "fcg" | "php" => TrafficCategory::Xhr,
        "eot" | "svg" | "ttf" | "woff" => TrafficCategory::Font,
        "gif" => TrafficCategory::Image,
        "xml" => TrafficCategory::Xml,
        "map" | "js" => TrafficCategory::Js,
        _ => TrafficCategory::Unknown,
    }
}

/// Lowercased extension of the last path segment.
fn extension(path: &str) -> Option<String> {
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() && ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
