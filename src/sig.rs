//! Request signing for the open platform API.
//!
//! The signed string is `METHOD&encode(path)&encode(k1=v1&k2=v2...)` with the
//! parameters sorted ordinally, and the signature is
//! `base64(HMAC-SHA1(secret + "&", signed_string))`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha1::Sha1;

/// Body key that carries the signature and is never part of the signed string.
pub const SIGNATURE_KEY: &str = "sig";

type HmacSha1 = Hmac<Sha1>;

/// Compute the signature for a request.
///
/// Keys whose value is absent never reach this function: request bodies skip
/// `None` fields during serialization, which is how "undefined" values drop out.
pub fn sign(method: &str, path: &str, params: &Map<String, Value>, secret: &str) -> String {
    let signed = canonical_string(method, path, params);

    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = <HmacSha1 as Mac>::new_from_slice(format!("{secret}&").as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
    mac.update(signed.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Build the string that gets signed.
pub fn canonical_string(method: &str, path: &str, params: &Map<String, Value>) -> String {
    let mut parts = vec![method.to_string(), strict_encode(path)];

    let mut pairs: Vec<String> = params
        .iter()
        .filter(|(key, _)| key.as_str() != SIGNATURE_KEY)
        .map(|(key, value)| format!("{}={}", key, scalar_string(value)))
        .collect();
    pairs.sort();

    if !pairs.is_empty() {
        parts.push(strict_encode(&pairs.join("&")));
    }

    parts.join("&")
}

/// Percent-encode everything except ASCII letters, digits and `-_.`.
///
/// This is stricter than URI component encoding: `!*()'~` are escaped as well.
/// Escapes use uppercase hex.
pub fn strict_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 3);
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Render a JSON value the way it appears in the signed `key=value` list.
fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            // Integral floats render without a fractional part.
            (_, _, Some(f)) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{f:.0}"),
            _ => n.to_string(),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => scalar_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}
