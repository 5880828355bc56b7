use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope every open platform endpoint replies with.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct SyncBody<'a> {
    pub appid: &'a str,
    pub now: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ListBody<'a> {
    pub appid: &'a str,
    pub now: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AllowAction {
    Add,
    Del,
}

#[derive(Debug, Serialize)]
pub(crate) struct SetBody<'a> {
    pub appid: &'a str,
    pub action: AllowAction,
    pub uin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub val: Option<&'a str>,
    pub now: i64,
}

/// Body of `/v{1,2}/log/report`. Both log fields carry sealed envelopes.
#[derive(Debug, Serialize)]
pub(crate) struct LogReportBody<'a> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub appid: &'a str,
    pub appkey: &'a str,
    pub now: i64,
    #[serde(rename = "logText")]
    pub log_text: String,
    #[serde(rename = "logJson")]
    pub log_json: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<&'a str>,
    pub mod_act: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ua: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userip: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pathname: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext_info: Option<&'a str>,
    #[serde(rename = "statusCode", skip_serializing_if = "Option::is_none")]
    pub status_code: Option<Value>,
    pub group: &'a str,
}

/// One captured request/response pair to ship to the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLog {
    /// Human readable capture, sealed before sending
    pub log_text: String,
    /// Structured capture, sealed before sending
    pub log_json: Value,
    /// Identity the request was attributed to
    pub key: Option<String>,
    pub ua: Option<String>,
    pub userip: Option<String>,
    pub host: Option<String>,
    pub pathname: Option<String>,
    pub status_code: Option<u16>,
}
