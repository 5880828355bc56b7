use crate::directory::ProxyEntry;
use crate::report::ReportStrategy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    /// Application id issued by the open platform
    #[serde(default)]
    pub appid: String,
    /// Shared secret paired with `appid`
    #[serde(default)]
    pub appkey: String,
    /// Required; there is no implicit reporting policy
    pub report_strategy: ReportStrategy,
    /// Use plain http for the API domain
    #[serde(default)]
    pub http_domain: bool,
    #[serde(default = "default_api_domain")]
    pub api_domain: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_interval")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_interval")]
    pub publish_interval_secs: u64,
    #[serde(default)]
    pub log_report_version: LogReportVersion,
    /// Overrides the detected intranet address used as the self key
    #[serde(default)]
    pub intranet_ip: Option<String>,
    /// Static description of this host, used when no provider is installed
    #[serde(default)]
    pub proxy_info: Option<ProxyEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogReportVersion {
    #[default]
    V1,
    V2,
}

impl LogReportVersion {
    pub fn path(&self) -> &'static str {
        match self {
            Self::V1 => "/v1/log/report",
            Self::V2 => "/v2/log/report",
        }
    }
}

fn default_api_domain() -> String {
    "openapi.tswjs.org".to_string()
}

fn default_request_timeout() -> u64 {
    3000
}

fn default_interval() -> u64 {
    60
}

impl PluginConfig {
    /// Minimal configuration with defaults for everything but the credentials
    /// and the reporting policy.
    pub fn new(
        appid: impl Into<String>,
        appkey: impl Into<String>,
        report_strategy: ReportStrategy,
    ) -> Self {
        Self {
            appid: appid.into(),
            appkey: appkey.into(),
            report_strategy,
            http_domain: false,
            api_domain: default_api_domain(),
            request_timeout_ms: default_request_timeout(),
            sync_interval_secs: default_interval(),
            publish_interval_secs: default_interval(),
            log_report_version: LogReportVersion::default(),
            intranet_ip: None,
            proxy_info: None,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_secs)
    }

    pub fn api_prefix(&self) -> String {
        let scheme = if self.http_domain { "http" } else { "https" };
        format!("{scheme}://{}", self.api_domain)
    }
}
