use super::proxy_env::forward_proxy_from_env;
use super::transport::{HttpTransport, ReqwestTransport};
use super::types::{
    AllowAction, ApiResponse, ListBody, LogReportBody, RequestLog, SetBody, SyncBody,
};
use crate::config::PluginConfig;
use crate::envelope;
use crate::error::{ConfigError, OpenPlatformError, Result, TransportError};
use crate::metrics::Metrics;
use crate::sig;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const SYNC_PATH: &str = "/v1/h5test/sync";
pub const LIST_PATH: &str = "/v1/h5test/list";
pub const SET_PATH: &str = "/openapi/h5test/set";

/// Signed client for the open platform API.
pub struct OpenApiClient {
    appid: String,
    appkey: String,
    prefix: String,
    log_report_path: &'static str,
    timeout: Duration,
    transport: Arc<dyn HttpTransport>,
    metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for OpenApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenApiClient")
            .field("appid", &self.appid)
            .field("prefix", &self.prefix)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OpenApiClient {
    /// Client over HTTP, honouring the environment's forward proxy settings.
    pub fn new(config: &PluginConfig) -> Result<Self> {
        check_credentials(config)?;
        let proxy = forward_proxy_from_env(!config.http_domain, &config.api_domain);
        let transport = ReqwestTransport::new(proxy.as_deref())?;
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(config: &PluginConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        check_credentials(config)?;
        Ok(Self {
            appid: config.appid.clone(),
            appkey: config.appkey.clone(),
            prefix: config.api_prefix(),
            log_report_path: config.log_report_version.path(),
            timeout: config.request_timeout(),
            transport,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn appid(&self) -> &str {
        &self.appid
    }

    /// Current `identity -> "host:port"` assignments.
    pub async fn sync_directory(&self) -> Result<BTreeMap<String, String>> {
        let body = SyncBody {
            appid: &self.appid,
            now: now_millis(),
        };
        let data = self.call(SYNC_PATH, &body).await?;
        if data.is_null() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_value(data).map_err(|e| {
            TransportError::InvalidResponse(format!("sync data is not a string map: {e}")).into()
        })
    }

    /// Test environments, optionally restricted to one group.
    pub async fn list_environments(&self, group: Option<&str>) -> Result<Value> {
        let body = ListBody {
            appid: &self.appid,
            now: now_millis(),
            group: group.filter(|g| !g.is_empty()),
        };
        self.call(LIST_PATH, &body).await
    }

    /// Allow-list `identity`. `value` is an environment (`"ip:port"`) or
    /// `"alpha"` for capture only.
    pub async fn set_allow_entry(&self, identity: &str, value: Option<&str>) -> Result<Value> {
        let body = SetBody {
            appid: &self.appid,
            action: AllowAction::Add,
            uin: identity.to_string(),
            val: value,
            now: now_millis(),
        };
        self.call(SET_PATH, &body).await
    }

    pub async fn remove_allow_entries(&self, identities: &[String]) -> Result<Value> {
        let body = SetBody {
            appid: &self.appid,
            action: AllowAction::Del,
            uin: identities.join(","),
            val: None,
            now: now_millis(),
        };
        self.call(SET_PATH, &body).await
    }

    /// Advertise this host as a test environment.
    pub async fn report_proxy_environment(&self, log_text: &str, log_json: &Value) -> Result<Value> {
        if log_text.is_empty() {
            return Err(OpenPlatformError::InvalidRequest("logText must not be empty".into()));
        }
        if is_empty_json(log_json) {
            return Err(OpenPlatformError::InvalidRequest("logJson must not be empty".into()));
        }

        let body = LogReportBody {
            kind: "alpha",
            appid: &self.appid,
            appkey: &self.appkey,
            now: now_millis(),
            log_text: envelope::encode(&self.appid, &self.appkey, log_text)?,
            log_json: envelope::encode(&self.appid, &self.appkey, log_json)?,
            key: Some("h5test"),
            mod_act: "h5test",
            ua: Some(""),
            userip: Some(""),
            host: Some(""),
            pathname: Some(""),
            ext_info: None,
            status_code: Some(json!("")),
            group: "tsw",
        };
        self.call(self.log_report_path, &body).await
    }

    /// Ship one captured request.
    pub async fn report_request_log(&self, log: &RequestLog) -> Result<Value> {
        let body = LogReportBody {
            kind: "alpha",
            appid: &self.appid,
            appkey: &self.appkey,
            now: now_millis(),
            log_text: envelope::encode(&self.appid, &self.appkey, &log.log_text)?,
            log_json: envelope::encode(&self.appid, &self.appkey, &log.log_json)?,
            key: log.key.as_deref(),
            mod_act: "",
            ua: log.ua.as_deref(),
            userip: log.userip.as_deref(),
            host: log.host.as_deref(),
            pathname: log.pathname.as_deref(),
            ext_info: Some(""),
            status_code: log.status_code.map(Value::from),
            group: "",
        };
        self.call(self.log_report_path, &body).await
    }

    /// Sign `body`, post it and unwrap the `{code, msg, data}` reply.
    async fn call<B: Serialize>(&self, path: &str, body: &B) -> Result<Value> {
        let url = format!("{}{}", self.prefix, path);
        let signed_path = url::Url::parse(&url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| path.to_string());

        let mut params = match serde_json::to_value(body)? {
            Value::Object(map) => map,
            _ => {
                return Err(OpenPlatformError::InvalidRequest(
                    "request body must be a JSON object".into(),
                ))
            }
        };
        let signature = sig::sign("POST", &signed_path, &params, &self.appkey);
        params.insert(sig::SIGNATURE_KEY.into(), Value::String(signature));
        let payload = Value::Object(params);

        debug!(url = %url, "Calling open platform");
        let started = Instant::now();

        // Dropping the transport future on timeout abandons the request; a late
        // reply is never observed.
        let outcome = match tokio::time::timeout(self.timeout, self.transport.post_json(&url, &payload)).await {
            Ok(result) => result,
            Err(_) => Err(OpenPlatformError::Timeout(self.timeout.as_millis() as u64)),
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_api_call(path, started.elapsed(), &outcome);
        }

        let reply = outcome.map_err(|e| {
            warn!(url = %url, error = %e, "Open platform call failed");
            e
        })?;

        let response: ApiResponse = serde_json::from_value(reply)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        if response.code != 0 {
            return Err(OpenPlatformError::Application {
                code: response.code,
                msg: response.msg,
            });
        }

        Ok(response.data)
    }
}

fn check_credentials(config: &PluginConfig) -> Result<()> {
    if config.appid.is_empty() {
        return Err(ConfigError::MissingField("appid".into()).into());
    }
    if config.appkey.is_empty() {
        return Err(ConfigError::MissingField("appkey".into()).into());
    }
    Ok(())
}

fn is_empty_json(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
