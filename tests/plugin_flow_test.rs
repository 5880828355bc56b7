//! Drives the plugin through a fake platform the way a gateway would.

use async_trait::async_trait;
use http::{Method, StatusCode};
use open_platform_proxy::api::HttpTransport;
use open_platform_proxy::config::PluginConfig;
use open_platform_proxy::directory::{ProxyEntry, RouteTarget};
use open_platform_proxy::envelope;
use open_platform_proxy::error::Result;
use open_platform_proxy::plugin::{
    GatewayPlugin, InboundRequest, OpenPlatformPlugin, OutboundResponse, PluginOptions,
    RequestContext,
};
use open_platform_proxy::report::ReportStrategy;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Answers sync calls from a mutable assignment table and accepts everything
/// else.
#[derive(Default)]
struct FakePlatform {
    assignments: Mutex<Value>,
    reports: Mutex<Vec<Value>>,
    fail_sync: Mutex<bool>,
}

impl FakePlatform {
    fn assign(&self, value: Value) {
        *self.assignments.lock().unwrap() = value;
    }

    fn reports(&self) -> Vec<Value> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for FakePlatform {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        if url.ends_with("/v1/h5test/sync") {
            if *self.fail_sync.lock().unwrap() {
                return Ok(json!({"code": -1, "msg": "maintenance"}));
            }
            let data = self.assignments.lock().unwrap().clone();
            return Ok(json!({"code": 0, "msg": "ok", "data": data}));
        }
        if url.ends_with("/log/report") {
            self.reports.lock().unwrap().push(body.clone());
        }
        Ok(json!({"code": 0, "msg": "ok", "data": null}))
    }
}

fn plugin(platform: Arc<FakePlatform>, strategy: ReportStrategy) -> OpenPlatformPlugin {
    let mut config = PluginConfig::new("tsw1234", "secret", strategy);
    config.intranet_ip = Some("10.0.0.1".into());
    config.proxy_info = Some(ProxyEntry::with_port(8080).allow("shared").allow("tester"));

    let options = PluginOptions::new(config).identity_resolver(
        |req: &InboundRequest| -> anyhow::Result<Option<String>> {
            Ok(req.header("x-uin").map(str::to_string))
        },
    );
    OpenPlatformPlugin::with_transport(options, platform).unwrap()
}

fn request(uin: &str) -> InboundRequest {
    InboundRequest::new(Method::GET, "/api/data.json")
        .with_header("x-uin", uin)
        .with_header("user-agent", "integration")
        .with_remote_addr("10.8.8.8:40000".parse().unwrap())
}

#[tokio::test]
async fn test_remote_route_wins_over_local_allow_list() {
    let platform = Arc::new(FakePlatform::default());
    platform.assign(json!({"shared": "10.0.0.7:9000"}));
    let plugin = plugin(platform.clone(), ReportStrategy::Proxied);
    plugin.init().await.unwrap();

    let mut context = RequestContext::new();
    plugin.on_request_start(&request("shared"), &mut context);
    assert_eq!(
        context.target,
        Some(RouteTarget::Proxy {
            host: "10.0.0.7".into(),
            port: 9000
        })
    );

    let mut context = RequestContext::new();
    plugin.on_request_start(&request("tester"), &mut context);
    assert_eq!(context.target_host(), Some("alpha"));

    plugin.shutdown().await;
}

#[tokio::test]
async fn test_resync_replaces_remote_hosts() {
    let platform = Arc::new(FakePlatform::default());
    platform.assign(json!({"a": "10.0.0.2:80", "b": "10.0.0.3:80"}));
    let plugin = plugin(platform.clone(), ReportStrategy::Proxied);
    plugin.init().await.unwrap();

    platform.assign(json!({"c": "10.0.0.4:80"}));
    plugin.directory().sync_from_remote().await.unwrap();

    let table = plugin.directory().snapshot();
    let hosts: Vec<&str> = table.hosts().collect();
    assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.4"]);
    assert!(table.self_entry().unwrap().allow_list.contains("tester"));

    *platform.fail_sync.lock().unwrap() = true;
    assert!(plugin.directory().sync_from_remote().await.is_err());
    assert!(plugin.directory().snapshot().get("10.0.0.4").is_some());

    plugin.shutdown().await;
}

#[tokio::test]
async fn test_reported_log_is_sealed_and_categorised() {
    let platform = Arc::new(FakePlatform::default());
    let plugin = plugin(platform.clone(), ReportStrategy::Proxied);
    plugin.init().await.unwrap();

    let req = request("tester");
    let mut context = RequestContext::new();
    plugin.on_request_start(&req, &mut context);
    context.result_code = Some(200);
    context.log_lines.push("served from cache".into());

    let res = OutboundResponse::new(StatusCode::OK).with_header("content-type", "application/json");
    plugin.on_response_finish(&req, &res, &context).await;

    let reports = platform.reports();
    // self publish from init, then the request log
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["key"], "h5test");

    let log = &reports[1];
    assert_eq!(log["key"], "tester");
    assert_eq!(log["ua"], "integration");
    assert_eq!(log["userip"], "10.8.8.8");

    let text: String = envelope::decode("tsw1234", "secret", log["logText"].as_str().unwrap()).unwrap();
    assert!(text.starts_with("served from cache\r\n\r\nresponse "));
    let details: Value = envelope::decode("tsw1234", "secret", log["logJson"].as_str().unwrap()).unwrap();
    assert_eq!(details["category"], "XHR");

    plugin.shutdown().await;
}

#[tokio::test]
async fn test_never_strategy_sends_no_request_logs() {
    let platform = Arc::new(FakePlatform::default());
    let plugin = plugin(platform.clone(), ReportStrategy::Never);
    plugin.init().await.unwrap();

    let req = request("tester");
    let mut context = RequestContext::new();
    plugin.on_request_start(&req, &mut context);
    plugin
        .on_response_finish(&req, &OutboundResponse::new(StatusCode::OK), &context)
        .await;

    assert_eq!(platform.reports().len(), 1);
    plugin.shutdown().await;
}
