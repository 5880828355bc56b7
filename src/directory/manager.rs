use super::entry::{ProxyEntry, RouteTarget, ALPHA, DEFAULT_PORT};
use crate::api::OpenApiClient;
use crate::error::Result;
use crate::metrics::Metrics;
use arc_swap::ArcSwap;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, info};

/// Immutable view of all known hosts.
///
/// Writers never mutate a published `Directory`; they build a new one and swap
/// it in, so readers always see either the old or the new table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directory {
    self_key: String,
    entries: Vec<(String, ProxyEntry)>,
}

/// Hosts learned from one sync, in the order they were first seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteSnapshot {
    hosts: Vec<(String, RemoteHost)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteHost {
    pub port: u16,
    pub identities: Vec<String>,
}

impl RemoteSnapshot {
    /// Regroup `identity -> "host:port"` assignments by host.
    pub fn from_assignments(assignments: &BTreeMap<String, String>) -> Self {
        let mut snapshot = Self::default();
        for (identity, target) in assignments {
            let (host, port) = split_target(target);
            match snapshot.hosts.iter_mut().find(|(h, _)| *h == host) {
                Some((_, remote)) => remote.identities.push(identity.clone()),
                None => snapshot.hosts.push((
                    host,
                    RemoteHost {
                        port,
                        identities: vec![identity.clone()],
                    },
                )),
            }
        }
        snapshot
    }

    pub fn hosts(&self) -> impl Iterator<Item = (&str, &RemoteHost)> {
        self.hosts.iter().map(|(h, r)| (h.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// `"10.0.0.2:8080"` -> `("10.0.0.2", 8080)`; a value without a usable port
/// (such as `"alpha"`) gets the default port.
///
/// IPv6 hosts carry a port only in bracketed form (`"[fe80::1]:8080"`); a bare
/// `"fe80::1"` is a host with the default port.
fn split_target(target: &str) -> (String, u16) {
    if target.parse::<IpAddr>().is_ok() {
        return (target.to_string(), DEFAULT_PORT);
    }
    if let Ok(addr) = target.parse::<SocketAddr>() {
        return (addr.ip().to_string(), addr.port());
    }
    match target.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            (host.to_string(), port.trim().parse().unwrap_or(DEFAULT_PORT))
        }
        _ => (target.to_string(), DEFAULT_PORT),
    }
}

impl Directory {
    pub fn new(self_key: impl Into<String>) -> Self {
        Self {
            self_key: self_key.into(),
            entries: Vec::new(),
        }
    }

    pub fn self_key(&self) -> &str {
        &self.self_key
    }

    pub fn self_entry(&self) -> Option<&ProxyEntry> {
        self.get(&self.self_key)
    }

    pub fn get(&self, host: &str) -> Option<&ProxyEntry> {
        self.entries
            .iter()
            .find(|(h, _)| h == host)
            .map(|(_, entry)| entry)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(h, _)| h.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ProxyEntry)> {
        self.entries.iter().map(|(h, e)| (h.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of this table with the self entry installed or replaced.
    pub fn with_self_entry(&self, entry: ProxyEntry) -> Self {
        let mut next = self.clone();
        match next.entries.iter_mut().find(|(h, _)| *h == next.self_key) {
            Some((_, existing)) => *existing = entry,
            None => next.entries.push((next.self_key.clone(), entry)),
        }
        next
    }

    /// Copy of this table after a full resync.
    ///
    /// Every non-self host is dropped and replaced by the snapshot. When the
    /// snapshot also lists the self host, only its remote fields (port and
    /// remote allow list) are taken; local configuration is kept.
    pub fn with_remote_snapshot(&self, snapshot: &RemoteSnapshot) -> Self {
        let mut next = Self::new(self.self_key.clone());
        if let Some(entry) = self.self_entry() {
            next.entries.push((self.self_key.clone(), entry.clone()));
        }

        for (host, remote) in snapshot.hosts() {
            match next.entries.iter_mut().find(|(h, _)| h == host) {
                Some((_, existing)) => {
                    existing.port = remote.port;
                    existing.remote_allow_list = remote.identities.iter().cloned().collect();
                }
                None => next.entries.push((
                    host.to_string(),
                    ProxyEntry {
                        port: remote.port,
                        remote_allow_list: remote.identities.iter().cloned().collect(),
                        ..ProxyEntry::default()
                    },
                )),
            }
        }
        next
    }

    /// Decide where a request from `identity` goes.
    ///
    /// Remote assignments win; the local allow list only applies when no remote
    /// host with an IP address claimed the identity.
    pub fn resolve(&self, identity: &str) -> Option<RouteTarget> {
        let remote = self
            .entries
            .iter()
            .filter(|(host, _)| *host != self.self_key)
            .find(|(_, entry)| entry.remote_allow_list.contains(identity))
            .map(|(host, entry)| {
                if host == ALPHA {
                    RouteTarget::Alpha
                } else {
                    RouteTarget::Proxy {
                        host: host.clone(),
                        port: entry.port,
                    }
                }
            });

        if matches!(&remote, Some(target) if target.is_ip()) {
            return remote;
        }

        let local = self
            .self_entry()
            .map(|entry| entry.allow_list.contains(identity))
            .unwrap_or(false);

        if local {
            Some(RouteTarget::Alpha)
        } else {
            remote
        }
    }
}

/// Owns the live directory and keeps it in sync with the open platform.
pub struct DirectoryManager {
    table: ArcSwap<Directory>,
    api: Arc<OpenApiClient>,
    metrics: Option<Arc<Metrics>>,
}

impl DirectoryManager {
    pub fn new(self_key: impl Into<String>, api: Arc<OpenApiClient>) -> Self {
        Self {
            table: ArcSwap::from_pointee(Directory::new(self_key)),
            api,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn self_key(&self) -> String {
        self.table.load().self_key().to_string()
    }

    /// Current table. Cheap; holds no lock.
    pub fn snapshot(&self) -> Arc<Directory> {
        self.table.load_full()
    }

    pub fn record_local_info(&self, info: Option<ProxyEntry>) {
        let Some(info) = info else {
            debug!("No local proxy info provided");
            return;
        };
        self.table.rcu(|current| current.with_self_entry(info.clone()));
        self.observe_size();
    }

    /// Replace all remote hosts with `snapshot`.
    pub fn apply_remote(&self, snapshot: &RemoteSnapshot) {
        self.table
            .rcu(|current| current.with_remote_snapshot(snapshot));
        self.observe_size();
    }

    /// Pull the directory from the open platform. On failure the current table
    /// is left untouched and the error is returned for the caller to log.
    pub async fn sync_from_remote(&self) -> Result<usize> {
        let result = self.api.sync_directory().await;
        if let Some(metrics) = &self.metrics {
            metrics.record_sync(result.is_ok());
        }

        let assignments = result?;
        let snapshot = RemoteSnapshot::from_assignments(&assignments);
        self.apply_remote(&snapshot);

        info!(
            identities = assignments.len(),
            hosts = snapshot.len(),
            "Directory synced from open platform"
        );
        Ok(snapshot.len())
    }

    pub fn resolve_routing(&self, identity: &str) -> Option<RouteTarget> {
        self.table.load().resolve(identity)
    }

    pub fn should_publish_self(&self) -> bool {
        match self.table.load().self_entry() {
            Some(entry) => !entry.alpha_only,
            None => false,
        }
    }

    /// Payload advertising this host: `("ip:port", details)`.
    pub fn self_report(&self) -> Option<(String, Value)> {
        let table = self.table.load();
        let entry = table.self_entry()?;
        let ip = table.self_key();

        let mut details = Map::new();
        details.insert("ip".into(), json!(ip));
        details.insert("port".into(), json!(entry.port));
        details.insert(
            "time".into(),
            json!(chrono::Utc::now()
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string()),
        );
        details.insert("name".into(), json!(""));
        details.insert("group".into(), json!("unknown"));
        details.insert("desc".into(), json!(""));
        details.insert("order".into(), json!(0));
        details.insert("owner".into(), json!(""));

        if let Ok(Value::Object(local)) = serde_json::to_value(entry) {
            details.extend(local);
        }

        Some((format!("{ip}:{}", entry.port), Value::Object(details)))
    }

    /// Advertise this host as a proxy target. Returns `Ok(false)` when the
    /// host is not publishable.
    pub async fn publish_self(&self) -> Result<bool> {
        if !self.should_publish_self() {
            debug!("Self entry missing or alpha-only, not publishing");
            return Ok(false);
        }
        let Some((log_text, log_json)) = self.self_report() else {
            return Ok(false);
        };

        self.api
            .report_proxy_environment(&log_text, &log_json)
            .await?;
        info!(target = %log_text, "Published proxy environment");
        Ok(true)
    }

    fn observe_size(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.directory_hosts.set(self.table.load().len() as i64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginConfig;
    use crate::error::OpenPlatformError;
    use crate::report::ReportStrategy;
    use crate::test_utils::RecordingTransport;
    use serde_json::json;

    fn assignments(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn manager_with(transport: Arc<RecordingTransport>) -> DirectoryManager {
        let config = PluginConfig::new("appid", "appkey", ReportStrategy::Proxied);
        let api = OpenApiClient::with_transport(&config, transport).unwrap();
        DirectoryManager::new("10.0.0.1", Arc::new(api))
    }

    #[test]
    fn test_snapshot_groups_by_host() {
        let snapshot = RemoteSnapshot::from_assignments(&assignments(&[
            ("u1", "10.0.0.2:8080"),
            ("u2", "10.0.0.2:8080"),
            ("u3", "10.0.0.3:9000"),
            ("u4", "alpha"),
        ]));
        assert_eq!(snapshot.len(), 3);

        let hosts: Vec<_> = snapshot.hosts().collect();
        let (_, first) = hosts.iter().find(|(h, _)| *h == "10.0.0.2").unwrap();
        assert_eq!(first.port, 8080);
        assert_eq!(first.identities, vec!["u1".to_string(), "u2".to_string()]);

        let (_, alpha) = hosts.iter().find(|(h, _)| *h == "alpha").unwrap();
        assert_eq!(alpha.port, 80);
    }

    #[test]
    fn test_split_target_bad_port() {
        assert_eq!(split_target("10.0.0.2:abc"), ("10.0.0.2".to_string(), 80));
        assert_eq!(split_target("10.0.0.2:"), ("10.0.0.2".to_string(), 80));
    }

    #[test]
    fn test_split_target_ipv6() {
        assert_eq!(split_target("fe80::1"), ("fe80::1".to_string(), 80));
        assert_eq!(split_target("[fe80::1]:9000"), ("fe80::1".to_string(), 9000));
        assert_eq!(split_target("::ffff:10.0.0.2"), ("::ffff:10.0.0.2".to_string(), 80));
    }

    #[test]
    fn test_resync_replaces_remote_hosts_and_keeps_self() {
        let local = ProxyEntry::with_port(8000).allow("local-user");
        let directory = Directory::new("S").with_self_entry(local.clone());
        let stale = RemoteSnapshot::from_assignments(&assignments(&[("a", "X:1"), ("b", "Y:2")]));
        let directory = directory.with_remote_snapshot(&stale);
        assert_eq!(directory.hosts().collect::<Vec<_>>(), vec!["S", "X", "Y"]);

        let fresh = RemoteSnapshot::from_assignments(&assignments(&[("c", "Z:3")]));
        let directory = directory.with_remote_snapshot(&fresh);

        assert_eq!(directory.hosts().collect::<Vec<_>>(), vec!["S", "Z"]);
        assert_eq!(directory.self_entry(), Some(&local));
        assert!(directory.get("X").is_none());
        assert!(directory.get("Y").is_none());
    }

    #[test]
    fn test_resync_merges_remote_fields_into_self() {
        let mut local = ProxyEntry::with_port(8000).allow("local-user");
        local.alpha_only = true;
        let directory = Directory::new("10.0.0.1").with_self_entry(local);

        let snapshot =
            RemoteSnapshot::from_assignments(&assignments(&[("remote-user", "10.0.0.1:9000")]));
        let directory = directory.with_remote_snapshot(&snapshot);

        let entry = directory.self_entry().unwrap();
        assert_eq!(entry.port, 9000);
        assert!(entry.remote_allow_list.contains("remote-user"));
        assert!(entry.allow_list.contains("local-user"));
        assert!(entry.alpha_only);
    }

    #[test]
    fn test_resolve_remote_host_wins_over_local_list() {
        let directory = Directory::new("10.0.0.1")
            .with_self_entry(ProxyEntry::default().allow("u"))
            .with_remote_snapshot(&RemoteSnapshot::from_assignments(&assignments(&[(
                "u",
                "10.0.0.2:8080",
            )])));

        assert_eq!(
            directory.resolve("u"),
            Some(RouteTarget::Proxy {
                host: "10.0.0.2".into(),
                port: 8080
            })
        );
    }

    #[test]
    fn test_resolve_local_list_marks_alpha() {
        let directory =
            Directory::new("10.0.0.1").with_self_entry(ProxyEntry::default().allow("u"));
        assert_eq!(directory.resolve("u"), Some(RouteTarget::Alpha));
        assert_eq!(directory.resolve("someone-else"), None);
    }

    #[test]
    fn test_resolve_skips_self_host() {
        let directory = Directory::new("10.0.0.1")
            .with_self_entry(ProxyEntry::default())
            .with_remote_snapshot(&RemoteSnapshot::from_assignments(&assignments(&[(
                "u",
                "10.0.0.1:8080",
            )])));
        assert_eq!(directory.resolve("u"), None);
    }

    #[test]
    fn test_resolve_remote_alpha_assignment() {
        let directory = Directory::new("10.0.0.1").with_remote_snapshot(
            &RemoteSnapshot::from_assignments(&assignments(&[("u", "alpha")])),
        );
        assert_eq!(directory.resolve("u"), Some(RouteTarget::Alpha));
    }

    #[test]
    fn test_resolve_non_ip_remote_falls_back_to_local_list() {
        let directory = Directory::new("10.0.0.1")
            .with_self_entry(ProxyEntry::default().allow("u"))
            .with_remote_snapshot(&RemoteSnapshot::from_assignments(&assignments(&[(
                "u",
                "devbox:8080",
            )])));
        assert_eq!(directory.resolve("u"), Some(RouteTarget::Alpha));

        let without_local = Directory::new("10.0.0.1").with_remote_snapshot(
            &RemoteSnapshot::from_assignments(&assignments(&[("u", "devbox:8080")])),
        );
        assert_eq!(
            without_local.resolve("u"),
            Some(RouteTarget::Proxy {
                host: "devbox".into(),
                port: 8080
            })
        );
    }

    #[test]
    fn test_should_publish_self() {
        let manager = manager_with(Arc::new(RecordingTransport::new()));
        assert!(!manager.should_publish_self());

        manager.record_local_info(Some(ProxyEntry::default()));
        assert!(manager.should_publish_self());

        let mut alpha_only = ProxyEntry::default();
        alpha_only.alpha_only = true;
        manager.record_local_info(Some(alpha_only));
        assert!(!manager.should_publish_self());
    }

    #[test]
    fn test_record_local_info_none_keeps_state() {
        let manager = manager_with(Arc::new(RecordingTransport::new()));
        manager.record_local_info(None);
        assert!(manager.snapshot().is_empty());
    }

    #[test]
    fn test_self_report_defaults_and_overrides() {
        let manager = manager_with(Arc::new(RecordingTransport::new()));
        let mut entry = ProxyEntry::with_port(8080);
        entry.metadata.name = Some("feature-x".into());
        manager.record_local_info(Some(entry));

        let (text, details) = manager.self_report().unwrap();
        assert_eq!(text, "10.0.0.1:8080");
        assert_eq!(details["ip"], "10.0.0.1");
        assert_eq!(details["port"], 8080);
        assert_eq!(details["name"], "feature-x");
        assert_eq!(details["group"], "unknown");
        assert_eq!(details["order"], 0);
        assert!(details["time"].as_str().unwrap().ends_with("GMT"));
    }

    #[tokio::test]
    async fn test_sync_from_remote_installs_snapshot() {
        let transport = Arc::new(RecordingTransport::new());
        transport
            .push_response(json!({"code": 0, "msg": "ok", "data": {"u1": "10.0.0.2:8080"}}))
            .await;
        let manager = manager_with(transport.clone());
        manager.record_local_info(Some(ProxyEntry::default()));

        let hosts = manager.sync_from_remote().await.unwrap();
        assert_eq!(hosts, 1);
        assert_eq!(
            manager.resolve_routing("u1"),
            Some(RouteTarget::Proxy {
                host: "10.0.0.2".into(),
                port: 8080
            })
        );

        let calls = transport.calls().await;
        assert_eq!(calls.len(), 1);
        assert!(calls[0].url.ends_with("/v1/h5test/sync"));
    }

    #[tokio::test]
    async fn test_sync_failure_keeps_previous_directory() {
        let transport = Arc::new(RecordingTransport::new());
        transport
            .push_response(json!({"code": 0, "msg": "ok", "data": {"u1": "10.0.0.2:8080"}}))
            .await;
        transport
            .push_response(json!({"code": 500, "msg": "busy", "data": null}))
            .await;
        let manager = manager_with(transport);

        manager.sync_from_remote().await.unwrap();
        let before = manager.snapshot();

        let result = manager.sync_from_remote().await;
        assert!(matches!(result, Err(OpenPlatformError::Application { .. })));
        assert_eq!(*manager.snapshot(), *before);
    }

    #[tokio::test]
    async fn test_publish_self_skips_alpha_only() {
        let transport = Arc::new(RecordingTransport::new());
        let manager = manager_with(transport.clone());
        let mut entry = ProxyEntry::default();
        entry.alpha_only = true;
        manager.record_local_info(Some(entry));

        assert!(!manager.publish_self().await.unwrap());
        assert!(transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_publish_self_reports_environment() {
        let transport = Arc::new(RecordingTransport::new());
        transport
            .push_response(json!({"code": 0, "msg": "ok", "data": null}))
            .await;
        let manager = manager_with(transport.clone());
        manager.record_local_info(Some(ProxyEntry::with_port(8080)));

        assert!(manager.publish_self().await.unwrap());

        let calls = transport.calls().await;
        assert_eq!(calls.len(), 1);
        assert!(calls[0].url.ends_with("/v1/log/report"));
        assert_eq!(calls[0].body["key"], "h5test");
        assert_eq!(calls[0].body["type"], "alpha");
    }
}
