//! Gateway plugin for the open platform.
//!
//! The plugin subscribes to two gateway events:
//!
//! - **request start**: resolve the caller's identity and decide whether the
//!   request goes to a test proxy, is captured locally (`alpha`), or neither
//! - **response finish**: apply the report strategy and ship the captured
//!   exchange to the platform
//!
//! Between requests two background tasks keep the proxy directory in sync
//! and advertise this host as a test environment.
//!
//! # Modules
//!
//! - `context`: request, response and per-request context values
//! - `hooks`: identity resolver, local info provider and caller hooks
//! - `scheduler`: fixed-interval background tasks with shutdown
//! - `net`: client and intranet address helpers

pub mod context;
pub mod hooks;
pub mod net;
pub mod scheduler;

pub use context::{CapturedRequest, InboundRequest, OutboundResponse, RequestContext};
pub use hooks::{IdentityResolver, LocalInfoProvider, NoIdentity, PluginHooks, StaticLocalInfo};
pub use scheduler::Scheduler;

use crate::api::{HttpTransport, OpenApiClient};
use crate::config::{self, PluginConfig};
use crate::directory::DirectoryManager;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::report::{compose_request_log, should_report};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const PLUGIN_NAME: &str = "OpenPlatformPlugin";

/// Subscription points a host gateway drives.
#[async_trait]
pub trait GatewayPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Load local state, talk to the platform once and start background work.
    async fn init(&self) -> Result<()>;

    fn on_request_start(&self, req: &InboundRequest, context: &mut RequestContext);

    /// Never fails; reporting problems are logged.
    ///
    /// Reporting waits on the platform for up to the configured request
    /// timeout. Gateways should not await this inline on the response path;
    /// move the request, response and context into a `tokio::spawn`ed task
    /// instead.
    async fn on_response_finish(
        &self,
        req: &InboundRequest,
        res: &OutboundResponse,
        context: &RequestContext,
    );

    async fn shutdown(&self);
}

/// Everything needed to build an [`OpenPlatformPlugin`].
pub struct PluginOptions {
    pub config: PluginConfig,
    pub identity_resolver: Arc<dyn IdentityResolver>,
    pub local_info: Arc<dyn LocalInfoProvider>,
    pub hooks: PluginHooks,
}

impl PluginOptions {
    /// Options with no identity resolver and the config's `proxyInfo` as the
    /// local entry.
    pub fn new(config: PluginConfig) -> Self {
        let local_info = Arc::new(StaticLocalInfo(config.proxy_info.clone()));
        Self {
            config,
            identity_resolver: Arc::new(NoIdentity),
            local_info,
            hooks: PluginHooks::default(),
        }
    }

    pub fn identity_resolver(mut self, resolver: impl IdentityResolver + 'static) -> Self {
        self.identity_resolver = Arc::new(resolver);
        self
    }

    pub fn local_info(mut self, provider: impl LocalInfoProvider + 'static) -> Self {
        self.local_info = Arc::new(provider);
        self
    }

    pub fn hooks(mut self, hooks: PluginHooks) -> Self {
        self.hooks = hooks;
        self
    }
}

pub struct OpenPlatformPlugin {
    config: PluginConfig,
    api: Arc<OpenApiClient>,
    directory: Arc<DirectoryManager>,
    identity_resolver: Arc<dyn IdentityResolver>,
    local_info: Arc<dyn LocalInfoProvider>,
    hooks: PluginHooks,
    scheduler: Scheduler,
    metrics: Arc<Metrics>,
}

impl OpenPlatformPlugin {
    /// Build the plugin over HTTP. Fails on invalid configuration.
    pub fn new(options: PluginOptions) -> Result<Self> {
        config::validate(&options.config)?;
        let api = OpenApiClient::new(&options.config)?;
        Ok(Self::assemble(options, api))
    }

    /// Build the plugin over a caller supplied transport.
    pub fn with_transport(options: PluginOptions, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        config::validate(&options.config)?;
        let api = OpenApiClient::with_transport(&options.config, transport)?;
        Ok(Self::assemble(options, api))
    }

    fn assemble(options: PluginOptions, api: OpenApiClient) -> Self {
        let metrics = Arc::new(Metrics::new());
        let api = Arc::new(api.with_metrics(metrics.clone()));
        let self_key = net::intranet_ip(options.config.intranet_ip.as_deref());
        info!(intranet_ip = %self_key, strategy = %options.config.report_strategy, "Open platform plugin created");

        let directory = Arc::new(
            DirectoryManager::new(self_key, api.clone()).with_metrics(metrics.clone()),
        );

        Self {
            config: options.config,
            api,
            directory,
            identity_resolver: options.identity_resolver,
            local_info: options.local_info,
            hooks: options.hooks,
            scheduler: Scheduler::new(),
            metrics,
        }
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn api(&self) -> &Arc<OpenApiClient> {
        &self.api
    }

    pub fn directory(&self) -> &Arc<DirectoryManager> {
        &self.directory
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    async fn publish_once(directory: &DirectoryManager) {
        if let Err(e) = directory.publish_self().await {
            warn!(error = %e, "Failed to publish proxy environment");
        }
    }

    async fn sync_once(directory: &DirectoryManager) {
        if let Err(e) = directory.sync_from_remote().await {
            warn!(error = %e, "Failed to sync proxy directory");
        }
    }

    fn resolve_identity(&self, req: &InboundRequest) -> Option<String> {
        match self.identity_resolver.resolve(req) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "Identity resolver failed");
                None
            }
        }
    }
}

#[async_trait]
impl GatewayPlugin for OpenPlatformPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    async fn init(&self) -> Result<()> {
        info!("Loading open platform plugin");

        self.directory
            .record_local_info(self.local_info.local_info().await);

        Self::publish_once(&self.directory).await;
        let directory = self.directory.clone();
        self.scheduler
            .every("publish-self", self.config.publish_interval(), move || {
                let directory = directory.clone();
                async move { Self::publish_once(&directory).await }
            })
            .await;

        Self::sync_once(&self.directory).await;
        let directory = self.directory.clone();
        self.scheduler
            .every("directory-sync", self.config.sync_interval(), move || {
                let directory = directory.clone();
                async move { Self::sync_once(&directory).await }
            })
            .await;

        info!("Open platform plugin loaded");
        Ok(())
    }

    fn on_request_start(&self, req: &InboundRequest, context: &mut RequestContext) {
        if !self.hooks.allow_request_start(req, context) {
            return;
        }

        context.client_ip = net::client_ip(req);
        if context.host.is_none() {
            context.host = req.header("host").map(str::to_string);
        }
        debug!(
            request_id = %context.request_id,
            method = %req.method,
            url = %req.url,
            remote = ?req.remote_addr,
            local = ?req.local_addr,
            client_ip = %context.client_ip,
            "Request start"
        );

        context.identity = self.resolve_identity(req);
        let Some(identity) = context.identity.clone() else {
            return;
        };

        context.target = self.directory.resolve_routing(&identity);
        if let Some(target) = &context.target {
            debug!(request_id = %context.request_id, %identity, target = target.host(), "Request routed");
        }
    }

    async fn on_response_finish(
        &self,
        req: &InboundRequest,
        res: &OutboundResponse,
        context: &RequestContext,
    ) {
        if !self.hooks.allow_response_finish(req, res, context) {
            return;
        }

        let strategy = self.config.report_strategy;
        if !should_report(strategy, context.target.as_ref()) {
            debug!(request_id = %context.request_id, %strategy, "Not reporting request");
            self.metrics.record_report_skipped();
            return;
        }

        let log = compose_request_log(context, req, res);
        match self.api.report_request_log(&log).await {
            Ok(_) => {
                debug!(request_id = %context.request_id, "Request log reported");
                self.metrics.record_report(true);
            }
            Err(e) => {
                warn!(request_id = %context.request_id, error = %e, "Failed to report request log");
                self.metrics.record_report(false);
            }
        }
    }

    async fn shutdown(&self) {
        info!("Stopping open platform plugin");
        self.scheduler.shutdown().await;
    }
}
