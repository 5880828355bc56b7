use super::context::{InboundRequest, OutboundResponse, RequestContext};
use crate::directory::ProxyEntry;
use async_trait::async_trait;
use std::sync::Arc;

/// Works out who made a request.
///
/// An error is logged by the plugin and treated as "no identity".
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, req: &InboundRequest) -> anyhow::Result<Option<String>>;
}

impl<F> IdentityResolver for F
where
    F: Fn(&InboundRequest) -> anyhow::Result<Option<String>> + Send + Sync,
{
    fn resolve(&self, req: &InboundRequest) -> anyhow::Result<Option<String>> {
        self(req)
    }
}

/// Resolver used when none is configured.
pub struct NoIdentity;

impl IdentityResolver for NoIdentity {
    fn resolve(&self, _req: &InboundRequest) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

/// Supplies this host's own directory entry at startup.
#[async_trait]
pub trait LocalInfoProvider: Send + Sync {
    async fn local_info(&self) -> Option<ProxyEntry>;
}

/// Provider backed by a fixed entry, usually the `proxyInfo` config block.
pub struct StaticLocalInfo(pub Option<ProxyEntry>);

#[async_trait]
impl LocalInfoProvider for StaticLocalInfo {
    async fn local_info(&self) -> Option<ProxyEntry> {
        self.0.clone()
    }
}

pub type RequestStartHook = Arc<dyn Fn(&InboundRequest, &RequestContext) -> bool + Send + Sync>;
pub type ResponseFinishHook =
    Arc<dyn Fn(&InboundRequest, &OutboundResponse, &RequestContext) -> bool + Send + Sync>;

/// Caller callbacks run before the plugin handles each event. A hook that
/// returns `false` makes the plugin skip that event.
#[derive(Clone, Default)]
pub struct PluginHooks {
    pub request_start: Option<RequestStartHook>,
    pub response_finish: Option<ResponseFinishHook>,
}

impl PluginHooks {
    pub fn on_request_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(&InboundRequest, &RequestContext) -> bool + Send + Sync + 'static,
    {
        self.request_start = Some(Arc::new(hook));
        self
    }

    pub fn on_response_finish<F>(mut self, hook: F) -> Self
    where
        F: Fn(&InboundRequest, &OutboundResponse, &RequestContext) -> bool + Send + Sync + 'static,
    {
        self.response_finish = Some(Arc::new(hook));
        self
    }

    pub(crate) fn allow_request_start(&self, req: &InboundRequest, context: &RequestContext) -> bool {
        self.request_start
            .as_ref()
            .map_or(true, |hook| hook(req, context))
    }

    pub(crate) fn allow_response_finish(
        &self,
        req: &InboundRequest,
        res: &OutboundResponse,
        context: &RequestContext,
    ) -> bool {
        self.response_finish
            .as_ref()
            .map_or(true, |hook| hook(req, res, context))
    }
}

impl std::fmt::Debug for PluginHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHooks")
            .field("request_start", &self.request_start.is_some())
            .field("response_finish", &self.response_finish.is_some())
            .finish()
    }
}
