use crate::api::{forward_proxy_from_env, OpenApiClient};
use crate::config::{self, PluginConfig};
use crate::error::Result;
use crate::plugin::net;
use tracing::{error, info, warn};

/// Validate the configuration and print what the plugin would run with.
/// With `probe` set, one sync call checks the credentials against the
/// platform.
pub async fn run_config_check(config: PluginConfig, probe: bool) -> Result<()> {
    info!("Checking configuration...");

    config::validate(&config)?;
    info!("✓ Configuration is valid");

    info!("  App id: {}", config.appid);
    info!("  API prefix: {}", config.api_prefix());
    info!("  Report strategy: {}", config.report_strategy);
    info!("  Log report path: {}", config.log_report_version.path());
    info!("  Request timeout: {} ms", config.request_timeout_ms);
    info!(
        "  Sync every {}s, publish every {}s",
        config.sync_interval_secs, config.publish_interval_secs
    );
    info!(
        "  Intranet address: {}",
        net::intranet_ip(config.intranet_ip.as_deref())
    );

    match forward_proxy_from_env(!config.http_domain, &config.api_domain) {
        Some(proxy) => info!("  Forward proxy: {}", proxy),
        None => info!("  Forward proxy: none"),
    }

    match &config.proxy_info {
        Some(entry) if entry.alpha_only => {
            info!("  Local entry: port {}, alpha only (not published)", entry.port)
        }
        Some(entry) => info!(
            "  Local entry: port {}, {} allow-listed identities",
            entry.port,
            entry.allow_list.len()
        ),
        None => warn!("  Local entry: none, this host will not be published"),
    }

    if probe {
        let client = OpenApiClient::new(&config)?;
        match client.sync_directory().await {
            Ok(assignments) => info!(
                "✓ Platform reachable, {} identities assigned",
                assignments.len()
            ),
            Err(e) => {
                error!("✗ Platform probe failed: {}", e);
                return Err(e);
            }
        }
    }

    Ok(())
}
