//! Admin commands behind the `open-platform-proxy` binary.

mod check;

pub use check::run_config_check;

use crate::api::OpenApiClient;
use crate::config::PluginConfig;
use crate::directory::DirectoryManager;
use crate::envelope;
use crate::error::{OpenPlatformError, Result};
use crate::plugin::net;
use crate::sig;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run_sync(config: &PluginConfig) -> Result<()> {
    let client = OpenApiClient::new(config)?;
    let assignments = client.sync_directory().await?;
    info!("{} identities assigned to test environments", assignments.len());
    print_json(&serde_json::to_value(assignments)?)
}

pub async fn run_list_environments(config: &PluginConfig, group: Option<&str>) -> Result<()> {
    let client = OpenApiClient::new(config)?;
    print_json(&client.list_environments(group).await?)
}

pub async fn run_allow_add(config: &PluginConfig, identity: &str, value: &str) -> Result<()> {
    let client = OpenApiClient::new(config)?;
    client.set_allow_entry(identity, Some(value)).await?;
    info!("Allow-listed {} -> {}", identity, value);
    Ok(())
}

pub async fn run_allow_remove(config: &PluginConfig, identities: &[String]) -> Result<()> {
    let client = OpenApiClient::new(config)?;
    client.remove_allow_entries(identities).await?;
    info!("Removed {} identities from the allow list", identities.len());
    Ok(())
}

/// Publish this host once using the configured `proxyInfo`.
pub async fn run_publish(config: &PluginConfig) -> Result<()> {
    let client = Arc::new(OpenApiClient::new(config)?);
    let directory = DirectoryManager::new(net::intranet_ip(config.intranet_ip.as_deref()), client);
    directory.record_local_info(config.proxy_info.clone());

    if directory.publish_self().await? {
        info!("Published {}", directory.self_key());
    } else {
        info!("Nothing to publish: no proxyInfo configured or it is alpha only");
    }
    Ok(())
}

/// Print the signature for `params` (a JSON object) under the configured key.
pub fn run_sign(config: &PluginConfig, method: &str, path: &str, params: &str) -> Result<()> {
    let params: Map<String, Value> = match serde_json::from_str(params)? {
        Value::Object(map) => map,
        _ => {
            return Err(OpenPlatformError::InvalidRequest(
                "params must be a JSON object".into(),
            ))
        }
    };
    println!("{}", sig::canonical_string(method, path, &params));
    println!("{}", sig::sign(method, path, &params, &config.appkey));
    Ok(())
}

/// Open an envelope sealed for the configured app.
pub fn run_decode(config: &PluginConfig, text: &str) -> Result<()> {
    let value: Value = envelope::decode(&config.appid, &config.appkey, text.trim())?;
    print_json(&value)
}
