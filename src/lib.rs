pub mod api;
pub mod classify;
pub mod commands;
pub mod config;
pub mod directory;
pub mod envelope;
pub mod error;
pub mod metrics;
pub mod plugin;
pub mod report;
pub mod sig;

#[cfg(test)]
pub mod test_utils;

pub use error::{OpenPlatformError, Result};
pub use plugin::{GatewayPlugin, OpenPlatformPlugin, PluginOptions};
