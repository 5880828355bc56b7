use super::schema::PluginConfig;
use crate::error::{ConfigError, Result};
use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use std::path::Path;

pub async fn load_from_env_or_file() -> Result<PluginConfig> {
    let config: PluginConfig = Figment::new()
        .merge(Toml::file("open-platform.toml"))
        .merge(Json::file("open-platform.json"))
        .merge(Yaml::file("open-platform.yaml"))
        .merge(Yaml::file("open-platform.yml"))
        // Override with environment variables (OPEN_PLATFORM_ prefix)
        .merge(env_provider())
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    finish(config)
}

pub async fn load_from_path<P: AsRef<Path>>(path: P) -> Result<PluginConfig> {
    let path = path.as_ref();

    let figment = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Figment::new().merge(Toml::file(path)),
        Some("json") => Figment::new().merge(Json::file(path)),
        Some("yaml") | Some("yml") => Figment::new().merge(Yaml::file(path)),
        _ => {
            return Err(ConfigError::Parse(
                "Unsupported config file format. Use .toml, .json, .yaml, or .yml".into(),
            )
            .into())
        }
    };

    let config: PluginConfig = figment
        .merge(env_provider())
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    finish(config)
}

fn env_provider() -> Env {
    // Keys are camelCase in files; map OPEN_PLATFORM_REQUEST_TIMEOUT_MS -> requestTimeoutMs.
    Env::prefixed("OPEN_PLATFORM_")
        .map(|key| camel_case(key.as_str()).into())
        .lowercase(false)
}

fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, part) in key.split('_').filter(|p| !p.is_empty()).enumerate() {
        let lower = part.to_ascii_lowercase();
        if i == 0 {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.push(first.to_ascii_uppercase());
                out.extend(chars);
            }
        }
    }
    out
}

fn finish(config: PluginConfig) -> Result<PluginConfig> {
    let config = apply_env_substitutions(config)?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &PluginConfig) -> Result<()> {
    if config.appid.trim().is_empty() {
        return Err(ConfigError::MissingField("appid".into()).into());
    }

    if config.appkey.trim().is_empty() {
        return Err(ConfigError::MissingField("appkey".into()).into());
    }

    if config.api_domain.is_empty() {
        return Err(ConfigError::Validation("apiDomain must not be empty".into()).into());
    }

    if config.request_timeout_ms == 0 {
        return Err(
            ConfigError::Validation("requestTimeoutMs must be greater than 0".into()).into(),
        );
    }

    if config.sync_interval_secs == 0 || config.publish_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "syncIntervalSecs and publishIntervalSecs must be greater than 0".into(),
        )
        .into());
    }

    if let Some(ip) = &config.intranet_ip {
        if ip.parse::<std::net::IpAddr>().is_err() {
            return Err(
                ConfigError::Validation(format!("intranetIp '{ip}' is not an IP address")).into(),
            );
        }
    }

    Ok(())
}

fn apply_env_substitutions(mut config: PluginConfig) -> Result<PluginConfig> {
    config.appid = substitute_env_vars(&config.appid)?;
    config.appkey = substitute_env_vars(&config.appkey)?;
    config.api_domain = substitute_env_vars(&config.api_domain)?;

    if let Some(ip) = &mut config.intranet_ip {
        *ip = substitute_env_vars(ip)?;
    }

    Ok(config)
}

fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => {
                result = result.replace(&cap[0], &value);
            }
            Err(_) => {
                // ${VAR:-default}
                if let Some((name, default)) = var_name.split_once(":-") {
                    match std::env::var(name) {
                        Ok(value) => result = result.replace(&cap[0], &value),
                        Err(_) => result = result.replace(&cap[0], default),
                    }
                } else {
                    return Err(ConfigError::EnvVar(format!(
                        "Environment variable '{}' not found",
                        var_name
                    ))
                    .into());
                }
            }
        }
    }

    Ok(result)
}
