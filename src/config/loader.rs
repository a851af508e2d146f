//! Configuration loader

use super::Config;
use crate::error::{ProxyError, Result};
use std::path::Path;

/// Load configuration from a YAML file
///
/// Also applies MYSQLPROXY_* env var overrides after loading.
pub fn load_config(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)?;
    load_config_from_str(&contents)
}

/// Load configuration from a YAML string (useful for testing)
///
/// Also applies MYSQLPROXY_* env var overrides after loading.
pub fn load_config_from_str(yaml: &str) -> Result<Config> {
    let mut config: Config = serde_yaml::from_str(yaml)?;
    resolve_config_env_vars(&mut config);
    apply_env_overrides(&mut config);
    config.validate().map_err(ProxyError::Config)?;
    Ok(config)
}

/// Apply MYSQLPROXY_* environment variable overrides to a config.
///
/// Any set env var overrides the corresponding config value.
///
/// Supported env vars:
/// - `MYSQLPROXY_LISTEN_ADDRESS` - Override listen address
/// - `MYSQLPROXY_UPSTREAM_ADDRESS` - Override upstream server address
/// - `MYSQLPROXY_CONNECT_TIMEOUT_MS` - Override upstream dial timeout
/// - `MYSQLPROXY_USER` - Override substituted username
/// - `MYSQLPROXY_PASSWORD` - Override substituted password
/// - `MYSQLPROXY_LOG_LEVEL` - Override log level
/// - `MYSQLPROXY_MAX_CONNECTIONS` - Override max connections
pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides_from(config, |name| std::env::var(name).ok());
}

fn apply_overrides_from<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("MYSQLPROXY_LISTEN_ADDRESS") {
        debug!("Overriding listen_address from MYSQLPROXY_LISTEN_ADDRESS");
        config.server.listen_address = val;
    }
    if let Some(val) = lookup("MYSQLPROXY_UPSTREAM_ADDRESS") {
        debug!("Overriding upstream address from MYSQLPROXY_UPSTREAM_ADDRESS");
        config.upstream.address = val;
    }
    if let Some(val) = lookup("MYSQLPROXY_CONNECT_TIMEOUT_MS") {
        if let Ok(ms) = val.parse::<u64>() {
            debug!("Overriding connect_timeout_ms from MYSQLPROXY_CONNECT_TIMEOUT_MS");
            config.upstream.connect_timeout_ms = ms;
        }
    }
    if let Some(val) = lookup("MYSQLPROXY_USER") {
        debug!("Overriding username from MYSQLPROXY_USER");
        config.credentials.get_or_insert_with(Default::default).username = val;
    }
    if let Some(val) = lookup("MYSQLPROXY_PASSWORD") {
        debug!("Overriding password from MYSQLPROXY_PASSWORD");
        config.credentials.get_or_insert_with(Default::default).password = val;
    }
    if let Some(val) = lookup("MYSQLPROXY_LOG_LEVEL") {
        debug!("Overriding log level from MYSQLPROXY_LOG_LEVEL");
        config.logging.level = val;
    }
    if let Some(val) = lookup("MYSQLPROXY_MAX_CONNECTIONS") {
        if let Ok(max) = val.parse::<usize>() {
            debug!("Overriding max_connections from MYSQLPROXY_MAX_CONNECTIONS");
            config.server.max_connections = max;
        }
    }
}

/// Resolve environment variables in a string value
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - curly brace syntax
/// - `$VAR_NAME` - simple syntax (for single variable values)
///
/// If the environment variable is not set, the original value is preserved.
fn resolve_env_var(value: &str) -> String {
    let var_name = if let Some(inner) = value.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
        inner
    } else if let Some(inner) = value.strip_prefix('$') {
        if inner.is_empty() || inner.contains(' ') {
            return value.to_string();
        }
        inner
    } else {
        return value.to_string();
    };

    match std::env::var(var_name) {
        Ok(env_value) => {
            debug!("Resolved env var {} from config", var_name);
            env_value
        }
        Err(_) => {
            debug!("Env var {} not set, keeping original value", var_name);
            value.to_string()
        }
    }
}

/// Resolve environment variables in all config fields that support it
fn resolve_config_env_vars(config: &mut Config) {
    if let Some(ref mut creds) = config.credentials {
        creds.username = resolve_env_var(&creds.username);
        creds.password = resolve_env_var(&creds.password);
    }

    config.server.listen_address = resolve_env_var(&config.server.listen_address);
    config.upstream.address = resolve_env_var(&config.upstream.address);
}
