use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigurationError;
use crate::plugins::DEFAULT_PLUGINS;
use crate::traffic::{ModuleContext, DEFAULT_MODULES};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub metrics: MetricsConfig,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// What gets recorded and how it is reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Lowercase HTTP methods that are recorded
    pub valid_method_names: Vec<String>,
    pub only_errors: bool,
    /// Client addresses (single IPs or networks) that are never recorded
    pub ignore_ip: Vec<IpNet>,
    pub log_ip: bool,
    /// Stored instead of the client IP when `log_ip` is off
    pub ip_dummy: IpAddr,
    pub anonymous_ip: bool,
    pub log_user: bool,
    pub ignore_usernames: Vec<String>,
    /// Regexes matched against the path without its leading `/`
    pub ignore_paths: Vec<String>,
    pub ignore_user_agents: Vec<String>,
    pub traffic_modules: Vec<String>,
    pub plugins: Vec<String>,
    /// The site's own URL; referers starting with it are not unique visits
    pub base_url: String,
    pub hostname_lookup: bool,
    /// How long one request listing waits for its reverse lookups
    pub hostname_timeout_ms: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            valid_method_names: to_strings(DEFAULT_METHODS),
            only_errors: false,
            ignore_ip: Vec::new(),
            log_ip: true,
            ip_dummy: IpAddr::from([1, 1, 1, 1]),
            anonymous_ip: false,
            log_user: true,
            ignore_usernames: Vec::new(),
            ignore_paths: Vec::new(),
            ignore_user_agents: Vec::new(),
            traffic_modules: to_strings(DEFAULT_MODULES),
            plugins: to_strings(DEFAULT_PLUGINS),
            base_url: "http://127.0.0.1".to_string(),
            hostname_lookup: false,
            hostname_timeout_ms: 500,
        }
    }
}

impl MetricsConfig {
    pub fn module_context(&self) -> ModuleContext {
        ModuleContext::new(self.base_url.clone())
    }

    pub fn hostname_timeout(&self) -> Duration {
        Duration::from_millis(self.hostname_timeout_ms)
    }

    /// Read every `METRICS_*` setting through `lookup`, keeping the default
    /// for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            valid_method_names: list(&lookup, "METRICS_VALID_METHOD_NAMES")
                .map(|methods| methods.iter().map(|m| m.to_lowercase()).collect())
                .unwrap_or(defaults.valid_method_names),
            only_errors: flag(&lookup, "METRICS_ONLY_ERRORS", defaults.only_errors)?,
            ignore_ip: list(&lookup, "METRICS_IGNORE_IP")
                .map(|entries| parse_networks("METRICS_IGNORE_IP", &entries))
                .transpose()?
                .unwrap_or(defaults.ignore_ip),
            log_ip: flag(&lookup, "METRICS_LOG_IP", defaults.log_ip)?,
            ip_dummy: parsed(&lookup, "METRICS_IP_DUMMY", defaults.ip_dummy)?,
            anonymous_ip: flag(&lookup, "METRICS_ANONYMOUS_IP", defaults.anonymous_ip)?,
            log_user: flag(&lookup, "METRICS_LOG_USER", defaults.log_user)?,
            ignore_usernames: list(&lookup, "METRICS_IGNORE_USERNAME")
                .unwrap_or(defaults.ignore_usernames),
            ignore_paths: list(&lookup, "METRICS_IGNORE_PATHS").unwrap_or(defaults.ignore_paths),
            ignore_user_agents: list(&lookup, "METRICS_IGNORE_USER_AGENTS")
                .unwrap_or(defaults.ignore_user_agents),
            traffic_modules: list(&lookup, "METRICS_TRAFFIC_MODULES")
                .unwrap_or(defaults.traffic_modules),
            plugins: list(&lookup, "METRICS_PLUGINS").unwrap_or(defaults.plugins),
            base_url: lookup("METRICS_BASE_URL").unwrap_or(defaults.base_url),
            hostname_lookup: flag(&lookup, "METRICS_HOSTNAME_LOOKUP", defaults.hostname_lookup)?,
            hostname_timeout_ms: parsed(
                &lookup,
                "METRICS_HOSTNAME_TIMEOUT_MS",
                defaults.hostname_timeout_ms,
            )?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Use the socket address only
    #[default]
    None,
    /// Trust `Forwarded` / `X-Forwarded-For`
    Standard,
    /// Trust `CF-Connecting-IP`
    Cloudflare,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub mode: TrustedProxyMode,
    /// Number of proxies in front of the server; that many hops are skipped
    /// from the right of `X-Forwarded-For`
    pub num_trusted_proxies: Option<usize>,
    /// Proxy networks skipped from the right of `X-Forwarded-For`
    pub trusted_proxies: Vec<IpNet>,
}

impl ProxyConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode = match lookup("TRUSTED_PROXY_MODE") {
            None => TrustedProxyMode::None,
            Some(value) => match value.trim().to_lowercase().as_str() {
                "" | "none" => TrustedProxyMode::None,
                "standard" => TrustedProxyMode::Standard,
                "cloudflare" => TrustedProxyMode::Cloudflare,
                _ => return Err(invalid("TRUSTED_PROXY_MODE", &value)),
            },
        };

        let num_trusted_proxies = lookup("NUM_TRUSTED_PROXIES")
            .map(|value| {
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| invalid("NUM_TRUSTED_PROXIES", &value))
            })
            .transpose()?;

        let trusted_proxies = list(&lookup, "TRUSTED_PROXIES")
            .map(|entries| parse_networks("TRUSTED_PROXIES", &entries))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            mode,
            num_trusted_proxies,
            trusted_proxies,
        })
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://./hitcount.db".to_string());
        let max_connections = lookup("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "5".to_string())
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;

        let host = lookup("API_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = lookup("API_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse::<u16>()
            .context("API_PORT must be a valid port number")?;

        let metrics = MetricsConfig::from_lookup(&lookup).context("invalid metrics settings")?;
        let proxy = ProxyConfig::from_lookup(&lookup).context("invalid proxy settings")?;

        Ok(Config {
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            server: ServerConfig { host, port },
            metrics,
            proxy,
        })
    }
}

const DEFAULT_METHODS: &[&str] = &["get", "post", "put", "delete", "head", "options", "trace"];

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn invalid(key: &str, value: &str) -> ConfigurationError {
    ConfigurationError::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Comma separated list; blank entries are dropped. `None` when unset.
fn list<F>(lookup: &F, key: &str) -> Option<Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect()
    })
}

fn flag<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(invalid(key, &value)),
        },
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| invalid(key, &value)),
    }
}

/// Entries may be networks (`10.0.0.0/8`) or single addresses.
fn parse_networks(key: &str, entries: &[String]) -> Result<Vec<IpNet>, ConfigurationError> {
    entries
        .iter()
        .map(|entry| {
            entry
                .parse::<IpNet>()
                .or_else(|_| entry.parse::<IpAddr>().map(IpNet::from))
                .map_err(|_| invalid(key, entry))
        })
        .collect()
}
