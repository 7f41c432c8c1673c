// src/config/models.rs
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

/// Pool used when no configuration file is given on the command line.
pub const DEFAULT_BACKENDS: &[&str] = &[
    "http://localhost:8081",
    "http://localhost:8082",
    "http://localhost:8083",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one backend must be configured")]
    NoBackends,

    #[error("invalid backend address {addr:?}: {reason}")]
    InvalidBackend { addr: String, reason: String },

    #[error("backend {0} is configured more than once")]
    DuplicateBackend(String),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub url: Url,
}

/// Key used for lookups, logs and metric labels: `host:port`.
pub fn backend_id(url: &Url) -> String {
    format!(
        "{}:{}",
        url.host_str().unwrap_or("unknown"),
        url.port_or_known_default().unwrap_or(80)
    )
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Appended to each backend's base URL for the probe request.
    #[serde(default = "default_probe_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_admin_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
    #[serde(default = "default_status_path")]
    pub status_path: String,
}

impl Config {
    /// Build a configuration from bare backend addresses, everything else defaulted.
    pub fn from_urls<S: AsRef<str>>(urls: &[S]) -> Result<Self, ConfigError> {
        let backends = urls
            .iter()
            .map(|raw| {
                let raw = raw.as_ref();
                Url::parse(raw)
                    .map(|url| BackendConfig { url })
                    .map_err(|e| ConfigError::InvalidBackend {
                        addr: raw.to_string(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let config = Self {
            listen_addr: default_listen_addr(),
            backends,
            health_check: HealthCheckConfig::default(),
            proxy: ProxyConfig::default(),
            admin: AdminConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            let url = &backend.url;
            if url.scheme() != "http" {
                return Err(ConfigError::InvalidBackend {
                    addr: url.to_string(),
                    reason: format!("unsupported scheme {:?}", url.scheme()),
                });
            }
            if url.host_str().is_none() {
                return Err(ConfigError::InvalidBackend {
                    addr: url.to_string(),
                    reason: "missing host".to_string(),
                });
            }
            // Base paths do not count: one id per host:port.
            let id = backend_id(url);
            if !seen.insert(id.clone()) {
                return Err(ConfigError::DuplicateBackend(id));
            }
        }

        if self.health_check.interval_secs == 0 {
            return Err(ConfigError::ZeroDuration("health_check.interval_secs"));
        }
        if self.health_check.timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("health_check.timeout_secs"));
        }
        if self.proxy.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("proxy.request_timeout_secs"));
        }
        Ok(())
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            path: default_probe_path(),
        }
    }
}

impl ProxyConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_admin_port(),
            metrics_path: default_metrics_path(),
            status_path: default_status_path(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_interval_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    2
}

fn default_probe_path() -> String {
    "/".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_admin_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_status_path() -> String {
    "/status".to_string()
}
