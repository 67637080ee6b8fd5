use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub haproxy: HaproxyConfig,
    pub discovery: DiscoveryConfig,
    pub logging: LoggingConfig,
}

/// Settings for the managed HAProxy process and its runtime socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HaproxyConfig {
    pub bin_path: String,
    /// Where the rendered configuration is written before HAProxy starts
    pub conf_path: PathBuf,
    /// Runtime API socket (`stats socket ... level admin`)
    pub admin_socket: PathBuf,
    pub enable_logs: bool,
    pub balance: String,
    pub http_check: String,
    pub bind: String,
    pub threads: u32,
    /// Number of backend slots in the `server-template`
    pub slots: usize,
    pub stats_bind: Option<String>,
    pub health_bind: Option<String>,
    pub maxconn: u32,
    #[serde(with = "duration_str")]
    pub timeout_connect: Duration,
    #[serde(with = "duration_str")]
    pub timeout_client: Duration,
    #[serde(with = "duration_str")]
    pub timeout_server: Duration,
    #[serde(with = "duration_str")]
    pub timeout_check: Duration,
    /// Delay between `help` checks while waiting for the runtime socket
    #[serde(with = "duration_str")]
    pub ready_poll_interval: Duration,
    /// Give up on the runtime socket after this long
    #[serde(with = "duration_str")]
    pub ready_timeout: Duration,
    /// Upper bound for a single runtime API transaction
    #[serde(with = "duration_str")]
    pub admin_timeout: Duration,
}

impl Default for HaproxyConfig {
    fn default() -> Self {
        Self {
            bin_path: "haproxy".to_string(),
            conf_path: PathBuf::from("/etc/haproxy.cfg"),
            admin_socket: PathBuf::from("/run/haproxy.sock"),
            enable_logs: false,
            balance: "uri".to_string(),
            http_check: "meth OPTIONS".to_string(),
            bind: "0.0.0.0:8888".to_string(),
            threads: 1,
            slots: 10,
            stats_bind: None,
            health_bind: None,
            maxconn: 500,
            timeout_connect: Duration::from_millis(100),
            timeout_client: Duration::from_secs(5),
            timeout_server: Duration::from_secs(5),
            timeout_check: Duration::from_millis(100),
            ready_poll_interval: Duration::from_millis(10),
            ready_timeout: Duration::from_secs(30),
            admin_timeout: Duration::from_secs(5),
        }
    }
}

/// Peer discovery method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMethod {
    /// SRV lookups against the nameservers in a resolv.conf file
    Dns,
    /// Publishes a single empty slot table and nothing else
    Noop,
}

impl DiscoveryMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dns => "dns",
            Self::Noop => "noop",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Required; there is no sensible default
    pub method: Option<DiscoveryMethod>,
    pub dns: DnsDiscoveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsDiscoveryConfig {
    #[serde(with = "duration_str")]
    pub refresh: Duration,
    /// SRV name to query; expanded with the resolv.conf search list
    pub name: String,
    pub resolv_conf: PathBuf,
    pub use_tcp: bool,
    pub port: u16,
    #[serde(with = "duration_str")]
    pub query_timeout: Duration,
}

impl Default for DnsDiscoveryConfig {
    fn default() -> Self {
        Self {
            refresh: Duration::from_secs(5),
            name: String::new(),
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
            use_tcp: true,
            port: 53,
            query_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path));
        }

        // SLOTSYNC_HAPROXY__SLOTS, SLOTSYNC_DISCOVERY__DNS__NAME, ...
        builder = builder.add_source(
            Environment::with_prefix("SLOTSYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Check the loaded values, collecting every problem instead of stopping at the first
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.haproxy.bin_path.is_empty() {
            errors.push("haproxy.bin_path must not be empty".to_string());
        }
        if self.haproxy.slots == 0 {
            errors.push("haproxy.slots must be at least 1".to_string());
        }
        if self.haproxy.threads == 0 {
            errors.push("haproxy.threads must be at least 1".to_string());
        }
        if self.haproxy.ready_poll_interval.is_zero() {
            errors.push("haproxy.ready_poll_interval must be greater than zero".to_string());
        }
        if self.haproxy.ready_timeout < self.haproxy.ready_poll_interval {
            errors.push(
                "haproxy.ready_timeout must not be shorter than haproxy.ready_poll_interval"
                    .to_string(),
            );
        }

        match self.discovery.method {
            None => errors.push("discovery.method is required (\"dns\" or \"noop\")".to_string()),
            Some(DiscoveryMethod::Dns) => {
                let dns = &self.discovery.dns;
                if dns.name.trim().is_empty() {
                    errors.push("discovery.dns.name is required for dns discovery".to_string());
                }
                if dns.refresh.is_zero() {
                    errors.push("discovery.dns.refresh must be greater than zero".to_string());
                }
                if dns.port == 0 {
                    errors.push("discovery.dns.port must not be 0".to_string());
                }
                if dns.query_timeout.is_zero() {
                    errors.push(
                        "discovery.dns.query_timeout must be greater than zero".to_string(),
                    );
                }
            }
            Some(DiscoveryMethod::Noop) => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Resolve the on-disk paths HAProxy is pointed at against the working directory
    pub fn absolutize_paths(&mut self) -> std::io::Result<()> {
        self.haproxy.conf_path = std::path::absolute(&self.haproxy.conf_path)?;
        self.haproxy.admin_socket = std::path::absolute(&self.haproxy.admin_socket)?;
        Ok(())
    }

    #[must_use]
    pub fn discovery_method(&self) -> Option<DiscoveryMethod> {
        self.discovery.method
    }
}

/// Durations written as humantime strings ("100ms", "5s", "1m 30s")
pub mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.trim()
            .parse::<humantime::Duration>()
            .map(Duration::from)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
    }
}
