// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub arp: ArpConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    /// Use the first `X-Forwarded-For` entry as the client address.
    /// Only enable behind a reverse proxy that sets the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

impl LoggingConfig {
    /// Whether debug-level messages should be emitted
    pub fn is_debug(&self) -> bool {
        matches!(self.level.to_ascii_lowercase().as_str(), "debug" | "trace")
    }
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub max_connections: Option<u64>,
}

/// ARP lookup configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ArpConfig {
    /// Program used to query the ARP table
    pub program: String,
    pub timeout_ms: u64,
    /// Shown in place of the MAC when the lookup fails
    pub fallback: String,
}

/// Device registry configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RegistryConfig {
    /// Upper bound on stored devices; unbounded when unset
    #[serde(default)]
    pub max_entries: Option<usize>,
}
