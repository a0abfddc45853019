//! Bridge server configuration

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Bridge server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Address the HTTP/WebSocket listener binds to
    pub bind_host: IpAddr,

    /// HTTP/WebSocket listener port
    pub port: u16,

    /// Path of the SOCKS5 WebSocket endpoint
    pub ws_path: String,

    /// Optional raw TCP SOCKS5 listener, e.g. "127.0.0.1:1080"
    pub tcp_bind: Option<String>,

    /// Logging configuration
    pub log_level: String,

    /// Outbound connection settings
    pub connector: ConnectorConfig,

    /// Relay settings
    pub relay: RelayConfig,

    /// HTTP forwarding endpoints
    pub forward: ForwardConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Outbound connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Set TCP_NODELAY on outbound streams
    pub nodelay: bool,

    /// Map connect failures to distinct reply codes instead of
    /// always answering "connection refused"
    pub detailed_replies: bool,

    /// Connect timeout
    pub connect_timeout: Duration,
}

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Read buffer size for the socket side; one read becomes one frame
    pub buffer_size: usize,
}

/// HTTP forwarding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Expose /api/proxy and /api/universal-proxy
    pub enabled: bool,

    /// User-Agent sent when the caller supplies none
    pub user_agent: String,

    /// Upstream request timeout
    pub timeout: Duration,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Expose /metrics
    pub enabled: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
            ws_path: "/api/socks5".to_string(),
            tcp_bind: None,
            log_level: "info".to_string(),
            connector: ConnectorConfig::default(),
            relay: RelayConfig::default(),
            forward: ForwardConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            nodelay: true,
            detailed_replies: false,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_size: 16 * 1024,
        }
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(30),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"
                .to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl BridgeConfig {
    /// Get the HTTP/WebSocket bind address
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.port)
    }

    /// Get the raw TCP SOCKS5 bind address, if one is configured
    pub fn tcp_bind_address(&self) -> crate::Result<Option<SocketAddr>> {
        self.tcp_bind
            .as_deref()
            .map(|addr| {
                addr.parse().map_err(|e| {
                    crate::BridgeError::config(format!("Invalid TCP bind address: {}", e))
                })
            })
            .transpose()
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if !self.ws_path.starts_with('/') {
            return Err(crate::BridgeError::config(format!(
                "WebSocket path must start with '/': {}",
                self.ws_path
            )));
        }
        if self.relay.buffer_size == 0 {
            return Err(crate::BridgeError::config("Relay buffer size must be non-zero"));
        }
        if self.connector.connect_timeout.is_zero() {
            return Err(crate::BridgeError::config("Connect timeout must be non-zero"));
        }
        self.tcp_bind_address()?;
        Ok(())
    }

    /// Apply `PORT` and `BIND_HOST` from the environment
    pub fn apply_env(&mut self) -> crate::Result<()> {
        if let Ok(port) = std::env::var("PORT") {
            self.port = port
                .parse()
                .map_err(|e| crate::BridgeError::config(format!("Invalid PORT: {}", e)))?;
        }
        if let Ok(host) = std::env::var("BIND_HOST") {
            self.bind_host = host
                .parse()
                .map_err(|e| crate::BridgeError::config(format!("Invalid BIND_HOST: {}", e)))?;
        }
        Ok(())
    }

    /// Load configuration from file
    pub async fn load_from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        toml::from_str(&content)
            .map_err(|e| crate::BridgeError::config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content = self.to_toml()?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> crate::Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| crate::BridgeError::config(format!("Failed to serialize config: {}", e)))
    }
}
