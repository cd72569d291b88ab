//! Server configuration.
//!
//! Loaded from a YAML file; every section has a working default so a bare
//! `snare-server` with no config file starts all three listeners.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// HTTP capture listener (the surface scripts program against).
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Raw TCP capture listener.
    #[serde(default)]
    pub tcp: TcpCaptureConfig,

    /// Admin API listener.
    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    #[serde(default = "default_capture_addr")]
    pub addr: SocketAddr,
    /// Upper bound on captured request bodies, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            addr: default_capture_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TcpCaptureConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_tcp_addr")]
    pub addr: SocketAddr,
    /// Read buffer size per chunk.
    #[serde(default = "default_tcp_chunk_bytes")]
    pub chunk_bytes: usize,
}

impl Default for TcpCaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: default_tcp_addr(),
            chunk_bytes: default_tcp_chunk_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_addr")]
    pub addr: SocketAddr,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            addr: default_admin_addr(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Default tracing filter; `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_capture_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("valid default addr")
}

fn default_tcp_addr() -> SocketAddr {
    "0.0.0.0:9090".parse().expect("valid default addr")
}

fn default_admin_addr() -> SocketAddr {
    "127.0.0.1:4040".parse().expect("valid default addr")
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_tcp_chunk_bytes() -> usize {
    64 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let mut addrs = vec![self.capture.addr, self.admin.addr];
        if self.tcp.enabled {
            addrs.push(self.tcp.addr);
        }
        for (i, a) in addrs.iter().enumerate() {
            for b in &addrs[i + 1..] {
                if a == b {
                    anyhow::bail!(
                        "listener address {a} is used by more than one listener. \
                         Give 'capture.addr', 'tcp.addr', and 'admin.addr' distinct ports"
                    );
                }
            }
        }

        if self.capture.max_body_bytes == 0 {
            anyhow::bail!("'capture.max_body_bytes' must be greater than zero");
        }
        if self.tcp.enabled && self.tcp.chunk_bytes == 0 {
            anyhow::bail!("'tcp.chunk_bytes' must be greater than zero");
        }
        Ok(())
    }
}
