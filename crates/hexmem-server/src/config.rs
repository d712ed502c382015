//! Environment-driven server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8990;

#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address.
    pub addr: SocketAddr,
    /// Database file; `None` uses the platform data directory.
    pub db_path: Option<PathBuf>,
    /// Development key granting read/write/admin with no agent scope.
    pub dev_key: Option<String>,
    /// Embedder selection: "local", "hash", or "none".
    pub embedder: String,
}

impl Config {
    pub fn from_env() -> Self {
        let host: IpAddr = std::env::var("HEXMEM_ADDR")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let port: u16 = std::env::var("HEXMEM_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Self {
            addr: SocketAddr::new(host, port),
            db_path: std::env::var("HEXMEM_DB").ok().map(PathBuf::from),
            dev_key: std::env::var("HEXMEM_DEV_KEY").ok().filter(|k| !k.is_empty()),
            embedder: std::env::var("HEXMEM_EMBEDDER").unwrap_or_else(|_| default_embedder()),
        }
    }
}

fn default_embedder() -> String {
    if cfg!(feature = "embeddings") {
        "local".to_string()
    } else {
        "hash".to_string()
    }
}
