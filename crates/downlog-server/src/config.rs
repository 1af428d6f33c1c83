//! Server configuration, read from command-line flags or their environment
//! variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use downlog_core::category::{
    self, DEFAULT_CATALINA_ROOT, DEFAULT_SCAN_ROOT, DEFAULT_TOMCAT_ROOT, DEFAULT_UNIVERSE_ROOT,
};
use downlog_core::CategoryTable;

use crate::error::{ServerError, ServerResult};

/// Default download limit in MiB.
pub const DEFAULT_LIMIT_MB: u64 = 500;

const MIB: u64 = 1024 * 1024;

/// downlog - stream host log files as zip archives.
#[derive(Parser, Debug, Clone)]
#[command(name = "downlog")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Listen address; a bare `:port` listens on all interfaces.
    #[arg(long, env = "DL_PORT", default_value = ":8080")]
    pub listen: String,

    /// Prefix placed before `/api` on every route.
    #[arg(long, env = "DL_URL_API_PREFIX", default_value = "")]
    pub api_prefix: String,

    /// Maximum total size of one download in MiB (0 disables the limit).
    #[arg(long, env = "UPT_LIMIT_DOWNLOAD_MB", default_value_t = DEFAULT_LIMIT_MB)]
    pub limit_mb: u64,

    /// Catalina log directory.
    #[arg(long, env = "DL_CATALINA_LOG", default_value = DEFAULT_CATALINA_ROOT)]
    pub catalina_log: PathBuf,

    /// Universe backend log directory.
    #[arg(long, env = "DL_UNIVERS_LOG", default_value = DEFAULT_UNIVERSE_ROOT)]
    pub univers_log: PathBuf,

    /// Tomcat log directory.
    #[arg(long, env = "DL_TOMCAT", default_value = DEFAULT_TOMCAT_ROOT)]
    pub tomcat_log: PathBuf,

    /// Scanner run log directory.
    #[arg(long, env = "DL_SCAN_LOG", default_value = DEFAULT_SCAN_ROOT)]
    pub scan_log: PathBuf,

    /// PEM certificate chain; enables TLS together with `--tls-key`.
    #[arg(long, env = "DL_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key; enables TLS together with `--tls-cert`.
    #[arg(long, env = "DL_TLS_KEY")]
    pub tls_key: Option<PathBuf>,
}

/// Certificate and key for the TLS listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// PEM certificate chain.
    pub cert_path: PathBuf,
    /// PEM private key.
    pub key_path: PathBuf,
}

/// Configuration for the log server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to.
    pub bind_addr: SocketAddr,
    /// Normalized route prefix (`""` or `/segment...`, no trailing slash).
    pub api_prefix: String,
    /// Maximum total size of one download, if limited.
    pub download_limit: Option<u64>,
    /// Log categories served.
    pub categories: CategoryTable,
    /// TLS material; plain HTTP when absent.
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            api_prefix: String::new(),
            download_limit: Some(DEFAULT_LIMIT_MB * MIB),
            categories: CategoryTable::standard(),
            tls: None,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with the specified bind address.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }

    /// Build the configuration from parsed arguments.
    pub fn from_cli(cli: &Cli) -> ServerResult<Self> {
        let bind_addr = parse_listen_addr(&cli.listen)?;
        let tls = match (&cli.tls_cert, &cli.tls_key) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: cert.clone(),
                key_path: key.clone(),
            }),
            (None, None) => None,
            (cert, key) => {
                return Err(ServerError::IncompleteTls {
                    cert: cert.clone(),
                    key: key.clone(),
                });
            }
        };

        let categories = CategoryTable::standard()
            .with_root(category::CATALINA, &cli.catalina_log)
            .with_root(category::UNIVERSE, &cli.univers_log)
            .with_root(category::ALL_TOMCAT, &cli.tomcat_log)
            .with_root(category::SCANNERS, &cli.scan_log);

        Ok(Self::new(bind_addr)
            .with_api_prefix(&cli.api_prefix)
            .with_download_limit_mb(cli.limit_mb)
            .with_categories(categories)
            .with_tls(tls))
    }

    /// Set the route prefix.
    #[must_use]
    pub fn with_api_prefix(mut self, prefix: &str) -> Self {
        self.api_prefix = normalize_prefix(prefix);
        self
    }

    /// Set the download limit in MiB; zero removes the limit.
    #[must_use]
    pub fn with_download_limit_mb(mut self, limit_mb: u64) -> Self {
        self.download_limit = (limit_mb > 0).then(|| limit_mb.saturating_mul(MIB));
        self
    }

    /// Set the download limit in bytes.
    #[must_use]
    pub fn with_download_limit(mut self, limit: Option<u64>) -> Self {
        self.download_limit = limit;
        self
    }

    /// Replace the category table.
    #[must_use]
    pub fn with_categories(mut self, categories: CategoryTable) -> Self {
        self.categories = categories;
        self
    }

    /// Set TLS material.
    #[must_use]
    pub fn with_tls(mut self, tls: Option<TlsConfig>) -> Self {
        self.tls = tls;
        self
    }

    /// Base path of the API routes, e.g. `/downlog/api`.
    pub fn api_base(&self) -> String {
        format!("{}/api", self.api_prefix)
    }
}

/// Parse `host:port`, or `:port` meaning all interfaces.
pub fn parse_listen_addr(listen: &str) -> ServerResult<SocketAddr> {
    let trimmed = listen.trim();
    let full = if trimmed.starts_with(':') {
        format!("0.0.0.0{trimmed}")
    } else {
        trimmed.to_string()
    };
    full.parse()
        .map_err(|e: std::net::AddrParseError| ServerError::InvalidListenAddr(listen.to_string(), e.to_string()))
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
