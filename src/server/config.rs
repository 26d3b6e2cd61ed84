use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const DEFAULT_CONFIG_PATH: &str = "config/authgate.toml";

/// Process configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// gRPC listener settings.
    pub grpc: ListenerSettings,
    /// HTTP gateway settings.
    pub gateway: GatewaySettings,
    /// Metrics exporter configuration.
    pub metrics: MetricsSettings,
}

/// A host/port pair to listen on.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ListenerSettings {
    /// IP address to bind to.
    pub host: String,
    /// Port number to listen on.
    pub port: u16,
}

impl ListenerSettings {
    /// Converts host and port into a socket address.
    ///
    /// # Errors
    /// Returns [`Error::Config`] when `host` is not an IP address.
    pub fn addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|e| Error::Config(format!("invalid host '{}': {e}", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// HTTP gateway settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GatewaySettings {
    /// IP address to bind to.
    pub host: String,
    /// Port number to listen on.
    pub port: u16,
    /// gRPC endpoint the gateway dials. When empty, the gRPC listener's
    /// address is used with a loopback host.
    pub upstream: String,
    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
    /// Per-call deadline for the loopback call in milliseconds; 0 disables it.
    pub rpc_timeout_ms: u64,
}

impl GatewaySettings {
    /// Listener settings for the HTTP side.
    pub fn listener(&self) -> ListenerSettings {
        ListenerSettings {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// Metrics exporter settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetricsSettings {
    /// Whether the Prometheus exporter is started.
    pub enabled: bool,
    /// IP address for the exporter.
    pub host: String,
    /// Port for the exporter.
    pub port: u16,
}

impl MetricsSettings {
    /// Converts host and port into a socket address for the exporter.
    pub fn addr(&self) -> Result<SocketAddr> {
        ListenerSettings {
            host: self.host.clone(),
            port: self.port,
        }
        .addr()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc: ListenerSettings {
                host: "0.0.0.0".to_string(),
                port: 10000,
            },
            gateway: GatewaySettings {
                host: "0.0.0.0".to_string(),
                port: 9000,
                upstream: String::new(),
                max_body_bytes: 4 * 1024 * 1024,
                rpc_timeout_ms: 0,
            },
            metrics: MetricsSettings {
                enabled: false,
                host: "127.0.0.1".to_string(),
                port: 9090,
            },
        }
    }
}

impl ServerConfig {
    /// Builds the layered configuration source.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables prefixed with `AUTHGATE_`, nested with `__`
    ///    (e.g. `AUTHGATE_GATEWAY__PORT=8080`)
    /// 2. The TOML file at `config_path`, if it exists
    /// 3. Built-in defaults
    pub fn figment(config_path: &str) -> Figment {
        Figment::from(Serialized::defaults(ServerConfig::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("AUTHGATE_").split("__"))
    }

    /// Loads configuration from `.env`, the TOML file, and the environment.
    ///
    /// The TOML path comes from `AUTHGATE_CONFIG_PATH` and defaults to
    /// `./config/authgate.toml`. Missing files are skipped.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if a source is malformed.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("AUTHGATE_CONFIG_PATH")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        Ok(Self::figment(&config_path).extract()?)
    }

    /// Endpoint URI the gateway dials for its loopback connection.
    ///
    /// `grpc_addr` is the address the gRPC listener actually bound; a
    /// wildcard IP is replaced by the loopback address of the same family.
    /// A non-empty `gateway.upstream` wins.
    pub fn upstream_endpoint(&self, grpc_addr: SocketAddr) -> String {
        if !self.gateway.upstream.is_empty() {
            return self.gateway.upstream.clone();
        }

        let ip = match grpc_addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };

        format!("http://{}", SocketAddr::new(ip, grpc_addr.port()))
    }

    /// Checks that the configuration can be used to start both listeners.
    ///
    /// # Errors
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.grpc.addr()?;
        self.gateway.listener().addr()?;

        if self.grpc.port == 0 {
            return Err(Error::Config("grpc.port cannot be zero".to_string()));
        }

        if self.gateway.port == 0 {
            return Err(Error::Config("gateway.port cannot be zero".to_string()));
        }

        if self.grpc.port == self.gateway.port && self.grpc.host == self.gateway.host {
            return Err(Error::Config(
                "grpc and gateway listeners cannot share an address".to_string(),
            ));
        }

        if self.gateway.max_body_bytes == 0 {
            return Err(Error::Config(
                "gateway.max_body_bytes cannot be zero".to_string(),
            ));
        }

        if self.metrics.enabled {
            self.metrics.addr()?;
        }

        Ok(())
    }
}
