use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Resolver settings. Every field has a default so a config file only
/// needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Address of the nameserver resolution starts from.
    pub root_server: IpAddr,
    pub root_name: String,
    /// Port every nameserver is contacted on.
    pub port: u16,
    /// Sends per individual query before giving up on a server.
    pub max_attempts: u32,
    pub timeout_ms: u64,
    pub udp_payload: u16,
    /// Payload size advertised once a response comes back truncated.
    pub edns_payload: u16,
    /// Delegation hops per iterative lookup.
    pub max_hops: usize,
    /// CNAME links followed before giving up.
    pub max_indirection: i32,
    /// Local address the query socket binds to.
    pub bind: SocketAddr,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            root_server: IpAddr::V4(Ipv4Addr::new(198, 41, 0, 4)),
            root_name: "a.root-servers.net".to_string(),
            port: 53,
            max_attempts: 3,
            timeout_ms: 5000,
            udp_payload: 512,
            edns_payload: 1280,
            max_hops: 10,
            max_indirection: 10,
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        }
    }
}

impl ResolverConfig {
    /// Reads `path` if given, otherwise `dnslookup.toml` in the working
    /// directory if present, otherwise the defaults.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let config = if let Some(path) = path {
            Self::from_file(path)?
        } else if Path::new("dnslookup.toml").exists() {
            Self::from_file("dnslookup.toml")?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Validation("max_attempts cannot be 0".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Validation("timeout_ms cannot be 0".to_string()));
        }
        if self.udp_payload < 512 {
            return Err(ConfigError::Validation(format!(
                "udp_payload {} is below the 512 byte minimum",
                self.udp_payload
            )));
        }
        if self.edns_payload <= self.udp_payload {
            return Err(ConfigError::Validation(format!(
                "edns_payload {} must exceed udp_payload {}",
                self.edns_payload, self.udp_payload
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
