//! Agent configuration

use crate::error::{NetError, NetResult};
use crate::gateway_stack::MAX_CLIENT_APPS;
use crate::types::Technology;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/dcsnet/dcsnet.toml";

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Number of concurrent client backups to reserve room for
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// DHCP lease file path; `{interface}` is replaced by the interface name
    #[serde(default = "default_lease_file_template")]
    pub lease_file_template: String,
    /// Resolver configuration file
    #[serde(default = "default_resolv_conf")]
    pub resolv_conf: PathBuf,
    /// iproute2 binary
    #[serde(default = "default_ip_command")]
    pub ip_command: String,
    /// Statically known data channels
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

/// A statically configured data channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel name
    pub name: String,
    /// Bearer technology
    pub technology: Technology,
    /// Network interface the channel is bound to
    pub interface: String,
    /// Default IPv4 gateway reported by the modem (cellular only)
    #[serde(default)]
    pub gateway_v4: Option<Ipv4Addr>,
    /// Default IPv6 gateway reported by the modem (cellular only)
    #[serde(default)]
    pub gateway_v6: Option<Ipv6Addr>,
    /// IPv4 DNS servers reported by the modem (cellular only)
    #[serde(default)]
    pub dns_v4: Vec<Ipv4Addr>,
    /// IPv6 DNS servers reported by the modem (cellular only)
    #[serde(default)]
    pub dns_v6: Vec<Ipv6Addr>,
}

fn default_max_clients() -> usize {
    MAX_CLIENT_APPS
}

fn default_lease_file_template() -> String {
    "/var/lib/dhcp/dhclient.{interface}.leases".to_string()
}

fn default_resolv_conf() -> PathBuf {
    PathBuf::from("/etc/resolv.conf")
}

fn default_ip_command() -> String {
    "ip".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_clients: default_max_clients(),
            lease_file_template: default_lease_file_template(),
            resolv_conf: default_resolv_conf(),
            ip_command: default_ip_command(),
            channels: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from `path`, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> NetResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> NetResult<Self> {
        toml::from_str(content)
            .map_err(|e| NetError::Fault(format!("Invalid configuration: {}", e)))
    }
}
