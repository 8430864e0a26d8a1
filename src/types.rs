//! Common types shared by the agent and its collaborators

use crate::error::{NetError, NetResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Maximum length of a kernel interface name (IFNAMSIZ minus the terminator)
pub const INTERFACE_NAME_MAX_LEN: usize = 15;

/// Maximum number of default gateway addresses per address family
pub const MAX_DEFAULT_GW_ADDRESSES_PER_FAMILY: usize = 1;

/// Maximum number of DNS server addresses per address family
pub const MAX_DNS_ADDRESSES_PER_FAMILY: usize = 2;

/// Opaque handle of a connected client session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionRef(pub u64);

impl fmt::Display for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Calling client; `None` stands for the hosting service itself
pub type ClientSession = Option<SessionRef>;

/// Format a client session for log output
pub fn session_label(session: ClientSession) -> String {
    match session {
        Some(s) => s.to_string(),
        None => "(internal)".to_string(),
    }
}

/// Opaque handle of a data channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef(pub u64);

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Opaque technology-specific reference of a channel (e.g. a modem profile)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TechRef(pub u64);

/// Bearer technology of a data channel
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Technology {
    /// Technology not known
    Unknown = 0,
    /// Cellular modem; addresses come from the modem
    Cellular = 1,
    /// WiFi station
    Wifi = 2,
    /// Wired ethernet
    Ethernet = 3,
}

impl Technology {
    /// Whether configuration operations may be applied to channels of this technology
    pub fn is_supported(self) -> bool {
        !matches!(self, Technology::Unknown)
    }

    pub fn name(self) -> &'static str {
        match self {
            Technology::Unknown => "unknown",
            Technology::Cellular => "cellular",
            Technology::Wifi => "wifi",
            Technology::Ethernet => "ethernet",
        }
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Channel record as held by the channel registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Channel name
    pub name: String,
    /// Bearer technology
    pub technology: Technology,
    /// Technology-specific reference
    pub tech_ref: TechRef,
}

/// Validated network interface name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterfaceName(String);

impl InterfaceName {
    pub fn new(name: impl Into<String>) -> NetResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(NetError::BadParameter(
                "Interface name cannot be empty".to_string(),
            ));
        }
        if name.len() > INTERFACE_NAME_MAX_LEN {
            return Err(NetError::BadParameter(format!(
                "Interface name too long: {}",
                name
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(NetError::BadParameter(format!(
                "Interface name contains invalid characters: {}",
                name
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for InterfaceName {
    type Error = NetError;

    fn try_from(value: String) -> NetResult<Self> {
        Self::new(value)
    }
}

impl From<InterfaceName> for String {
    fn from(name: InterfaceName) -> String {
        name.0
    }
}

/// A gateway address together with the interface it is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayBinding<A> {
    pub address: A,
    pub interface: InterfaceName,
}

/// Default gateway addresses assigned to a channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayAddresses {
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
}

impl GatewayAddresses {
    pub fn is_empty(&self) -> bool {
        self.ipv4.is_none() && self.ipv6.is_none()
    }
}

/// DNS server addresses assigned to a channel, at most two per family
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsServerAddresses {
    pub ipv4: Vec<Ipv4Addr>,
    pub ipv6: Vec<Ipv6Addr>,
}

impl DnsServerAddresses {
    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty() && self.ipv6.is_empty()
    }
}

/// Addresses of one kind assigned to a channel, split per family
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSet {
    pub ipv4: Vec<Ipv4Addr>,
    pub ipv6: Vec<Ipv6Addr>,
}

impl AddressSet {
    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty() && self.ipv6.is_empty()
    }
}

impl From<AddressSet> for GatewayAddresses {
    fn from(addrs: AddressSet) -> Self {
        GatewayAddresses {
            ipv4: addrs.ipv4.first().copied(),
            ipv6: addrs.ipv6.first().copied(),
        }
    }
}

impl From<GatewayAddresses> for AddressSet {
    fn from(addrs: GatewayAddresses) -> Self {
        AddressSet {
            ipv4: addrs.ipv4.into_iter().collect(),
            ipv6: addrs.ipv6.into_iter().collect(),
        }
    }
}

impl From<AddressSet> for DnsServerAddresses {
    fn from(addrs: AddressSet) -> Self {
        DnsServerAddresses {
            ipv4: addrs.ipv4.into_iter().take(MAX_DNS_ADDRESSES_PER_FAMILY).collect(),
            ipv6: addrs.ipv6.into_iter().take(MAX_DNS_ADDRESSES_PER_FAMILY).collect(),
        }
    }
}

impl From<DnsServerAddresses> for AddressSet {
    fn from(addrs: DnsServerAddresses) -> Self {
        AddressSet {
            ipv4: addrs.ipv4,
            ipv6: addrs.ipv6,
        }
    }
}

/// Kind of address looked up for a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// Default gateway address(es)
    DefaultGateway,
    /// DNS server address(es)
    DnsServer,
}

impl AddressKind {
    /// Key of the matching option in a DHCP lease file
    pub fn lease_option(self) -> &'static str {
        match self {
            AddressKind::DefaultGateway => "routers",
            AddressKind::DnsServer => "domain-name-servers",
        }
    }

    pub fn max_per_family(self) -> usize {
        match self {
            AddressKind::DefaultGateway => MAX_DEFAULT_GW_ADDRESSES_PER_FAMILY,
            AddressKind::DnsServer => MAX_DNS_ADDRESSES_PER_FAMILY,
        }
    }
}

/// Route table change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteAction {
    Add,
    Delete,
}

impl RouteAction {
    pub fn from_add(is_add: bool) -> Self {
        if is_add {
            RouteAction::Add
        } else {
            RouteAction::Delete
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RouteAction::Add => "add",
            RouteAction::Delete => "delete",
        }
    }
}

impl fmt::Display for RouteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_name_validation() {
        assert!(InterfaceName::new("rmnet_data0").is_ok());
        assert!(InterfaceName::new("eth0.100").is_ok());
        assert!(InterfaceName::new("").is_err());
        assert!(InterfaceName::new("a-very-long-interface").is_err());
        assert!(InterfaceName::new("eth0; rm").is_err());
    }

    #[test]
    fn test_technology_support() {
        assert!(!Technology::Unknown.is_supported());
        assert!(Technology::Cellular.is_supported());
        assert_eq!(Technology::Wifi.to_string(), "wifi");
    }

    #[test]
    fn test_address_kind_limits() {
        assert_eq!(AddressKind::DefaultGateway.lease_option(), "routers");
        assert_eq!(AddressKind::DefaultGateway.max_per_family(), 1);
        assert_eq!(AddressKind::DnsServer.lease_option(), "domain-name-servers");
        assert_eq!(AddressKind::DnsServer.max_per_family(), 2);
    }
}
