//! Platform adapter
//!
//! The OS-facing side of the agent: it programs the kernel routing table, writes the
//! resolver configuration and reads kernel state. The agent only talks to it through
//! [`PlatformAdapter`]; [`linux::LinuxPlatform`] drives iproute2 and `resolv.conf`.

pub mod linux;

use crate::dns_state::DnsBackup;
use crate::error::NetResult;
use crate::types::{GatewayBinding, InterfaceName, RouteAction};
use async_trait::async_trait;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;

/// Maximum length in bytes of a resolved DHCP lease file path
pub const LEASE_FILE_PATH_MAX_BYTES: usize = 128;

/// Current system default gateways, queried per address family
#[derive(Debug)]
pub struct DefaultGatewayReport {
    pub v4: NetResult<Option<GatewayBinding<Ipv4Addr>>>,
    pub v6: NetResult<Option<GatewayBinding<Ipv6Addr>>>,
}

/// Address assignment state of an interface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceState {
    pub ipv4_assigned: bool,
    pub ipv6_assigned: bool,
}

impl InterfaceState {
    /// An interface counts as up once either family has an address
    pub fn is_up(&self) -> bool {
        self.ipv4_assigned || self.ipv6_assigned
    }
}

/// OS-level network configuration backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Read the current default gateway of each address family
    async fn get_default_gateway(&self) -> DefaultGatewayReport;

    /// Make `gateway` on `interface` the default gateway of its address family
    async fn set_default_gateway(&self, interface: &InterfaceName, gateway: IpAddr)
        -> NetResult<()>;

    /// Install DNS name servers of one address family.
    ///
    /// Returns `NetError::Duplicate` when all of them are already installed.
    async fn set_dns_name_servers(&self, servers: &[IpAddr]) -> NetResult<()>;

    /// Undo the DNS name servers recorded in `backup`
    async fn restore_initial_dns(&self, backup: &DnsBackup) -> NetResult<()>;

    /// Add or delete a route to `destination` through `interface`.
    ///
    /// `prefix_length` of `None` means a host route.
    async fn change_route(
        &self,
        action: RouteAction,
        destination: IpAddr,
        prefix_length: Option<u8>,
        interface: &InterfaceName,
    ) -> NetResult<()>;

    /// Report which address families have an address assigned on `interface`
    async fn get_interface_state(&self, interface: &str) -> NetResult<InterfaceState>;

    /// Resolve the DHCP lease file of `interface`
    async fn dhcp_lease_file_path(&self, interface: &InterfaceName) -> NetResult<PathBuf>;
}
