//! Network configuration agent
//!
//! Public operations applied on behalf of client sessions: backing up and overriding the
//! system default gateways, installing DNS servers and changing routes for a data channel.
//! All state lives behind one mutex that each operation holds until it completes, so
//! operations never interleave.

use crate::dns_state::DnsBackup;
use crate::error::{NetError, NetResult};
use crate::gateway_stack::{DefaultGwSnapshot, GatewayStack};
use crate::ipc::SessionProvider;
use crate::lease;
use crate::platform::{InterfaceState, PlatformAdapter};
use crate::registry::ChannelRegistry;
use crate::types::{
    session_label, AddressKind, AddressSet, ChannelRecord, ChannelRef, ClientSession,
    DnsServerAddresses, GatewayAddresses, InterfaceName, RouteAction, Technology,
};
use crate::validate::validate_route_target;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Mutable agent state
struct AgentState {
    gateways: GatewayStack,
    dns: DnsBackup,
}

/// Identity of the client an operation is performed for
struct Caller {
    session: ClientSession,
    app: Option<String>,
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.app {
            Some(app) => write!(f, "{} (session {})", app, session_label(self.session)),
            None => write!(f, "session {}", session_label(self.session)),
        }
    }
}

/// Per-client network configuration agent
pub struct NetAgent {
    platform: Arc<dyn PlatformAdapter>,
    registry: Arc<dyn ChannelRegistry>,
    sessions: Arc<dyn SessionProvider>,
    state: Mutex<AgentState>,
}

impl NetAgent {
    /// Create the agent with room for `max_clients` concurrent gateway backups
    pub fn new(
        platform: Arc<dyn PlatformAdapter>,
        registry: Arc<dyn ChannelRegistry>,
        sessions: Arc<dyn SessionProvider>,
        max_clients: usize,
    ) -> Self {
        let agent = Self {
            platform,
            registry,
            sessions,
            state: Mutex::new(AgentState {
                gateways: GatewayStack::with_capacity(max_clients),
                dns: DnsBackup::new(),
            }),
        };
        info!("Data Channel Service's network component is ready");
        agent
    }

    /// Resolve the calling client. Credential and name lookups only feed the logs.
    async fn caller(&self) -> Caller {
        let session = self.sessions.current_session().await;
        let Some(handle) = session else {
            return Caller { session, app: None };
        };

        let app = match self.sessions.client_credentials(handle).await {
            Ok(creds) => match self.sessions.app_name(creds.pid).await {
                Ok(name) => Some(name),
                Err(e) => {
                    debug!("No app name for pid {}: {}", creds.pid, e);
                    None
                }
            },
            Err(e) => {
                debug!("No credentials for session {}: {}", handle, e);
                None
            }
        };

        Caller { session, app }
    }

    async fn channel_record(
        &self,
        caller: &Caller,
        channel: ChannelRef,
    ) -> NetResult<ChannelRecord> {
        self.registry.channel(channel).await.ok_or_else(|| {
            error!("Invalid channel reference {} from {}", channel, caller);
            NetError::Fault(format!("Invalid channel reference {}", channel))
        })
    }

    fn check_technology(record: &ChannelRecord) -> NetResult<()> {
        if record.technology.is_supported() {
            return Ok(());
        }
        error!(
            "Channel {} of unsupported technology {}",
            record.name, record.technology
        );
        Err(NetError::Unsupported(format!(
            "Technology {} of channel {}",
            record.technology, record.name
        )))
    }

    async fn net_interface(
        &self,
        channel: ChannelRef,
        record: &ChannelRecord,
    ) -> NetResult<InterfaceName> {
        self.registry
            .net_interface(record.technology, channel)
            .await
            .map_err(|e| {
                error!("Failed to get network interface of channel {}: {}", record.name, e);
                NetError::Fault(format!("No network interface for channel {}", record.name))
            })
    }

    /// Addresses of `kind` for a channel: cellular channels ask the modem, all others
    /// read the DHCP lease of the channel's interface.
    async fn addresses_for(
        &self,
        channel: ChannelRef,
        record: &ChannelRecord,
        kind: AddressKind,
        interface: Option<&InterfaceName>,
    ) -> NetResult<AddressSet> {
        if record.technology == Technology::Cellular {
            return match kind {
                AddressKind::DefaultGateway => self
                    .registry
                    .default_gw_addresses(record.technology, record.tech_ref)
                    .await
                    .map(AddressSet::from),
                AddressKind::DnsServer => self
                    .registry
                    .dns_addresses(record.technology, record.tech_ref)
                    .await
                    .map(AddressSet::from),
            };
        }

        let interface = match interface {
            Some(intf) => intf.clone(),
            None => self.net_interface(channel, record).await?,
        };
        lease::lease_addresses(self.platform.as_ref(), &interface, kind).await
    }

    /// Report the address assignment state of `interface`
    pub async fn get_interface_state(&self, interface: &str) -> NetResult<InterfaceState> {
        let _state = self.state.lock().await;
        let state = self.platform.get_interface_state(interface).await?;
        debug!(
            "Interface {}: IPv4 assigned {}, IPv6 assigned {}",
            interface, state.ipv4_assigned, state.ipv6_assigned
        );
        Ok(state)
    }

    /// Save the current system default gateways as the caller's backup
    pub async fn backup_default_gateway(&self) {
        let mut state = self.state.lock().await;
        let caller = self.caller().await;

        let report = self.platform.get_default_gateway().await;
        let v4 = report.v4.unwrap_or_else(|e| {
            error!("Failed to get IPv4 default GW config: {}", e);
            None
        });
        let v6 = report.v6.unwrap_or_else(|e| {
            error!("Failed to get IPv6 default GW config: {}", e);
            None
        });

        match &v4 {
            Some(gw) => info!(
                "Backed up IPv4 default GW {} on {} for {}",
                gw.address,
                gw.interface,
                caller
            ),
            None => debug!("No IPv4 default GW to back up for {}", caller),
        }
        match &v6 {
            Some(gw) => info!(
                "Backed up IPv6 default GW {} on {} for {}",
                gw.address,
                gw.interface,
                caller
            ),
            None => debug!("No IPv6 default GW to back up for {}", caller),
        }

        state
            .gateways
            .insert(DefaultGwSnapshot::with_gateways(caller.session, v4, v6));
    }

    /// Put back the default gateways the caller backed up and then replaced
    pub async fn restore_default_gateway(&self) -> NetResult<()> {
        let mut state = self.state.lock().await;
        let caller = self.caller().await;

        let Some(popped) = state.gateways.pop(caller.session) else {
            error!("No backed up default GW configs found to restore to for {}", caller);
            return Err(NetError::NotFound(format!(
                "No default GW backup for {}",
                session_label(caller.session)
            )));
        };
        if !popped.was_head {
            warn!(
                "Default GW configs restored not in the reversed order of being backed up by {}",
                caller
            );
        }
        let snapshot = popped.snapshot;

        let v4_result = if snapshot.v4_installed {
            match &snapshot.v4 {
                Some(gw) => {
                    self.platform
                        .set_default_gateway(&gw.interface, IpAddr::V4(gw.address))
                        .await
                }
                None => {
                    info!("No archived IPv4 default GW to restore for {}", caller);
                    Ok(())
                }
            }
        } else {
            Ok(())
        };
        match &v4_result {
            Ok(()) if snapshot.v4_installed => info!("IPv4 default GW restored for {}", caller),
            Ok(()) => {}
            Err(e) => error!("Failed to restore IPv4 default GW for {}: {}", caller, e),
        }

        let v6_result = if snapshot.v6_installed {
            match &snapshot.v6 {
                Some(gw) => {
                    self.platform
                        .set_default_gateway(&gw.interface, IpAddr::V6(gw.address))
                        .await
                }
                None => {
                    info!("No archived IPv6 default GW to restore for {}", caller);
                    Ok(())
                }
            }
        } else {
            Ok(())
        };
        match &v6_result {
            Ok(()) if snapshot.v6_installed => info!("IPv6 default GW restored for {}", caller),
            Ok(()) => {}
            Err(e) => error!("Failed to restore IPv6 default GW for {}: {}", caller, e),
        }

        if v4_result.is_ok() || v6_result.is_ok() {
            Ok(())
        } else {
            Err(NetError::Fault(
                "Failed to restore both default GWs".to_string(),
            ))
        }
    }

    /// Make the gateways of `channel` the system default gateways
    pub async fn set_default_gateway(&self, channel: ChannelRef) -> NetResult<()> {
        let mut state = self.state.lock().await;
        let caller = self.caller().await;

        let record = self.channel_record(&caller, channel).await?;
        Self::check_technology(&record)?;
        let interface = self.net_interface(channel, &record).await?;

        let addrs = self
            .addresses_for(channel, &record, AddressKind::DefaultGateway, Some(&interface))
            .await
            .map_err(|e| {
                error!(
                    "Failed to get default GW addresses of channel {}: {}",
                    record.name, e
                );
                e
            })?;
        let addrs = GatewayAddresses::from(addrs);
        if addrs.is_empty() {
            info!("No default GW address available for channel {}", record.name);
            return Err(NetError::Fault(format!(
                "No default GW address for channel {}",
                record.name
            )));
        }

        match state.gateways.find(caller.session) {
            None => warn!(
                "Present default GW configs on system not backed up before config changes by {}",
                caller
            ),
            Some((_, false)) => warn!(
                "Another app made a newer default GW configs backup than {}",
                caller
            ),
            Some((_, true)) => {}
        }

        let mut v6_ok = false;
        if let Some(gw) = addrs.ipv6 {
            match self
                .platform
                .set_default_gateway(&interface, IpAddr::V6(gw))
                .await
            {
                Ok(()) => {
                    info!(
                        "Default IPv6 GW {} set for {} on channel {} ({}) interface {}",
                        gw, caller, record.name, record.technology, interface
                    );
                    v6_ok = true;
                }
                Err(e) => error!(
                    "Failed to set default IPv6 GW {} for {} on channel {} ({}) interface {}: {}",
                    gw, caller, record.name, record.technology, interface, e
                ),
            }
        }

        let mut v4_ok = false;
        if let Some(gw) = addrs.ipv4 {
            match self
                .platform
                .set_default_gateway(&interface, IpAddr::V4(gw))
                .await
            {
                Ok(()) => {
                    info!(
                        "Default IPv4 GW {} set for {} on channel {} ({}) interface {}",
                        gw, caller, record.name, record.technology, interface
                    );
                    v4_ok = true;
                }
                Err(e) => error!(
                    "Failed to set default IPv4 GW {} for {} on channel {} ({}) interface {}: {}",
                    gw, caller, record.name, record.technology, interface, e
                ),
            }
        }

        if let Some((snapshot, _)) = state.gateways.find_mut(caller.session) {
            snapshot.v6_installed |= v6_ok;
            snapshot.v4_installed |= v4_ok;
        }

        if v4_ok || v6_ok {
            Ok(())
        } else {
            Err(NetError::Fault(format!(
                "Failed to set default GW of channel {}",
                record.name
            )))
        }
    }

    /// Default gateway addresses of `channel`
    pub async fn get_default_gateway(&self, channel: ChannelRef) -> NetResult<GatewayAddresses> {
        let _state = self.state.lock().await;
        let caller = self.caller().await;

        let record = self.channel_record(&caller, channel).await?;
        Self::check_technology(&record).map_err(|e| NetError::Fault(e.to_string()))?;
        let addrs = self
            .addresses_for(channel, &record, AddressKind::DefaultGateway, None)
            .await
            .map_err(|e| {
                error!("Failed to get default GW of channel {}: {}", record.name, e);
                e
            })?;
        Ok(GatewayAddresses::from(addrs))
    }

    /// Install the DNS servers of `channel`
    pub async fn set_dns(&self, channel: ChannelRef) -> NetResult<()> {
        let mut state = self.state.lock().await;
        let caller = self.caller().await;

        let record = self.channel_record(&caller, channel).await?;
        Self::check_technology(&record)?;

        let addrs = self
            .addresses_for(channel, &record, AddressKind::DnsServer, None)
            .await
            .map_err(|e| {
                error!(
                    "Failed to get DNS server addresses of channel {}: {}",
                    record.name, e
                );
                e
            })?;
        let addrs = DnsServerAddresses::from(addrs);
        if addrs.is_empty() {
            info!("No DNS server address available for channel {}", record.name);
            return Err(NetError::Fault(format!(
                "No DNS server address for channel {}",
                record.name
            )));
        }

        let v6_result = if addrs.ipv6.is_empty() {
            None
        } else {
            let servers: Vec<IpAddr> = addrs.ipv6.iter().copied().map(IpAddr::V6).collect();
            let result = self.platform.set_dns_name_servers(&servers).await;
            match &result {
                Ok(()) => {
                    state.dns.record_v6(&addrs.ipv6);
                    info!(
                        "IPv6 DNS servers {:?} set for {} on channel {} ({})",
                        addrs.ipv6, caller, record.name, record.technology
                    );
                }
                Err(e) if e.is_duplicate() => {
                    info!("IPv6 DNS servers {:?} already set", addrs.ipv6)
                }
                Err(e) => error!(
                    "Failed to set IPv6 DNS servers for {} on channel {}: {}",
                    caller, record.name, e
                ),
            }
            Some(result)
        };

        let v4_result = if addrs.ipv4.is_empty() {
            None
        } else {
            let servers: Vec<IpAddr> = addrs.ipv4.iter().copied().map(IpAddr::V4).collect();
            let result = self.platform.set_dns_name_servers(&servers).await;
            match &result {
                Ok(()) => {
                    state.dns.record_v4(&addrs.ipv4);
                    info!(
                        "IPv4 DNS servers {:?} set for {} on channel {} ({})",
                        addrs.ipv4, caller, record.name, record.technology
                    );
                }
                Err(e) if e.is_duplicate() => {
                    info!("IPv4 DNS servers {:?} already set", addrs.ipv4)
                }
                Err(e) => error!(
                    "Failed to set IPv4 DNS servers for {} on channel {}: {}",
                    caller, record.name, e
                ),
            }
            Some(result)
        };

        let results = [v6_result, v4_result];
        let attempted = results.iter().flatten();
        if attempted.clone().any(|r| matches!(r, Err(e) if e.is_duplicate())) {
            return Err(NetError::Duplicate(format!(
                "DNS servers of channel {} already set",
                record.name
            )));
        }
        if attempted.clone().any(|r| r.is_ok()) {
            return Ok(());
        }
        Err(NetError::Fault(format!(
            "Failed to set DNS servers of channel {}",
            record.name
        )))
    }

    /// DNS server addresses of `channel`
    pub async fn get_dns(&self, channel: ChannelRef) -> NetResult<DnsServerAddresses> {
        let _state = self.state.lock().await;
        let caller = self.caller().await;

        let record = self
            .channel_record(&caller, channel)
            .await
            .map_err(|e| NetError::Fault(e.to_string()))?;
        Self::check_technology(&record).map_err(|e| NetError::Fault(e.to_string()))?;

        let addrs = self
            .addresses_for(channel, &record, AddressKind::DnsServer, None)
            .await
            .map_err(|e| {
                error!("Failed to get DNS servers of channel {}: {}", record.name, e);
                NetError::Fault(format!("No DNS servers for channel {}: {}", record.name, e))
            })?;
        Ok(DnsServerAddresses::from(addrs))
    }

    /// Remove the DNS servers installed by the most recent `set_dns`
    pub async fn restore_dns(&self) -> NetResult<()> {
        let state = self.state.lock().await;
        let caller = self.caller().await;

        self.platform.restore_initial_dns(&state.dns).await.map_err(|e| {
            error!("Failed to restore DNS configs for {}: {}", caller, e);
            e
        })?;
        info!("DNS configs restored for {}", caller);
        Ok(())
    }

    /// Add or delete a route to `destination` through the interface of `channel`.
    ///
    /// `prefix` is a decimal prefix length; an IPv4 netmask is accepted for IPv4
    /// destinations. An empty prefix makes a host route.
    pub async fn change_route(
        &self,
        channel: ChannelRef,
        destination: &str,
        prefix: Option<&str>,
        is_add: bool,
    ) -> NetResult<()> {
        let _state = self.state.lock().await;
        let caller = self.caller().await;
        let action = RouteAction::from_add(is_add);

        let record = self.channel_record(&caller, channel).await?;
        Self::check_technology(&record)?;
        let target = validate_route_target(destination, prefix)?;

        let interface = self
            .registry
            .net_interface(record.technology, channel)
            .await
            .map_err(|e| {
                error!("Failed to get network interface of channel {}: {}", record.name, e);
                e
            })?;

        let prefix_str = target
            .prefix_length
            .map(|p| p.to_string())
            .unwrap_or_default();
        match self
            .platform
            .change_route(action, target.destination, target.prefix_length, &interface)
            .await
        {
            Ok(()) => {
                info!(
                    "Succeeded to {} route {}/{} on channel {} ({}) interface {} for {}",
                    action,
                    target.destination,
                    prefix_str,
                    record.name,
                    record.technology,
                    interface,
                    caller
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "Failed to {} route {}/{} on channel {} ({}) interface {} for {}: {}",
                    action,
                    target.destination,
                    prefix_str,
                    record.name,
                    record.technology,
                    interface,
                    caller,
                    e
                );
                Err(e)
            }
        }
    }

    /// Current default gateway backups, most recent first
    pub async fn gateway_backups(&self) -> Vec<DefaultGwSnapshot> {
        self.state.lock().await.gateways.iter().cloned().collect()
    }

    /// DNS servers recorded by the last successful `set_dns`
    pub async fn dns_backup(&self) -> DnsBackup {
        self.state.lock().await.dns.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::error::ResultCode;
    use crate::ipc::LocalSessions;
    use crate::platform::{DefaultGatewayReport, MockPlatformAdapter};
    use crate::registry::StaticChannelRegistry;
    use crate::types::{GatewayBinding, SessionRef};
    use mockall::predicate::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CHANNELS: &str = r#"
[[channels]]
name = "internet"
technology = "cellular"
interface = "rmnet_data0"
gateway_v4 = "192.0.2.1"
gateway_v6 = "2001:db8::1"
dns_v4 = ["192.0.2.53"]

[[channels]]
name = "lan"
technology = "ethernet"
interface = "eth0"

[[channels]]
name = "mystery"
technology = "unknown"
interface = "eth9"
"#;

    const CELLULAR: ChannelRef = ChannelRef(1);
    const ETHERNET: ChannelRef = ChannelRef(2);
    const UNKNOWN: ChannelRef = ChannelRef(3);

    fn agent(platform: MockPlatformAdapter) -> (NetAgent, Arc<LocalSessions>) {
        let config = AgentConfig::from_toml(CHANNELS).unwrap();
        let registry = StaticChannelRegistry::from_config(&config.channels).unwrap();
        let sessions = Arc::new(LocalSessions::new());
        let agent = NetAgent::new(
            Arc::new(platform),
            Arc::new(registry),
            sessions.clone(),
            config.max_clients,
        );
        (agent, sessions)
    }

    fn lease_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_change_route_invalid_destination_never_reaches_platform() {
        let mut platform = MockPlatformAdapter::new();
        platform.expect_change_route().never();
        let (agent, _) = agent(platform);

        let err = agent
            .change_route(ETHERNET, "10.0.0.256", Some("24"), true)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::BadParameter);
    }

    #[tokio::test]
    async fn test_change_route_legacy_netmask() {
        let mut platform = MockPlatformAdapter::new();
        platform
            .expect_change_route()
            .withf(|action, dest, prefix, intf| {
                *action == RouteAction::Add
                    && *dest == "10.0.0.0".parse::<IpAddr>().unwrap()
                    && *prefix == Some(24)
                    && intf.as_str() == "eth0"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let (agent, _) = agent(platform);

        agent
            .change_route(ETHERNET, " 10.0.0.0", Some("255.255.255.0"), true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_change_route_blank_prefix_is_host_route() {
        let mut platform = MockPlatformAdapter::new();
        platform
            .expect_change_route()
            .with(
                eq(RouteAction::Delete),
                eq("2001:db8::".parse::<IpAddr>().unwrap()),
                eq(None),
                always(),
            )
            .times(3)
            .returning(|_, _, _, _| Ok(()));
        let (agent, _) = agent(platform);

        for prefix in [" ", "", "0"] {
            agent
                .change_route(ETHERNET, "2001:db8::", Some(prefix), false)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_change_route_platform_error_propagates() {
        let mut platform = MockPlatformAdapter::new();
        platform.expect_change_route().returning(|_, _, _, _| {
            Err(NetError::CommandFailed {
                cmd: "ip route add 10.1.0.0/16 dev eth0".to_string(),
                code: Some(2),
                stderr: "RTNETLINK answers: File exists".to_string(),
            })
        });
        let (agent, _) = agent(platform);

        let err = agent
            .change_route(ETHERNET, "10.1.0.0", Some("16"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_unknown_technology_is_unsupported() {
        let mut platform = MockPlatformAdapter::new();
        platform.expect_set_default_gateway().never();
        platform.expect_change_route().never();
        let (agent, _) = agent(platform);

        let err = agent.set_default_gateway(UNKNOWN).await.unwrap_err();
        assert_eq!(err.code(), ResultCode::Unsupported);
        let err = agent.set_dns(UNKNOWN).await.unwrap_err();
        assert_eq!(err.code(), ResultCode::Unsupported);
        let err = agent
            .change_route(UNKNOWN, "10.0.0.0", None, true)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::Unsupported);
    }

    #[tokio::test]
    async fn test_get_on_unknown_technology_is_fault() {
        let mut platform = MockPlatformAdapter::new();
        platform.expect_dhcp_lease_file_path().never();
        let (agent, _) = agent(platform);

        let err = agent.get_default_gateway(UNKNOWN).await.unwrap_err();
        assert_eq!(err.code(), ResultCode::Fault);
        let err = agent.get_dns(UNKNOWN).await.unwrap_err();
        assert_eq!(err.code(), ResultCode::Fault);
    }

    #[tokio::test]
    async fn test_invalid_channel_is_fault() {
        let (agent, _) = agent(MockPlatformAdapter::new());
        let err = agent.set_default_gateway(ChannelRef(42)).await.unwrap_err();
        assert_eq!(err.code(), ResultCode::Fault);
        let err = agent.get_dns(ChannelRef(42)).await.unwrap_err();
        assert_eq!(err.code(), ResultCode::Fault);
    }

    #[tokio::test]
    async fn test_restore_without_backup_is_not_found() {
        let mut platform = MockPlatformAdapter::new();
        platform.expect_set_default_gateway().never();
        let (agent, _) = agent(platform);

        let err = agent.restore_default_gateway().await.unwrap_err();
        assert_eq!(err.code(), ResultCode::NotFound);
    }

    #[tokio::test]
    async fn test_backup_then_restore_without_override_sets_nothing() {
        let mut platform = MockPlatformAdapter::new();
        platform.expect_get_default_gateway().returning(|| DefaultGatewayReport {
            v4: Ok(Some(GatewayBinding {
                address: "10.0.0.1".parse().unwrap(),
                interface: InterfaceName::new("eth0").unwrap(),
            })),
            v6: Err(NetError::Fault("no IPv6 route table".to_string())),
        });
        platform.expect_set_default_gateway().never();
        let (agent, sessions) = agent(platform);
        sessions.set_current(Some(SessionRef(0xa))).await;

        agent.backup_default_gateway().await;
        let backups = agent.gateway_backups().await;
        assert_eq!(backups.len(), 1);
        assert!(backups[0].v6.is_none());

        agent.restore_default_gateway().await.unwrap();
        assert!(agent.gateway_backups().await.is_empty());
    }

    #[tokio::test]
    async fn test_set_default_gateway_from_cellular_marks_installed() {
        let mut platform = MockPlatformAdapter::new();
        platform
            .expect_get_default_gateway()
            .returning(|| DefaultGatewayReport { v4: Ok(None), v6: Ok(None) });
        platform.expect_dhcp_lease_file_path().never();
        platform
            .expect_set_default_gateway()
            .withf(|intf, gw| intf.as_str() == "rmnet_data0" && gw.is_ipv6())
            .times(1)
            .returning(|_, _| Ok(()));
        platform
            .expect_set_default_gateway()
            .withf(|_, gw| gw.is_ipv4())
            .times(1)
            .returning(|_, _| Err(NetError::Fault("no route".to_string())));
        let (agent, _) = agent(platform);

        agent.backup_default_gateway().await;
        agent.set_default_gateway(CELLULAR).await.unwrap();

        let backups = agent.gateway_backups().await;
        assert!(backups[0].v6_installed);
        assert!(!backups[0].v4_installed);
    }

    #[tokio::test]
    async fn test_set_default_gateway_both_families_fail() {
        let mut platform = MockPlatformAdapter::new();
        platform
            .expect_set_default_gateway()
            .times(2)
            .returning(|_, _| Err(NetError::Fault("no route".to_string())));
        let (agent, _) = agent(platform);

        let err = agent.set_default_gateway(CELLULAR).await.unwrap_err();
        assert_eq!(err.code(), ResultCode::Fault);
    }

    #[tokio::test]
    async fn test_set_default_gateway_without_lease_address_is_fault() {
        let lease = lease_file("lease {\n  option routers;\n}\n");
        let path = lease.path().to_path_buf();
        let mut platform = MockPlatformAdapter::new();
        platform
            .expect_dhcp_lease_file_path()
            .returning(move |_| Ok(path.clone()));
        platform.expect_set_default_gateway().never();
        let (agent, _) = agent(platform);

        let err = agent.set_default_gateway(ETHERNET).await.unwrap_err();
        assert_eq!(err.code(), ResultCode::Fault);
    }

    #[tokio::test]
    async fn test_get_dns_from_lease() {
        let lease = lease_file("  option domain-name-servers 2001:db8::1 1.1.1.1;\n");
        let path = lease.path().to_path_buf();
        let mut platform = MockPlatformAdapter::new();
        platform
            .expect_dhcp_lease_file_path()
            .withf(|intf| intf.as_str() == "eth0")
            .returning(move |_| Ok(path.clone()));
        let (agent, _) = agent(platform);

        let dns = agent.get_dns(ETHERNET).await.unwrap();
        assert_eq!(dns.ipv4, vec!["1.1.1.1".parse::<std::net::Ipv4Addr>().unwrap()]);
        assert_eq!(dns.ipv6, vec!["2001:db8::1".parse::<std::net::Ipv6Addr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_get_dns_missing_lease_is_fault() {
        let mut platform = MockPlatformAdapter::new();
        platform
            .expect_dhcp_lease_file_path()
            .returning(|_| Ok("/nonexistent/dhclient.eth0.leases".into()));
        let (agent, _) = agent(platform);

        let err = agent.get_dns(ETHERNET).await.unwrap_err();
        assert_eq!(err.code(), ResultCode::Fault);
    }

    #[tokio::test]
    async fn test_get_default_gateway_propagates_lease_error() {
        let mut platform = MockPlatformAdapter::new();
        platform
            .expect_dhcp_lease_file_path()
            .returning(|_| Ok("/nonexistent/dhclient.eth0.leases".into()));
        let (agent, _) = agent(platform);

        let err = agent.get_default_gateway(ETHERNET).await.unwrap_err();
        assert_eq!(err.code(), ResultCode::NotFound);

        let gw = agent.get_default_gateway(CELLULAR).await.unwrap();
        assert_eq!(gw.ipv4, Some("192.0.2.1".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_set_dns_duplicate_leaves_backup_untouched() {
        let mut platform = MockPlatformAdapter::new();
        platform
            .expect_set_dns_name_servers()
            .times(1)
            .returning(|_| Err(NetError::Duplicate("present".to_string())));
        let (agent, _) = agent(platform);

        let err = agent.set_dns(CELLULAR).await.unwrap_err();
        assert_eq!(err.code(), ResultCode::Duplicate);
        assert!(agent.dns_backup().await.is_empty());
    }

    #[tokio::test]
    async fn test_set_dns_records_backup_and_restore_hands_it_over() {
        let mut platform = MockPlatformAdapter::new();
        platform
            .expect_set_dns_name_servers()
            .withf(|servers| servers.to_vec() == vec!["192.0.2.53".parse::<IpAddr>().unwrap()])
            .times(1)
            .returning(|_| Ok(()));
        platform
            .expect_restore_initial_dns()
            .withf(|backup| backup.servers() == vec!["192.0.2.53".parse::<IpAddr>().unwrap()])
            .times(1)
            .returning(|_| Ok(()));
        let (agent, _) = agent(platform);

        agent.set_dns(CELLULAR).await.unwrap();
        agent.restore_dns().await.unwrap();
        assert!(!agent.dns_backup().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_interface_state() {
        let mut platform = MockPlatformAdapter::new();
        platform
            .expect_get_interface_state()
            .withf(|intf| intf == "wlan0")
            .returning(|_| {
                Ok(InterfaceState {
                    ipv4_assigned: false,
                    ipv6_assigned: true,
                })
            });
        let (agent, _) = agent(platform);

        let state = agent.get_interface_state("wlan0").await.unwrap();
        assert!(state.is_up());
    }
}
