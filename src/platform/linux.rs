//! Linux platform adapter
//!
//! Routes are programmed with iproute2 and name servers are written straight into the
//! resolver configuration file.

use super::{DefaultGatewayReport, InterfaceState, PlatformAdapter, LEASE_FILE_PATH_MAX_BYTES};
use crate::config::AgentConfig;
use crate::dns_state::DnsBackup;
use crate::error::{NetError, NetResult};
use crate::types::{GatewayBinding, InterfaceName, RouteAction};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Placeholder replaced by the interface name in the lease file template
pub const INTERFACE_PLACEHOLDER: &str = "{interface}";

/// Platform adapter for Linux hosts
pub struct LinuxPlatform {
    ip_command: String,
    resolv_conf: PathBuf,
    lease_file_template: String,
}

impl LinuxPlatform {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            ip_command: config.ip_command.clone(),
            resolv_conf: config.resolv_conf.clone(),
            lease_file_template: config.lease_file_template.clone(),
        }
    }

    /// Run iproute2 with `args` and return its standard output
    async fn run_ip(&self, args: &[&str]) -> NetResult<String> {
        let cmd_str = format!("{} {}", self.ip_command, args.join(" "));
        debug!("Running: {}", cmd_str);

        let output = Command::new(&self.ip_command)
            .args(args)
            .output()
            .await
            .map_err(|e| NetError::CommandFailed {
                cmd: cmd_str.clone(),
                code: None,
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8(output.stderr)
                .unwrap_or_else(|e| String::from_utf8_lossy(&e.into_bytes()).to_string());
            return Err(NetError::CommandFailed {
                cmd: cmd_str,
                code: output.status.code(),
                stderr: stderr.trim_end().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn default_gateway_of<A: FromStr>(
        &self,
        family: &str,
    ) -> NetResult<Option<GatewayBinding<A>>> {
        let output = self.run_ip(&[family, "route", "show", "default"]).await?;
        let Some(route) = parse_default_route(&output) else {
            debug!("No {} default gateway with a next hop", family);
            return Ok(None);
        };

        let address = route.via.parse::<A>().map_err(|_| {
            NetError::Fault(format!("Unparsable default gateway address {}", route.via))
        })?;
        let interface = InterfaceName::new(route.dev)
            .map_err(|e| NetError::Fault(format!("Unusable default route device: {}", e)))?;
        Ok(Some(GatewayBinding { address, interface }))
    }

    async fn has_address(&self, family: &str, interface: &InterfaceName) -> NetResult<bool> {
        let output = self
            .run_ip(&["-o", family, "addr", "show", "dev", interface.as_str()])
            .await?;
        Ok(has_assigned_address(&output))
    }

    async fn read_resolv_conf(&self) -> NetResult<String> {
        match tokio::fs::read_to_string(&self.resolv_conf).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(NetError::Fault(format!(
                "Failed to read {}: {}",
                self.resolv_conf.display(),
                e
            ))),
        }
    }

    async fn write_resolv_conf(&self, content: &str) -> NetResult<()> {
        tokio::fs::write(&self.resolv_conf, content).await.map_err(|e| {
            NetError::Fault(format!(
                "Failed to write {}: {}",
                self.resolv_conf.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl PlatformAdapter for LinuxPlatform {
    async fn get_default_gateway(&self) -> DefaultGatewayReport {
        DefaultGatewayReport {
            v4: self.default_gateway_of::<Ipv4Addr>("-4").await,
            v6: self.default_gateway_of::<Ipv6Addr>("-6").await,
        }
    }

    async fn set_default_gateway(
        &self,
        interface: &InterfaceName,
        gateway: IpAddr,
    ) -> NetResult<()> {
        let gateway_str = gateway.to_string();
        let mut args = Vec::with_capacity(7);
        if gateway.is_ipv6() {
            args.push("-6");
        }
        args.extend_from_slice(&[
            "route",
            "replace",
            "default",
            "via",
            gateway_str.as_str(),
            "dev",
            interface.as_str(),
        ]);

        self.run_ip(&args).await?;
        info!("Default gateway set to {} on {}", gateway, interface);
        Ok(())
    }

    async fn set_dns_name_servers(&self, servers: &[IpAddr]) -> NetResult<()> {
        let content = self.read_resolv_conf().await?;
        let updated = add_name_servers(&content, servers).ok_or_else(|| {
            NetError::Duplicate(format!("Name servers {:?} already configured", servers))
        })?;
        self.write_resolv_conf(&updated).await?;
        info!("Name servers {:?} added to {}", servers, self.resolv_conf.display());
        Ok(())
    }

    async fn restore_initial_dns(&self, backup: &DnsBackup) -> NetResult<()> {
        let servers = backup.servers();
        if servers.is_empty() {
            debug!("No name servers to remove");
            return Ok(());
        }

        let content = self.read_resolv_conf().await?;
        let updated = remove_name_servers(&content, &servers);
        if updated == content {
            warn!("Name servers {:?} no longer present", servers);
            return Ok(());
        }
        self.write_resolv_conf(&updated).await?;
        info!("Name servers {:?} removed from {}", servers, self.resolv_conf.display());
        Ok(())
    }

    async fn change_route(
        &self,
        action: RouteAction,
        destination: IpAddr,
        prefix_length: Option<u8>,
        interface: &InterfaceName,
    ) -> NetResult<()> {
        let target = match prefix_length {
            Some(len) => format!("{}/{}", destination, len),
            None => destination.to_string(),
        };
        let verb = match action {
            RouteAction::Add => "add",
            RouteAction::Delete => "del",
        };

        let mut args = Vec::with_capacity(6);
        if destination.is_ipv6() {
            args.push("-6");
        }
        args.extend_from_slice(&["route", verb, target.as_str(), "dev", interface.as_str()]);

        self.run_ip(&args).await?;
        Ok(())
    }

    async fn get_interface_state(&self, interface: &str) -> NetResult<InterfaceState> {
        let interface = InterfaceName::new(interface)?;
        Ok(InterfaceState {
            ipv4_assigned: self.has_address("-4", &interface).await?,
            ipv6_assigned: self.has_address("-6", &interface).await?,
        })
    }

    async fn dhcp_lease_file_path(&self, interface: &InterfaceName) -> NetResult<PathBuf> {
        lease_file_path(&self.lease_file_template, interface)
    }
}

/// Next hop and device of a default route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultRoute<'a> {
    pub via: &'a str,
    pub dev: &'a str,
}

/// Parse the first `default via X dev Y` line of `ip route show default` output
pub fn parse_default_route(output: &str) -> Option<DefaultRoute<'_>> {
    output.lines().find_map(|line| {
        let mut words = line.split_whitespace();
        if words.next()? != "default" {
            return None;
        }
        let (mut via, mut dev) = (None, None);
        while let Some(word) = words.next() {
            match word {
                "via" => via = words.next(),
                "dev" => dev = words.next(),
                _ => {}
            }
        }
        Some(DefaultRoute {
            via: via?,
            dev: dev?,
        })
    })
}

/// Whether `ip -o addr show` output lists any address
pub fn has_assigned_address(output: &str) -> bool {
    output.lines().any(|line| {
        line.split_whitespace()
            .any(|word| word == "inet" || word == "inet6")
    })
}

fn configured_name_servers(content: &str) -> Vec<IpAddr> {
    content
        .lines()
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            match (words.next(), words.next()) {
                (Some("nameserver"), Some(addr)) => addr.parse().ok(),
                _ => None,
            }
        })
        .collect()
}

/// Prepend `servers` that are not configured yet to resolver configuration `content`.
///
/// Returns `None` when every server is already present.
pub fn add_name_servers(content: &str, servers: &[IpAddr]) -> Option<String> {
    let present = configured_name_servers(content);
    let missing: Vec<&IpAddr> = servers.iter().filter(|s| !present.contains(s)).collect();
    if missing.is_empty() {
        return None;
    }

    let mut updated = String::with_capacity(content.len() + missing.len() * 32);
    for server in missing {
        updated.push_str(&format!("nameserver {}\n", server));
    }
    updated.push_str(content);
    Some(updated)
}

/// Drop the `nameserver` lines of `servers` from resolver configuration `content`
pub fn remove_name_servers(content: &str, servers: &[IpAddr]) -> String {
    content
        .lines()
        .filter(|line| {
            let mut words = line.split_whitespace();
            match (words.next(), words.next().and_then(|a| a.parse::<IpAddr>().ok())) {
                (Some("nameserver"), Some(addr)) => !servers.contains(&addr),
                _ => true,
            }
        })
        .map(|line| format!("{}\n", line))
        .collect()
}

/// Substitute `interface` into a lease file path template
pub fn lease_file_path(template: &str, interface: &InterfaceName) -> NetResult<PathBuf> {
    let path = template.replace(INTERFACE_PLACEHOLDER, interface.as_str());
    if path.len() > LEASE_FILE_PATH_MAX_BYTES {
        return Err(NetError::Overflow(format!(
            "Lease file path for {} exceeds {} bytes",
            interface, LEASE_FILE_PATH_MAX_BYTES
        )));
    }
    if !Path::new(&path).is_absolute() {
        warn!("Lease file path {} is relative", path);
    }
    Ok(PathBuf::from(path))
}
