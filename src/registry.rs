//! Data channel registry
//!
//! Maps opaque channel handles to their records, network interfaces and, for cellular
//! channels, the addresses the modem assigned.

use crate::config::ChannelConfig;
use crate::error::{NetError, NetResult};
use crate::types::{
    ChannelRecord, ChannelRef, DnsServerAddresses, GatewayAddresses, InterfaceName, TechRef,
    Technology, MAX_DNS_ADDRESSES_PER_FAMILY,
};
use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

/// Source of channel records and technology-provided addresses
#[async_trait]
pub trait ChannelRegistry: Send + Sync {
    /// Look up the record of `channel`
    async fn channel(&self, channel: ChannelRef) -> Option<ChannelRecord>;

    /// Network interface `channel` is bound to
    async fn net_interface(
        &self,
        technology: Technology,
        channel: ChannelRef,
    ) -> NetResult<InterfaceName>;

    /// Default gateway addresses assigned by the technology (cellular only)
    async fn default_gw_addresses(
        &self,
        technology: Technology,
        tech_ref: TechRef,
    ) -> NetResult<GatewayAddresses>;

    /// DNS server addresses assigned by the technology (cellular only)
    async fn dns_addresses(
        &self,
        technology: Technology,
        tech_ref: TechRef,
    ) -> NetResult<DnsServerAddresses>;
}

/// Summary of one registered channel
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    pub channel: ChannelRef,
    pub name: String,
    pub technology: Technology,
    pub interface: InterfaceName,
}

struct StaticChannel {
    record: ChannelRecord,
    interface: InterfaceName,
    gateways: GatewayAddresses,
    dns: DnsServerAddresses,
}

/// Registry over a fixed set of channels; handles are assigned `1..=N` in order
pub struct StaticChannelRegistry {
    channels: Vec<StaticChannel>,
}

impl StaticChannelRegistry {
    pub fn from_config(configs: &[ChannelConfig]) -> NetResult<Self> {
        let mut channels = Vec::with_capacity(configs.len());

        for (i, cfg) in configs.iter().enumerate() {
            if cfg.dns_v4.len() > MAX_DNS_ADDRESSES_PER_FAMILY
                || cfg.dns_v6.len() > MAX_DNS_ADDRESSES_PER_FAMILY
            {
                warn!(
                    "Channel {} lists more than {} DNS servers per family; extra ignored",
                    cfg.name, MAX_DNS_ADDRESSES_PER_FAMILY
                );
            }
            channels.push(StaticChannel {
                record: ChannelRecord {
                    name: cfg.name.clone(),
                    technology: cfg.technology,
                    tech_ref: TechRef(i as u64 + 1),
                },
                interface: InterfaceName::new(cfg.interface.clone())?,
                gateways: GatewayAddresses {
                    ipv4: cfg.gateway_v4,
                    ipv6: cfg.gateway_v6,
                },
                dns: DnsServerAddresses {
                    ipv4: cfg
                        .dns_v4
                        .iter()
                        .take(MAX_DNS_ADDRESSES_PER_FAMILY)
                        .copied()
                        .collect(),
                    ipv6: cfg
                        .dns_v6
                        .iter()
                        .take(MAX_DNS_ADDRESSES_PER_FAMILY)
                        .copied()
                        .collect(),
                },
            });
        }

        Ok(Self { channels })
    }

    fn by_ref(&self, channel: ChannelRef) -> Option<&StaticChannel> {
        let idx = usize::try_from(channel.0).ok()?.checked_sub(1)?;
        self.channels.get(idx)
    }

    fn by_tech_ref(&self, tech_ref: TechRef) -> Option<&StaticChannel> {
        self.channels.iter().find(|c| c.record.tech_ref == tech_ref)
    }

    /// Find a channel handle by channel name
    pub fn find_by_name(&self, name: &str) -> Option<ChannelRef> {
        self.channels
            .iter()
            .position(|c| c.record.name == name)
            .map(|i| ChannelRef(i as u64 + 1))
    }

    /// List all channels
    pub fn list(&self) -> Vec<ChannelSummary> {
        self.channels
            .iter()
            .enumerate()
            .map(|(i, c)| ChannelSummary {
                channel: ChannelRef(i as u64 + 1),
                name: c.record.name.clone(),
                technology: c.record.technology,
                interface: c.interface.clone(),
            })
            .collect()
    }

    fn cellular(&self, technology: Technology, tech_ref: TechRef) -> NetResult<&StaticChannel> {
        if technology != Technology::Cellular {
            return Err(NetError::Unsupported(format!(
                "Technology {} does not provide addresses",
                technology
            )));
        }
        self.by_tech_ref(tech_ref)
            .ok_or_else(|| NetError::Fault(format!("Unknown technology reference {}", tech_ref.0)))
    }
}

#[async_trait]
impl ChannelRegistry for StaticChannelRegistry {
    async fn channel(&self, channel: ChannelRef) -> Option<ChannelRecord> {
        self.by_ref(channel).map(|c| c.record.clone())
    }

    async fn net_interface(
        &self,
        _technology: Technology,
        channel: ChannelRef,
    ) -> NetResult<InterfaceName> {
        self.by_ref(channel)
            .map(|c| c.interface.clone())
            .ok_or_else(|| NetError::Fault(format!("Unknown channel {}", channel)))
    }

    async fn default_gw_addresses(
        &self,
        technology: Technology,
        tech_ref: TechRef,
    ) -> NetResult<GatewayAddresses> {
        Ok(self.cellular(technology, tech_ref)?.gateways.clone())
    }

    async fn dns_addresses(
        &self,
        technology: Technology,
        tech_ref: TechRef,
    ) -> NetResult<DnsServerAddresses> {
        Ok(self.cellular(technology, tech_ref)?.dns.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;

    fn registry() -> StaticChannelRegistry {
        let config = AgentConfig::from_toml(
            r#"
[[channels]]
name = "internet"
technology = "cellular"
interface = "rmnet_data0"
gateway_v6 = "2001:db8::1"
dns_v4 = ["10.64.0.2", "10.64.0.3", "10.64.0.4"]

[[channels]]
name = "lan"
technology = "ethernet"
interface = "eth0"
"#,
        )
        .unwrap();
        StaticChannelRegistry::from_config(&config.channels).unwrap()
    }

    #[tokio::test]
    async fn test_channel_lookup() {
        let registry = registry();
        let lan = registry.find_by_name("lan").unwrap();
        assert_eq!(lan, ChannelRef(2));

        let record = registry.channel(lan).await.unwrap();
        assert_eq!(record.technology, Technology::Ethernet);
        assert_eq!(
            registry.net_interface(record.technology, lan).await.unwrap().as_str(),
            "eth0"
        );

        assert!(registry.channel(ChannelRef(0)).await.is_none());
        assert!(registry.channel(ChannelRef(3)).await.is_none());
    }

    #[tokio::test]
    async fn test_cellular_addresses() {
        let registry = registry();
        let record = registry.channel(ChannelRef(1)).await.unwrap();

        let gw = registry
            .default_gw_addresses(record.technology, record.tech_ref)
            .await
            .unwrap();
        assert_eq!(gw.ipv4, None);
        assert_eq!(gw.ipv6, Some("2001:db8::1".parse().unwrap()));

        let dns = registry
            .dns_addresses(record.technology, record.tech_ref)
            .await
            .unwrap();
        assert_eq!(dns.ipv4.len(), 2);
    }

    #[tokio::test]
    async fn test_non_cellular_has_no_technology_addresses() {
        let registry = registry();
        let record = registry.channel(ChannelRef(2)).await.unwrap();
        let err = registry
            .dns_addresses(record.technology, record.tech_ref)
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ResultCode::Unsupported);
    }

    #[test]
    fn test_invalid_interface_rejected() {
        let config = AgentConfig::from_toml(
            r#"
[[channels]]
name = "bad"
technology = "wifi"
interface = ""
"#,
        )
        .unwrap();
        assert!(StaticChannelRegistry::from_config(&config.channels).is_err());
    }
}
