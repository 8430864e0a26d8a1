//! dcsnet - per-client network configuration for data channels
//!
//! Lets client applications back up the system default gateways, point them at a data
//! channel, install that channel's DNS servers, change routes through it, and restore
//! what they replaced. Channel addresses come from the modem for cellular channels and
//! from the DHCP lease file of the channel's interface otherwise.
//!
//! # Layout
//!
//! - [`agent::NetAgent`]: the public operations
//! - [`lease`]: DHCP lease file parsing
//! - [`validate`]: route destination and prefix validation
//! - [`gateway_stack`]: per-client default gateway backups
//! - [`dns_state`]: record of installed DNS servers
//! - [`platform`]: OS backend ([`platform::linux::LinuxPlatform`] on Linux)
//! - [`registry`] and [`ipc`]: channel and client session sources

pub mod agent;
pub mod config;
pub mod dns_state;
pub mod error;
pub mod gateway_stack;
pub mod ipc;
pub mod lease;
pub mod platform;
pub mod registry;
pub mod types;
pub mod validate;

pub use agent::NetAgent;
pub use config::AgentConfig;
pub use error::{NetError, NetResult, ResultCode};
pub use platform::PlatformAdapter;
pub use types::{ChannelRef, InterfaceName, SessionRef, Technology};
