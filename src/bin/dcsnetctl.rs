//! dcsnetctl - Data channel network configuration tool
//!
//! Drives the network configuration agent against the local system.
//!
//! # Usage
//!
//! ```bash
//! # Point the default gateways at a channel and install its DNS servers
//! sudo dcsnetctl set-gw internet
//! sudo dcsnetctl set-dns internet
//!
//! # Add a route through a channel
//! sudo dcsnetctl route add internet 10.0.0.0 24
//!
//! # Several clients in one process; the gateway backups live as long as the shell
//! printf '@1 backup\n@1 set-gw internet\n@1 restore\n' | sudo dcsnetctl shell
//! ```

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use libdcsnet::config::{AgentConfig, DEFAULT_CONFIG_PATH};
use libdcsnet::ipc::LocalSessions;
use libdcsnet::platform::linux::LinuxPlatform;
use libdcsnet::registry::StaticChannelRegistry;
use libdcsnet::{ChannelRef, NetAgent, NetResult, ResultCode, SessionRef};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

/// dcsnetctl - Data channel network configuration tool
#[derive(Parser, Debug)]
#[command(name = "dcsnetctl")]
#[command(version)]
#[command(about = "Per-client default gateway, DNS and route configuration for data channels")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Show whether an interface has addresses assigned
    State {
        /// Interface name
        interface: String,
    },
    /// Back up the current default gateways
    Backup,
    /// Restore the backed up default gateways
    Restore,
    /// Make a channel's gateways the default gateways
    SetGw {
        /// Channel name
        channel: String,
    },
    /// Show a channel's default gateways
    GetGw {
        /// Channel name
        channel: String,
    },
    /// Install a channel's DNS servers
    SetDns {
        /// Channel name
        channel: String,
    },
    /// Show a channel's DNS servers
    GetDns {
        /// Channel name
        channel: String,
    },
    /// Remove the DNS servers installed last
    RestoreDns,
    /// Add or delete a route through a channel
    Route {
        /// add or del
        #[arg(value_parser = ["add", "del"])]
        action: String,
        /// Channel name
        channel: String,
        /// Destination address
        destination: String,
        /// Prefix length (an IPv4 netmask is also accepted)
        prefix: Option<String>,
    },
    /// List configured channels
    Channels,
    /// Read commands from stdin, one per line, optionally prefixed by `@<session>`
    Shell,
}

/// Result printed for each command
#[derive(Debug, Serialize)]
struct Outcome<T: Serialize> {
    result: ResultCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> Outcome<T> {
    fn from_result(result: NetResult<T>) -> Self {
        match result {
            Ok(data) => Self {
                result: ResultCode::Ok,
                data: Some(data),
                error: None,
            },
            Err(e) => Self {
                result: e.code(),
                data: None,
                error: Some(e.to_string()),
            },
        }
    }
}

struct Cli {
    agent: NetAgent,
    registry: Arc<StaticChannelRegistry>,
    sessions: Arc<LocalSessions>,
}

impl Cli {
    fn channel(&self, name: &str) -> Result<ChannelRef> {
        self.registry
            .find_by_name(name)
            .ok_or_else(|| anyhow!("Unknown channel: {}", name))
    }

    /// Run one command and return its JSON outcome
    async fn run(&self, command: Command) -> Result<String> {
        let json = match command {
            Command::State { interface } => {
                to_json(Outcome::from_result(self.agent.get_interface_state(&interface).await))?
            }
            Command::Backup => {
                self.agent.backup_default_gateway().await;
                to_json(Outcome::from_result(Ok(self.agent.gateway_backups().await)))?
            }
            Command::Restore => {
                to_json(Outcome::from_result(self.agent.restore_default_gateway().await))?
            }
            Command::SetGw { channel } => {
                let channel = self.channel(&channel)?;
                to_json(Outcome::from_result(self.agent.set_default_gateway(channel).await))?
            }
            Command::GetGw { channel } => {
                let channel = self.channel(&channel)?;
                to_json(Outcome::from_result(self.agent.get_default_gateway(channel).await))?
            }
            Command::SetDns { channel } => {
                let channel = self.channel(&channel)?;
                to_json(Outcome::from_result(self.agent.set_dns(channel).await))?
            }
            Command::GetDns { channel } => {
                let channel = self.channel(&channel)?;
                to_json(Outcome::from_result(self.agent.get_dns(channel).await))?
            }
            Command::RestoreDns => to_json(Outcome::from_result(self.agent.restore_dns().await))?,
            Command::Route {
                action,
                channel,
                destination,
                prefix,
            } => {
                let channel = self.channel(&channel)?;
                let result = self
                    .agent
                    .change_route(channel, &destination, prefix.as_deref(), action == "add")
                    .await;
                to_json(Outcome::from_result(result))?
            }
            Command::Channels => to_json(Outcome::from_result(Ok(self.registry.list())))?,
            Command::Shell => bail!("shell cannot be nested"),
        };
        Ok(json)
    }

    async fn shell(&self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (session, rest) = match split_session(line) {
                Ok(split) => split,
                Err(e) => {
                    println!("{}", serde_json::json!({ "error": format!("{:#}", e) }));
                    continue;
                }
            };
            self.sessions.set_current(session).await;

            let words = std::iter::once("dcsnetctl").chain(rest.split_whitespace());
            let output = match ShellLine::try_parse_from(words) {
                Ok(parsed) => match self.run(parsed.command).await {
                    Ok(json) => json,
                    Err(e) => serde_json::json!({ "error": e.to_string() }).to_string(),
                },
                Err(e) => serde_json::json!({ "error": e.to_string().trim_end() }).to_string(),
            };
            println!("{}", output);
        }

        Ok(())
    }
}

/// One line of shell input
#[derive(Parser, Debug)]
struct ShellLine {
    #[command(subcommand)]
    command: Command,
}

/// Split an optional leading `@<session>` off a shell line
fn split_session(line: &str) -> Result<(Option<SessionRef>, &str)> {
    let Some(rest) = line.strip_prefix('@') else {
        return Ok((None, line));
    };
    let (id, rest) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let id = match id.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => id.parse::<u64>(),
    }
    .with_context(|| format!("Invalid session id: {}", id))?;
    Ok((Some(SessionRef(id)), rest.trim_start()))
}

fn to_json<T: Serialize>(outcome: Outcome<T>) -> Result<String> {
    serde_json::to_string(&outcome).context("Failed to encode result")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { &args.log_level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("libdcsnet={},dcsnetctl={}", log_level, log_level))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();

    debug!("dcsnetctl v{}", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    info!("Loaded {} channel(s)", config.channels.len());

    let platform = Arc::new(LinuxPlatform::new(&config));
    let registry = Arc::new(StaticChannelRegistry::from_config(&config.channels)?);
    let sessions = Arc::new(LocalSessions::new());
    let agent = NetAgent::new(platform, registry.clone(), sessions.clone(), config.max_clients);

    let ctx = Cli {
        agent,
        registry,
        sessions,
    };

    match args.command {
        Command::Shell => ctx.shell().await?,
        command => println!("{}", ctx.run(command).await?),
    }

    Ok(())
}
