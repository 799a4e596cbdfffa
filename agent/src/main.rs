//! Convoy Agent - one truck of a decentralized platoon.
//!
//! Binds `port_base + id`, broadcasts its state to every other truck of the
//! fleet and runs the platoon controller at the configured tick rate.
//! Operator toggles are read from stdin, one letter per line:
//!
//! - `b` emergency brake
//! - `d` decouple from the formation
//! - `j` simulate radio jamming
//! - `s` print the current status
//! - `q` quit

use anyhow::{bail, Context, Result};
use clap::Parser;
use convoy_core::{OperatorHandle, PlatoonAgent, PlatoonConfig, Role, StatusReport};
use convoy_env::{AgentId, ConvoyContext, TokioContext, UdpConfig, UdpTransport};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Runs one truck of the convoy over UDP.
#[derive(Parser, Debug)]
#[command(name = "convoy-agent")]
#[command(about = "Decentralized platoon agent for autonomous trucks", long_about = None)]
struct Args {
    /// This truck's id
    #[arg(short, long)]
    id: u32,

    /// Number of trucks in the fleet
    #[arg(short, long, default_value = "3")]
    fleet_size: u32,

    /// Trucks the leader waits for before moving (defaults to the fleet size)
    #[arg(short, long)]
    target_size: Option<usize>,

    /// Id of the leading truck; pass the same value to every truck
    #[arg(long, default_value = "0")]
    leader_id: u32,

    /// Port of truck 0; truck i listens on port_base + i
    #[arg(long, default_value = "5000")]
    port_base: u16,

    /// Destination host for peer traffic
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::BROADCAST))]
    peer_host: IpAddr,

    /// Monitor port that receives a copy of every broadcast (defaults to port_base - 1)
    #[arg(long)]
    monitor_port: Option<u16>,

    /// Do not mirror broadcasts to a monitor
    #[arg(long)]
    no_monitor: bool,

    /// JSON file overriding the default platoon parameters
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log a status line every this many control ticks (0 disables)
    #[arg(long, default_value = "20")]
    status_every: u64,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn check_fleet(&self) -> Result<()> {
        if self.id >= self.fleet_size {
            bail!("id {} is outside a fleet of {}", self.id, self.fleet_size);
        }
        if self.leader_id >= self.fleet_size {
            bail!("leader id {} is outside a fleet of {}", self.leader_id, self.fleet_size);
        }
        Ok(())
    }

    fn platoon_config(&self) -> Result<PlatoonConfig> {
        let mut config = match &self.config {
            Some(path) => PlatoonConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => PlatoonConfig::default(),
        };

        config.role = if self.id == self.leader_id {
            Role::Leader {
                target_size: self.target_size.unwrap_or(self.fleet_size as usize),
            }
        } else {
            Role::Follower
        };
        config.validate().context("invalid platoon configuration")?;
        Ok(config)
    }

    fn udp_config(&self) -> UdpConfig {
        let mut udp = UdpConfig::new(AgentId(self.id), self.fleet_size);
        udp.port_base = self.port_base;
        udp.peer_host = self.peer_host;
        udp.monitor_port = if self.no_monitor {
            None
        } else {
            self.monitor_port.or_else(|| self.port_base.checked_sub(1))
        };
        udp
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("installing tracing subscriber")?;

    args.check_fleet()?;
    let config = args.platoon_config()?;
    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let udp = args.udp_config();
    let transport = UdpTransport::bind(&udp)
        .await
        .with_context(|| format!("binding truck {}", args.id))?;
    let stale = transport.flush();
    if stale > 0 {
        info!("Discarded {} stale datagram(s)", stale);
    }
    info!(
        "T{} up on {} ({:?}), {} peer(s)",
        args.id,
        transport.local_addr()?,
        config.role,
        transport.peers().len()
    );

    let context = TokioContext::shared();
    let agent = Arc::new(
        PlatoonAgent::new(Arc::clone(&context), Arc::new(transport), config)
            .with_status_interval(args.status_every),
    );
    agent.spawn_tasks();

    operator_console(&agent, &context).await?;

    agent.shutdown();
    // Let both loops observe the flag.
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!("T{} stopped", args.id);
    Ok(())
}

/// Reads operator commands until `q`, end of input followed by Ctrl-C, or Ctrl-C.
async fn operator_console(
    agent: &Arc<PlatoonAgent<TokioContext, UdpTransport>>,
    context: &TokioContext,
) -> Result<()> {
    let operator: OperatorHandle = agent.operator();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    println!("Commands: b = brake, d = decouple, j = jamming, s = status, q = quit");
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line.context("reading stdin")? else {
                    stdin_open = false;
                    continue;
                };
                match line.trim() {
                    "b" => {
                        operator.toggle_emergency();
                    }
                    "d" => {
                        operator.toggle_decoupled();
                    }
                    "j" => {
                        operator.toggle_jamming();
                    }
                    "s" => {
                        let state = agent.snapshot();
                        println!("{}", StatusReport::capture(&state, context.now_secs(), 0));
                    }
                    "q" => return Ok(()),
                    "" => {}
                    other => warn!("Unknown command {:?}", other),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for Ctrl-C")?;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role_of(argv: &[&str]) -> Role {
        let args = Args::try_parse_from(std::iter::once("convoy-agent").chain(argv.iter().copied())).unwrap();
        args.check_fleet().unwrap();
        args.platoon_config().unwrap().role
    }

    #[test]
    fn test_truck_zero_leads_by_default() {
        assert_eq!(role_of(&["--id", "0", "--fleet-size", "3"]), Role::Leader { target_size: 3 });
        assert_eq!(role_of(&["--id", "2", "--fleet-size", "3"]), Role::Follower);
    }

    #[test]
    fn test_single_leader_across_fleet() {
        let leaders = (0..3)
            .map(|id| {
                let id = id.to_string();
                role_of(&["--id", &id, "--fleet-size", "3", "--leader-id", "2"])
            })
            .filter(Role::is_leader)
            .count();
        assert_eq!(leaders, 1);
        assert!(role_of(&["--id", "2", "--fleet-size", "3", "--leader-id", "2"]).is_leader());
        assert!(!role_of(&["--id", "0", "--fleet-size", "3", "--leader-id", "2"]).is_leader());
    }

    #[test]
    fn test_target_size_override() {
        let role = role_of(&["--id", "0", "--fleet-size", "4", "--target-size", "2"]);
        assert_eq!(role, Role::Leader { target_size: 2 });
    }

    #[test]
    fn test_leader_outside_fleet_is_rejected() {
        let args = Args::try_parse_from(["convoy-agent", "--id", "0", "--fleet-size", "3", "--leader-id", "5"]).unwrap();
        assert!(args.check_fleet().is_err());
    }
}
