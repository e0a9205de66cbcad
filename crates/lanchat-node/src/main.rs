//! LanChat node entry point.
//!
//! Wires configuration, logging, and the role controller together and runs
//! one role until Ctrl-C or the connection goes away.
//!
//! # Usage
//!
//! ```text
//! lanchat hub                     run the rendezvous hub
//! lanchat connect <host[:port]>   join a hub as a peer
//! lanchat connect <host> <name>   join with an explicit display name
//! ```
//!
//! With no arguments the node runs the hub role. Typed lines on stdin are
//! sent to the room; inbound lines are printed to stdout.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lanchat_node::application::role::RoleController;
use lanchat_node::infrastructure::network::hub::HubEvent;
use lanchat_node::infrastructure::network::local_ip;
use lanchat_node::infrastructure::network::peer::PeerEvent;
use lanchat_node::infrastructure::storage::config::{load_config, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;

    // Structured logging. `RUST_LOG` overrides the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.node.log_level.clone())),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut controller = RoleController::new();

    match args.first().map(String::as_str) {
        None | Some("hub") => run_hub(&mut controller, &config).await?,
        Some("connect") => {
            let host = args
                .get(1)
                .context("usage: lanchat connect <host[:port]> [name]")?;
            let name = args
                .get(2)
                .cloned()
                .unwrap_or_else(|| config.node.display_name.clone());
            run_peer(&mut controller, &config, host, &name).await?;
        }
        Some(other) => {
            anyhow::bail!("unknown role {other:?}; expected \"hub\" or \"connect\"");
        }
    }

    Ok(())
}

/// Runs the hub role until Ctrl-C.
async fn run_hub(controller: &mut RoleController, config: &AppConfig) -> anyhow::Result<()> {
    let hub_config = config.network.to_hub_config()?;
    let port = hub_config.port;
    let mut events = controller.start_hub(hub_config).await?;
    info!("hub reachable at {}:{port}", local_ip());

    let operator = config.node.display_name.clone();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            line = input.next_line() => match line {
                Ok(Some(line)) => {
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    if let Some(hub) = controller.hub() {
                        println!("{operator}: {text}");
                        if let Err(e) = hub.send(&format!("{operator}: {text}")).await {
                            warn!("message not sent: {e}");
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("stdin closed: {e}");
                    break;
                }
            },
            event = events.recv() => match event {
                Some(event) => print_hub_event(event),
                None => break,
            },
        }
    }

    controller.stop().await;
    Ok(())
}

/// Runs the peer role until Ctrl-C, a local EOF, or the hub goes away.
async fn run_peer(
    controller: &mut RoleController,
    config: &AppConfig,
    host: &str,
    name: &str,
) -> anyhow::Result<()> {
    let addr = resolve_hub_addr(host, config.network.port).await?;
    let mut events = controller.connect(addr, name).await?;
    info!("joined the room at {addr} as {name}");

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            line = input.next_line() => match line {
                Ok(Some(line)) => {
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    if let Some(peer) = controller.peer() {
                        println!("{name}: {text}");
                        if let Err(e) = peer.send(&format!("{name}: {text}")).await {
                            warn!("message not sent: {e}");
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("stdin closed: {e}");
                    break;
                }
            },
            event = events.recv() => match event {
                Some(PeerEvent::LineReceived(line)) => println!("{line}"),
                Some(PeerEvent::HubShutdown) => {
                    println!("[the hub has shut down]");
                }
                Some(PeerEvent::Disconnected) | None => break,
            },
        }
    }

    controller.stop().await;
    Ok(())
}

fn print_hub_event(event: HubEvent) {
    match event {
        HubEvent::PeerJoined { name, addr } => println!("[{name} joined from {addr}]"),
        HubEvent::PeerLeft { name } => println!("[{name} left]"),
        HubEvent::MessageReceived { text, .. } => println!("{text}"),
        HubEvent::Stopped => println!("[hub stopped]"),
    }
}

/// Resolves `host` to a socket address, defaulting to `default_port` when
/// no port is given. Host names are looked up via the system resolver.
async fn resolve_hub_addr(host: &str, default_port: u16) -> anyhow::Result<SocketAddr> {
    if let Ok(addr) = host.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }
    let candidate = if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:{default_port}")
    };
    let resolved = tokio::net::lookup_host(&candidate)
        .await
        .with_context(|| format!("could not resolve {candidate}"))?
        .next()
        .with_context(|| format!("no addresses found for {candidate}"));
    resolved
}

// ── Tests ─────────────────────────────────────────────────────────────────────
