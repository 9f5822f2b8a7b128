//! # relaymesh CLI Entry Point
//!
//! Main binary for the relaymesh service relay. Provides the relay daemon
//! plus admin tooling for the kill switch, exit-host resolution, and
//! per-service k management.
//!
//! ## Usage
//!
//! ```bash
//! # Start a relay
//! relaymesh serve -b 0.0.0.0:4000 -m 10.0.0.1:4000 -m 10.0.0.2:4000
//!
//! # Block all traffic to a service, then inspect the table
//! relaymesh kill-switch 127.0.0.1:4000 --block '*~~steve'
//! relaymesh kill-switch 127.0.0.1:4000
//!
//! # Widen a service's exit set across the whole ring
//! relaymesh set-k 127.0.0.1:4000 --service steve --k 20 --fanout
//!
//! # Which relays own a service's connections?
//! relaymesh hosts 127.0.0.1:4000 --service steve
//! ```
//!
//! All addresses are plain `host:port` hostports; the CLI adds the HTTP
//! scheme itself.

use anyhow::Result;
use argh::FromArgs;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use relaymesh_common::{AdminRequest, AdminResponse};
use relaymesh_router::{
    BlockList, EgressNodes, HttpDispatch, HttpServer, RelayRouter, Ring, RouterConfig,
    StaticPeerStore, StaticRing,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// relaymesh - service mesh relay
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Serve**: run a relay node
/// - **KillSwitch**: block, unblock, or list caller/service pairs
/// - **SetK**: read or change a service's replication factor
/// - **Hosts**: resolve a service's exit hosts
/// - **Info**: identity, membership, and routing counters of a relay
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    KillSwitch(KillSwitchArgs),
    SetK(SetKArgs),
    Hosts(HostsArgs),
    Info(InfoArgs),
}

/// Arguments for running a relay node.
///
/// The relay joins a fixed membership (itself plus every `--member`), serves
/// relayed calls on `/relay`, backend advertisements on `/advertise`, and
/// admin operations on `/admin`.
///
/// # Example
///
/// ```bash
/// relaymesh serve -b 0.0.0.0:4000 --hostport 10.0.0.1:4000 \
///   -m 10.0.0.2:4000 -m 10.0.0.3:4000
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// run a relay node
struct ServeArgs {
    /// address to bind the relay's HTTP server to
    #[argh(option, short = 'b', default = "\"0.0.0.0:4000\".into()")]
    bind: String,

    /// this relay's public identity on the ring
    ///
    /// Other members address this relay by this hostport. Defaults to the
    /// bind address, which is only right when the bind address is routable.
    #[argh(option, long = "hostport")]
    hostport: Option<String>,

    /// hostports of other ring members
    ///
    /// Can be specified multiple times. The local identity is always part
    /// of the membership and does not need to be listed.
    #[argh(option, short = 'm', long = "member")]
    members: Vec<String>,

    /// default replication factor for services without an override
    #[argh(option, long = "default-k", default = "10")]
    default_k: usize,
}

/// Arguments for the kill switch.
///
/// With no flags the current block table is listed. `--block` and
/// `--unblock` take a `caller~~service` pair where either side may be `*`.
///
/// # Example
///
/// ```bash
/// relaymesh kill-switch 127.0.0.1:4000 --block '*~~steve'
/// relaymesh kill-switch 127.0.0.1:4000 --unblock '*~~steve'
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "kill-switch")]
/// block or unblock caller/service traffic
struct KillSwitchArgs {
    /// hostport of the relay to administer
    #[argh(positional)]
    target: String,

    /// caller~~service pair to block
    #[argh(option, long = "block")]
    block: Option<String>,

    /// caller~~service pair to unblock
    #[argh(option, long = "unblock")]
    unblock: Option<String>,
}

/// Arguments for reading or changing a service's replication factor.
///
/// Without `--k` the current value is printed. With `--k` the value is set
/// on the target relay only; add `--fanout` to propagate it to every ring
/// member.
#[derive(FromArgs)]
#[argh(subcommand, name = "set-k")]
/// read or change a service's replication factor
struct SetKArgs {
    /// hostport of the relay to administer
    #[argh(positional)]
    target: String,

    /// service to operate on
    #[argh(option, short = 's', long = "service")]
    service: String,

    /// new k value; omit to read the current value
    #[argh(option, short = 'k', long = "k")]
    k: Option<usize>,

    /// propagate the new value to every ring member
    #[argh(switch, long = "fanout")]
    fanout: bool,
}

/// Arguments for resolving a service's exit hosts.
#[derive(FromArgs)]
#[argh(subcommand, name = "hosts")]
/// resolve a service's exit hosts
struct HostsArgs {
    /// hostport of the relay to query
    #[argh(positional)]
    target: String,

    /// service to resolve
    #[argh(option, short = 's', long = "service")]
    service: String,

    /// also query each exit host for its backend connection count
    #[argh(switch, long = "connections")]
    connections: bool,
}

/// Arguments for the relay info dump.
///
/// Outputs raw JSON to stdout for scripting (piping to `jq`, etc.).
#[derive(FromArgs)]
#[argh(subcommand, name = "info")]
/// show a relay's identity, membership, and counters
struct InfoArgs {
    /// hostport of the relay to query
    #[argh(positional)]
    target: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Only the daemon logs; admin commands keep stdout clean for scripting.
    if matches!(cli.command, Commands::Serve(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::KillSwitch(args) => run_kill_switch(args).await,
        Commands::SetK(args) => run_set_k(args).await,
        Commands::Hosts(args) => run_hosts(args).await,
        Commands::Info(args) => run_info(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let addr: SocketAddr = args
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address {}: {}", args.bind, e))?;
    let hostport = args.hostport.unwrap_or_else(|| args.bind.clone());

    tracing::info!("Starting relaymesh relay");
    tracing::info!("Binding to: {}", args.bind);
    tracing::info!("Ring identity: {}", hostport);
    tracing::info!("Members: {:?}", args.members);
    if args.members.is_empty() {
        tracing::warn!("No other members specified! Use --member <hostport> to join a ring.");
    }

    let ring = Arc::new(StaticRing::new(hostport, args.members.clone()));
    let peers = Arc::new(StaticPeerStore::new(ring.members()));
    let router = Arc::new(RelayRouter::new(
        Arc::new(BlockList::new()),
        Arc::new(EgressNodes::with_default_k(ring.clone(), args.default_k)),
        Arc::new(HttpDispatch::new()),
        peers,
        ring,
        RouterConfig::default(),
    ));

    HttpServer::new(router).serve(addr).await?;
    Ok(())
}

async fn run_kill_switch(args: KillSwitchArgs) -> Result<()> {
    if args.block.is_some() && args.unblock.is_some() {
        anyhow::bail!("--block and --unblock are mutually exclusive");
    }

    let response = match (&args.block, &args.unblock) {
        (Some(pair), _) => {
            let (caller, service) = parse_block_pair(pair)?;
            admin_call(
                &args.target,
                "kill_switch",
                json!({"type": "block", "caller": caller, "service": service}),
            )
            .await?
        }
        (_, Some(pair)) => {
            let (caller, service) = parse_block_pair(pair)?;
            admin_call(
                &args.target,
                "kill_switch",
                json!({"type": "unblock", "caller": caller, "service": service}),
            )
            .await?
        }
        _ => admin_call(&args.target, "kill_switch", json!({"type": "query"})).await?,
    };

    let body = into_ok_body(response)?;
    if let Some(blockings) = body.get("blockings").and_then(|b| b.as_array()) {
        if blockings.is_empty() {
            println!("no blocked traffic");
        }
        for entry in blockings {
            println!("{}", entry.as_str().unwrap_or_default());
        }
    } else {
        println!("{}", serde_json::to_string(&body)?);
    }
    Ok(())
}

async fn run_set_k(args: SetKArgs) -> Result<()> {
    let response = match args.k {
        None => {
            if args.fanout {
                anyhow::bail!("--fanout requires --k");
            }
            admin_call(&args.target, "get_k", json!({"service": args.service})).await?
        }
        Some(k) if args.fanout => {
            admin_call(
                &args.target,
                "fanout_set_k",
                json!({"service": args.service, "k": k}),
            )
            .await?
        }
        Some(k) => {
            admin_call(
                &args.target,
                "set_k",
                json!({"service": args.service, "k": k}),
            )
            .await?
        }
    };
    println!("{}", serde_json::to_string(&into_ok_body(response)?)?);
    Ok(())
}

async fn run_hosts(args: HostsArgs) -> Result<()> {
    let op = if args.connections {
        "service_connections"
    } else {
        "exit_hosts"
    };
    let response = admin_call(&args.target, op, json!({"service": args.service})).await?;
    println!("{}", serde_json::to_string(&into_ok_body(response)?)?);
    Ok(())
}

async fn run_info(args: InfoArgs) -> Result<()> {
    let response = admin_call(&args.target, "_info", json!(null)).await?;
    println!("{}", serde_json::to_string(&into_ok_body(response)?)?);
    Ok(())
}

/// Splits a `caller~~service` pair as given to `--block`/`--unblock`.
fn parse_block_pair(pair: &str) -> Result<(&str, &str)> {
    pair.split_once("~~")
        .filter(|(caller, service)| !caller.is_empty() && !service.is_empty())
        .ok_or_else(|| {
            anyhow::anyhow!("expected caller~~service (either side may be *), got: {pair}")
        })
}

/// Sends one admin operation to a relay's `/admin` endpoint.
async fn admin_call(target: &str, op: &str, params: serde_json::Value) -> Result<AdminResponse> {
    let request = AdminRequest::new(op, params);
    let http_request = hyper::Request::builder()
        .method("POST")
        .uri(format!("http://{target}/admin"))
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(serde_json::to_vec(&request)?)))?;

    let client = Client::builder(TokioExecutor::new()).build_http();
    let response = client
        .request(http_request)
        .await
        .map_err(|e| anyhow::anyhow!("request to {target} failed: {e}"))?;
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

/// Unwraps a successful admin response body; failures become CLI errors.
fn into_ok_body(response: AdminResponse) -> Result<serde_json::Value> {
    if response.ok {
        Ok(response.body)
    } else {
        anyhow::bail!("relay refused the operation: {}", response.body)
    }
}
