//! Runs a server, a relay and a client as overlay nodes on loopback addresses 127.0.0.1-3
//!  (works out of the box on Linux), printing trace lines for all packet events.

use clap::Parser;
use clap_derive::Parser;
use ronrelay::client::client_config::OverlayClientConfig;
use ronrelay::client::overlay_client::OverlayClient;
use ronrelay::path::random_heuristic::RandomPathHeuristic;
use ronrelay::peers::peer_entry::{Location, StaticNode};
use ronrelay::peers::peer_registry::PeerRegistry;
use ronrelay::server::overlay_server::{OverlayServer, OverlayServerConfig};
use ronrelay::trace::hooks::TraceKind;
use ronrelay::trace::logging_sink::LoggingTraceSink;
use ronrelay::trace::trace_line_sink::TraceLineSink;
use ronrelay::transport::udp::UdpTransport;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::RwLock;
use tracing::{info, Level};

#[derive(Parser)]
struct Args {
    #[clap(long, default_value_t = 9009)]
    port: u16,

    #[clap(long, default_value_t = 5)]
    max_packets: u32,

    #[clap(long, default_value_t = 500)]
    timeout_millis: u64,

    #[clap(long, default_value_t = 1000)]
    interval_millis: u64,

    #[clap(long, default_value = "hello overlay")]
    fill: String,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,
}

const SERVER: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);
const RELAY: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 2);
const CLIENT: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 3);

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .try_init()
        .ok();

    let mut registry = PeerRegistry::new();
    for (id, address) in [(1, SERVER), (2, RELAY), (3, CLIENT)] {
        registry.add_node(&StaticNode { id, address, location: Location::new(id as f64, 0.0, 0.0) });
    }
    let registry = Arc::new(RwLock::new(registry));

    let mut server = OverlayServer::new(
        OverlayServerConfig { listen_port: args.port },
        Arc::new(UdpTransport::bind(SERVER, args.port).await?),
    );

    let mut relay_config = OverlayClientConfig::new(SERVER);
    relay_config.listen_port = args.port;
    relay_config.max_packets = 0;
    let mut relay = OverlayClient::new(
        2,
        relay_config,
        Arc::new(UdpTransport::bind(RELAY, args.port).await?),
        Box::new(RandomPathHeuristic::new(registry.clone())),
        registry.clone(),
    )?;

    let mut client_config = OverlayClientConfig::new(SERVER);
    client_config.listen_port = args.port;
    client_config.max_packets = args.max_packets;
    client_config.timeout = Duration::from_millis(args.timeout_millis);
    client_config.send_interval = Duration::from_millis(args.interval_millis);
    client_config.set_fill_str(&args.fill);
    client_config.stop_at = Some(Duration::from_millis(args.interval_millis * (args.max_packets as u64 + 1) + args.timeout_millis));
    let mut client = OverlayClient::new(
        3,
        client_config,
        Arc::new(UdpTransport::bind(CLIENT, args.port).await?),
        Box::new(RandomPathHeuristic::new(registry.clone())),
        registry,
    )?;

    let trace_lines = Arc::new(TraceLineSink::new(std::io::stdout()));
    client.hooks_mut().register_all(trace_lines.clone());
    client.hooks_mut().register_all(Arc::new(LoggingTraceSink));
    relay.hooks_mut().register(TraceKind::Forwarded, trace_lines);

    select! {
        r = client.run() => {
            info!("client finished");
            r
        }
        r = relay.run() => r,
        r = server.run() => r,
    }
}
