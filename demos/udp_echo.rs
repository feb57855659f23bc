//! UDP echo service (RFC 862) on a TAP device
//!
//! Usage:
//!   sudo cargo run --example udp_echo -- --tap tap0
//!
//! Then test from the host with:
//!   ping 10.0.0.7
//!   nc -u 10.0.0.7 7

mod utils;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::thread;
use std::time::Duration;

use clap::Parser;
use toy_netstack::socket::{Endpoint, SocketHandle, TransportProtocol};
use toy_netstack::{MacAddr, NetworkInterface, StackConfig, StackError};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tun_tap::{Iface, Mode};
use utils::network::configure_interface;

#[derive(Parser, Debug)]
#[command(version, about = "UDP echo service on a user-space stack", long_about = None)]
struct Args {
    /// TAP device to create
    #[arg(long, default_value = "tap0")]
    tap: String,

    /// Address given to the host side of the TAP device
    #[arg(long, default_value = "10.0.0.254/24")]
    host_cidr: String,

    /// IPv4 address of the stack
    #[arg(long, default_value = "10.0.0.7")]
    address: Ipv4Addr,

    /// IPv6 address of the stack
    #[arg(long)]
    ipv6: Option<Ipv6Addr>,

    /// Link address of the stack
    #[arg(long, default_value = "02:00:00:77:77:77")]
    mac: MacAddr,

    /// Port the echo service listens on
    #[arg(short, long, default_value_t = 7)]
    port: u16,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let tap = Iface::without_packet_info(&args.tap, Mode::Tap)?;
    configure_interface(tap.name(), &args.host_cidr)?;
    tap.set_non_blocking()?;

    let mut config = StackConfig::new(args.mac, args.address);
    if let Some(ipv6) = args.ipv6 {
        config = config.with_ipv6(ipv6);
    }
    let mut stack = NetworkInterface::new(config, tap);

    let listener = stack
        .registry()
        .listen(TransportProtocol::Udp, Endpoint::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), args.port))?;
    info!("Echo service listening on {}", listener.id());
    thread::spawn(move || serve(listener));

    loop {
        if !stack.poll()? {
            thread::sleep(Duration::from_millis(1));
        }
    }
}

/// Accept peers and echo each of them on its own thread
fn serve(listener: SocketHandle) {
    loop {
        let conn = match listener.accept() {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Echo service stopped: {}", e);
                return;
            }
        };
        info!("Echo service accepted {}", conn.id());
        thread::spawn(move || echo(conn));
    }
}

fn echo(conn: SocketHandle) {
    loop {
        let result = conn.receive().and_then(|payload| {
            info!("Echo service {} bytes from {}", payload.len(), conn.id().remote);
            conn.send(payload)
        });
        match result {
            Ok(()) => {}
            Err(StackError::SocketClosed(_)) => return,
            Err(e) => warn!("Echo service on {}: {}", conn.id(), e),
        }
    }
}
