//! A caching, policy-aware DNS forwarding resolver with local
//! authoritative records, domain blocklisting, and per-upstream
//! domain routing.
//!
//! This binary is the ambient stack wrapping `dns_resolver`'s query
//! engine into a runnable service: CLI, config loading, the UDP/TCP
//! listener loop, and a Prometheus metrics endpoint. Structured the
//! way `bin-resolved::main` wires up its own listener/metrics tasks.

mod config;
mod listener;
mod metrics;

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::{TcpListener, UdpSocket};
use tokio::time::sleep;

use dns_resolver::blocklist::Blocklist;
use dns_resolver::cache::SharedCache;
use dns_resolver::client::UdpTcpClient;
use dns_resolver::context::Context;
use dns_resolver::stats::Stats;
use dns_resolver::store::LocalStore;

const DNS_PORT: u16 = 53;

/// A caching, policy-aware DNS resolver for home and small networks.
///
/// Prometheus metrics are served at
/// "http://{metrics_interface}:{metrics_port}/metrics"
#[derive(Debug, Parser)]
struct Args {
    /// Interface to listen on for DNS queries
    #[clap(short, long, value_parser, default_value_t = Ipv4Addr::UNSPECIFIED)]
    interface: Ipv4Addr,

    /// Interface to listen on to serve Prometheus metrics
    #[clap(long, value_parser, default_value_t = Ipv4Addr::LOCALHOST)]
    metrics_interface: Ipv4Addr,

    /// Port to listen on to serve Prometheus metrics
    #[clap(long, value_parser, default_value_t = 9420)]
    metrics_port: u16,

    /// Path to the YAML configuration file (records, servers, blocklist, settings)
    #[clap(short, long, env = "RESOLVERD_CONFIG", value_parser)]
    config: PathBuf,
}

fn begin_logging() {
    let format = std::env::var("RUST_LOG_FORMAT").unwrap_or_default();
    let logger = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env());
    if format == "json" {
        logger.json().init();
    } else {
        logger.init();
    }
}

/// Delete expired cache entries every 5 minutes and refresh the
/// metrics mirror, per `bin-resolved::prune_cache_task`.
async fn prune_cache_task(cache: SharedCache, stats: Arc<Stats>) {
    loop {
        sleep(Duration::from_secs(60 * 5)).await;
        let removed = cache.prune(std::time::SystemTime::now());
        if removed > 0 {
            tracing::info!(%removed, "pruned expired cache entries");
        }
        metrics::sync_from_snapshot(stats.snapshot(), cache.len());
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    begin_logging();

    let loaded = match config::load(&args.config) {
        Ok(loaded) => loaded,
        Err(error) => {
            tracing::error!(%error, path = %args.config.display(), "could not load configuration");
            process::exit(1);
        }
    };

    let blocklist = match Blocklist::reload(loaded.blocklist) {
        Ok(blocklist) => blocklist,
        Err(error) => {
            tracing::error!(%error, "could not load blocklist");
            process::exit(1);
        }
    };

    let store = LocalStore::new(loaded.records, loaded.servers, loaded.settings);
    store.replace_blocklist(blocklist);

    let cache = SharedCache::new();
    let stats = Arc::new(Stats::new());
    let ctx = Arc::new(Context::new(UdpTcpClient::new(), store, cache.clone(), stats.clone()));

    tracing::info!(interface = %args.interface, port = %DNS_PORT, "binding DNS UDP socket");
    let udp = match UdpSocket::bind((args.interface, DNS_PORT)).await {
        Ok(socket) => socket,
        Err(error) => {
            tracing::error!(?error, "could not bind DNS UDP socket");
            process::exit(1);
        }
    };

    tracing::info!(interface = %args.interface, port = %DNS_PORT, "binding DNS TCP socket");
    let tcp = match TcpListener::bind((args.interface, DNS_PORT)).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(?error, "could not bind DNS TCP socket");
            process::exit(1);
        }
    };

    tokio::spawn(listener::listen_udp_task(ctx.clone(), udp));
    tokio::spawn(listener::listen_tcp_task(ctx.clone(), tcp));
    tokio::spawn(prune_cache_task(cache, stats));

    tracing::info!(interface = %args.metrics_interface, port = %args.metrics_port, "binding metrics HTTP socket");
    if let Err(error) =
        metrics::serve_prometheus_endpoint_task((args.metrics_interface, args.metrics_port).into()).await
    {
        tracing::error!(?error, "could not bind metrics HTTP socket");
        process::exit(1);
    }
}
