//! ShardCache Broker Binary
//!
//! Starts the broker that nodes register with and clients talk to.

use std::sync::Arc;

use clap::Parser;
use shardcache::network::{Server, TcpConnector};
use shardcache::{Broker, Config};
use tracing_subscriber::{fmt, EnvFilter};

/// ShardCache Broker
#[derive(Parser, Debug)]
#[command(name = "shardcache-broker")]
#[command(about = "Routes cache requests to storage nodes")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7070")]
    listen: String,

    /// Virtual ring positions per node
    #[arg(short, long, default_value = "32")]
    replicas: usize,

    /// Timeout of each call to a node, in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Keep nodes in the membership even when they stop answering
    #[arg(long)]
    keep_unreachable: bool,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shardcache=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("ShardCache Broker v{}", shardcache::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    let config = Config::builder()
        .listen_addr(&args.listen)
        .replicas_per_shard(args.replicas)
        .request_timeout_ms(args.timeout_ms)
        .max_connections(args.max_connections)
        .evict_unreachable(!args.keep_unreachable)
        .build();

    let connector = Arc::new(TcpConnector::new(config.clone()));
    let broker = match Broker::new(config.clone(), connector) {
        Ok(b) => Arc::new(b),
        Err(e) => {
            tracing::error!("Invalid broker configuration: {}", e);
            std::process::exit(1);
        }
    };

    let mut server = Server::new(config, broker);
    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Broker stopped");
}
