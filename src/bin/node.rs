//! ShardCache Node Binary
//!
//! Serves a cache store, registers with the broker, and unregisters when
//! stdin closes or `quit` is entered.

use std::io::BufRead;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use shardcache::network::{Server, TcpLink};
use shardcache::{Config, Node};
use tracing_subscriber::{fmt, EnvFilter};

/// ShardCache Node
#[derive(Parser, Debug)]
#[command(name = "shardcache-node")]
#[command(about = "Storage node for the ShardCache cluster")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7071")]
    listen: String,

    /// Address reported to the broker (defaults to the listen address)
    #[arg(short, long)]
    advertise: Option<String>,

    /// Broker address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7070")]
    broker: String,

    /// Node identity (a UUID is generated when omitted)
    #[arg(long)]
    id: Option<String>,

    /// Timeout of each call to the broker, in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    /// Upper bound on the shutdown unregister, in milliseconds
    #[arg(long, default_value = "2000")]
    unregister_timeout_ms: u64,
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

    let mut builder = Config::builder()
        .listen_addr(&args.listen)
        .broker_addr(&args.broker)
        .request_timeout_ms(args.timeout_ms)
        .unregister_timeout_ms(args.unregister_timeout_ms);
    if let Some(advertise) = &args.advertise {
        builder = builder.advertise_addr(advertise);
    }
    if let Some(id) = &args.id {
        builder = builder.node_id(id);
    }
    let config = builder.build();

    tracing::info!("ShardCache Node v{}", shardcache::VERSION);
    tracing::info!("Broker address: {}", config.broker_addr);

    let broker = Arc::new(TcpLink::new(config.broker_addr.as_str(), &config));
    let node = Arc::new(Node::new(&config, broker));
    tracing::info!("Node ID: {}", node.id());

    // Listen before registering: the broker connects back during register
    let mut server = Server::new(config, node.clone());
    if let Err(e) = server.bind() {
        tracing::error!("Cannot listen: {}", e);
        std::process::exit(1);
    }
    let shutdown = server.shutdown_handle();
    let server_thread = thread::spawn(move || server.run());

    if let Err(e) = node.register() {
        tracing::error!("Registration failed: {}", e);
        shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
        let _ = server_thread.join();
        std::process::exit(1);
    }

    tracing::info!("Serving; type `quit` or close stdin to stop");
    for line in std::io::stdin().lock().lines() {
        match line {
            Ok(line) if line.trim() == "quit" => break,
            Ok(_) => {}
            Err(_) => break,
        }
    }

    tracing::info!("Shutting down...");
    node.unregister();
    shutdown.store(true, std::sync::atomic::Ordering::Relaxed);

    match server_thread.join() {
        Ok(Ok(())) => tracing::info!("Node stopped"),
        Ok(Err(e)) => tracing::error!("Server error: {}", e),
        Err(_) => tracing::error!("Server thread panicked"),
    }
}
