//! ShardCache CLI Client
//!
//! Command-line interface for interacting with a ShardCache broker.

use clap::{Parser, Subcommand};
use shardcache::{Client, Config};

/// ShardCache CLI
#[derive(Parser, Debug)]
#[command(name = "shardcache-cli")]
#[command(about = "CLI for the ShardCache cluster")]
struct Args {
    /// Broker address
    #[arg(short, long, default_value = "127.0.0.1:7070")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,

        /// Expire the key after this many seconds
        #[arg(long)]
        ttl: Option<u64>,

        /// Reply once the owning node has the value
        #[arg(long)]
        no_wait: bool,
    },

    /// Remove a key
    Remove {
        /// The key to remove
        key: String,

        /// Reply once the owning node has removed it
        #[arg(long)]
        no_wait: bool,
    },

    /// Ping the broker
    Ping,
}

fn main() {
    let args = Args::parse();

    let config = Config::builder().broker_addr(&args.server).build();
    let client = match Client::connect(&config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Cannot connect to {}: {}", args.server, e);
            std::process::exit(1);
        }
    };

    let result = match args.command {
        Commands::Get { key } => client.get(&key).map(|value| match value {
            Some(v) => String::from_utf8_lossy(&v).into_owned(),
            None => "(nil)".to_string(),
        }),
        Commands::Set {
            key,
            value,
            ttl,
            no_wait,
        } => client
            .set_with(&key, value.into_bytes(), ttl, !no_wait)
            .map(|_| "OK".to_string()),
        Commands::Remove { key, no_wait } => client
            .remove_with(&key, !no_wait)
            .map(|existed| if existed { "1" } else { "0" }.to_string()),
        Commands::Ping => client.ping().map(|_| "PONG".to_string()),
    };

    match result {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
