use clap::Parser;
use sicore::{SiConfig, TimestampClient};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Timestamp authority client
#[derive(Parser, Debug)]
#[command(name = "sicore-ts")]
#[command(about = "Requests timestamps from a running sicore-tsd", long_about = None)]
struct Args {
    /// Server address (defaults to timestamp_bind from config)
    #[arg(short = 'a', long)]
    addr: Option<String>,

    /// Number of timestamps to request
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,

    /// Send all requests concurrently over the one connection
    #[arg(long)]
    concurrent: bool,

    /// Per-request timeout in milliseconds
    #[arg(short = 't', long)]
    timeout_ms: Option<u64>,

    /// Config file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SiConfig::load_from(Some(path.as_path()))?,
        None => SiConfig::load()?,
    };
    let addr = args.addr.unwrap_or(config.timestamp_bind);
    let timeout = args
        .timeout_ms
        .map_or_else(|| Duration::from_millis(config.timestamp_request_timeout_ms), Duration::from_millis);

    let client = match TimestampClient::connect(&addr, timeout).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("✗ Connection to {addr} failed: {e}");
            return Err(e.into());
        }
    };

    if args.concurrent {
        let mut tasks = Vec::with_capacity(args.count);
        for _ in 0..args.count {
            let client = Arc::clone(&client);
            tasks.push(tokio::spawn(async move { client.next_timestamp().await }));
        }
        for task in tasks {
            println!("{}", task.await??);
        }
    } else {
        for _ in 0..args.count {
            println!("{}", client.next_timestamp().await?);
        }
    }

    Ok(())
}
