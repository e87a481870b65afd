use clap::Parser;
use sicore::timestamp::FileBlockManager;
use sicore::{SiConfig, TimestampServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Standalone timestamp authority
#[derive(Parser, Debug)]
#[command(name = "sicore-tsd")]
#[command(about = "Serves strictly increasing timestamps over TCP", long_about = None)]
struct Args {
    /// Config file (defaults: /etc/sicore/sicore.toml, ./sicore.toml)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:60012
    #[arg(short = 'b', long)]
    bind: Option<String>,

    /// Directory holding the timestamp high-water mark
    #[arg(short = 'D', long)]
    data_dir: Option<PathBuf>,

    /// Timestamps reserved per durable write
    #[arg(long)]
    block_size: Option<u64>,
}

impl Args {
    /// CLI args override everything loaded from file and ENV
    fn apply(self, mut config: SiConfig) -> SiConfig {
        if let Some(bind) = self.bind {
            config.timestamp_bind = bind;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(block_size) = self.block_size {
            config.timestamp_block_size = block_size;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SiConfig::load_from(Some(path.as_path()))?,
        None => SiConfig::load()?,
    };
    let config = args.apply(config);
    config.validate()?;

    tracing::info!(
        "Starting timestamp authority: bind={}, data_dir={}, block_size={}",
        config.timestamp_bind,
        config.data_dir.display(),
        config.timestamp_block_size
    );

    let block_manager = Arc::new(FileBlockManager::open(&config.data_dir)?);
    let server = Arc::new(TimestampServer::new(block_manager, config.timestamp_block_size));
    server.start(&config.timestamp_bind).await?;

    Ok(())
}
