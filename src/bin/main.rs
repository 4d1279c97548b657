//! pushrelayd daemon binary

use clap::Parser;
use futures::prelude::*;
use pushrelay::config::{Config, DEFAULT_CONFIG_PATH};
use pushrelay::provider::r#impl::ApnsProvider;
use pushrelay::store::r#impl::SQLiteRegistrationStore;
use pushrelay::{Dispatcher, RelayServer};
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(version, about = "Relay mail server notifications to Apple Push Notification service")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Socket path, overriding the configuration file
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Certificate path, overriding the configuration file
    #[arg(long)]
    certificate: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(socket) = args.socket {
        config.socket = socket;
    }
    if let Some(certificate) = args.certificate {
        config.provider.certificate = certificate;
    }
    config.debug |= args.debug;

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if config.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    config.validate()?;

    log::debug!("Opening registration store {}", config.store.path.display());
    let store = Arc::new(
        SQLiteRegistrationStore::open(
            &config.store.path,
            config.store.queries()?,
            config.store.create_schema,
        )
        .await?,
    );
    let provider = Arc::new(ApnsProvider::from_config(&config.provider).await?);
    let topic = provider.topic().to_string();

    let dispatcher = Arc::new(Dispatcher::with_store(store, provider, topic));
    let server = RelayServer::new(dispatcher, config.max_connections);

    log::info!(
        "Starting pushrelayd {} on {}",
        env!("CARGO_PKG_VERSION"),
        config.socket.display()
    );

    // Set up signal handling for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signals = Signals::new([SIGTERM, SIGINT, SIGHUP])?;
    let handle = signals.handle();

    let signal_task = tokio::spawn(async move {
        let mut signals = signals.fuse();
        if let Some(signal) = signals.next().await {
            let signal_name = match signal {
                SIGTERM => "SIGTERM",
                SIGINT => "SIGINT",
                SIGHUP => "SIGHUP",
                _ => "unknown signal",
            };
            log::info!("Received {}, shutting down", signal_name);
            let _ = shutdown_tx.send(true);
        }
    });

    let result = server
        .listen(&config.socket, config.socket_mode, shutdown_rx)
        .await;

    handle.close();
    signal_task.abort();

    result?;
    log::info!("Shutdown complete");
    Ok(())
}
