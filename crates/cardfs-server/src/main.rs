//! cardfs server binary
//!
//! Serves an SD/MMC card over HTTP/WebDAV.
//!
//! ## Usage
//!
//! ```bash
//! # Serve the card the OS mounted at /media/sdcard
//! cardfs-server /media/sdcard
//!
//! # Settings from a RON file, with a port override
//! cardfs-server --config cardfs.ron --port 9000
//!
//! # No card directory: an in-memory volume for trying things out
//! cardfs-server
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cardfs_kernel::vfs::DEFAULT_MEMORY_CAPACITY;
use cardfs_kernel::{Card, CardSlot, DirectorySlot, MemorySlot};
use cardfs_server::{Dispatcher, ServerConfig};

/// HTTP/WebDAV file server for an SD/MMC card.
#[derive(Parser, Debug)]
#[command(name = "cardfs-server")]
#[command(about = "Serve an SD/MMC card over HTTP/WebDAV")]
struct Args {
    /// Directory holding the card's filesystem
    card_dir: Option<PathBuf>,

    /// RON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (host:port)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Port on the configured bind address
    #[arg(short, long)]
    port: Option<u16>,

    /// Absolute path the card is mounted at
    #[arg(long)]
    mount_point: Option<PathBuf>,

    /// Directory on the card served as /
    #[arg(long)]
    root: Option<String>,

    /// URL prefix to serve under
    #[arg(long)]
    prefix: Option<String>,

    /// Basic auth username (requires --password)
    #[arg(long, requires = "password")]
    user: Option<String>,

    /// Basic auth password
    #[arg(long, requires = "user")]
    password: Option<String>,

    /// Refuse all writes
    #[arg(long)]
    read_only: bool,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(dir) = self.card_dir {
            config = config.with_card_dir(dir);
        }
        if let Some(bind) = self.bind {
            config = config.with_bind_addr(bind);
        }
        if let Some(port) = self.port {
            config.bind_addr.set_port(port);
        }
        if let Some(mount_point) = self.mount_point {
            config = config.with_mount_point(mount_point);
        }
        if let Some(root) = self.root {
            config = config.with_root_path(root);
        }
        if let Some(prefix) = self.prefix {
            config = config.with_url_prefix(prefix);
        }
        if let (Some(user), Some(password)) = (self.user, self.password) {
            config = config.with_credentials(user, password);
        }
        if self.read_only {
            config = config.with_read_only(true);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Args::parse().into_config()?;
    run_server(config).await
}

async fn run_server(config: ServerConfig) -> Result<()> {
    let card = Arc::new(Card::new(&config.mount_point));

    let slot: Box<dyn CardSlot> = match &config.card_dir {
        Some(dir) => Box::new(DirectorySlot::new(dir).with_read_only(config.read_only)),
        None => {
            tracing::warn!("no card directory given, serving an in-memory volume");
            Box::new(MemorySlot::new(DEFAULT_MEMORY_CAPACITY))
        }
    };

    // The server keeps running without a card; storage requests then fail
    if let Err(e) = card.mount(slot.as_ref()).await {
        tracing::error!("{} ({})", e.code, e.detail);
    }

    if let Some(interval) = config.capacity_log_interval() {
        tokio::spawn(log_capacity(Arc::clone(&card), interval));
    }

    let bind_addr = config.bind_addr;
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&card), config)?);
    let app = cardfs_server::http::router(dispatcher);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;
    tracing::info!("Starting cardfs server on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    card.unmount();
    tracing::info!("cardfs server stopped");
    Ok(())
}

async fn log_capacity(card: Arc<Card>, every: std::time::Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        if !card.is_mounted() {
            continue;
        }
        let report = card.capacity().await;
        tracing::info!(
            card_type = %card.card_type(),
            total_mb = report.total_mb,
            used_mb = report.used_mb,
            free_mb = report.free_mb,
            "card capacity"
        );
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
