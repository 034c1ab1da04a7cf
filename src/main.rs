use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use sniffsight::api::routes;
use sniffsight::api::websocket::{pump_events, EVENT_BUFFER};
use sniffsight::capture::engine::EngineState;
use sniffsight::dispatch::{Command, Dispatcher};
use sniffsight::models::config::{AppConfig, PortLookup};
use sniffsight::models::detail::EngineEvent;
use sniffsight::utils::logging;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Packet sniffer that groups traffic into conversations and explains packets on demand")]
struct Args {
    /// Network interface to start capturing on
    #[clap(short, long)]
    interface: Option<String>,

    /// Port for the REST API server
    #[clap(short, long)]
    port: Option<u16>,

    /// Enable promiscuous mode
    #[clap(short = 'P', long)]
    promiscuous: bool,

    /// BPF filter expression
    #[clap(long)]
    filter: Option<String>,

    /// Bytes captured per frame
    #[clap(long)]
    snaplen: Option<i32>,

    /// Capture read timeout in milliseconds
    #[clap(long)]
    read_timeout_ms: Option<i32>,

    /// Reverse DNS cache size
    #[clap(long)]
    cache_capacity: Option<usize>,

    /// Worker threads for packet descriptions
    #[clap(long)]
    detail_workers: Option<usize>,

    /// Base URL of the Ollama server
    #[clap(long)]
    ollama_url: Option<String>,

    /// Model used for packet descriptions
    #[clap(long)]
    ollama_model: Option<String>,

    /// Identify ports with the well-known port table instead of nmap
    #[clap(long)]
    no_nmap: bool,

    /// JSON configuration file; command line options take precedence
    #[clap(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[clap(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => AppConfig::default(),
        };

        if self.interface.is_some() {
            config.interface = self.interface;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.promiscuous {
            config.promiscuous = true;
        }
        if self.filter.is_some() {
            config.filter = self.filter;
        }
        if let Some(snaplen) = self.snaplen {
            config.snaplen = snaplen;
        }
        if let Some(timeout) = self.read_timeout_ms {
            config.read_timeout_ms = timeout;
        }
        if let Some(capacity) = self.cache_capacity {
            config.cache_capacity = capacity;
        }
        if let Some(workers) = self.detail_workers {
            config.detail_workers = workers;
        }
        if let Some(url) = self.ollama_url {
            config.ollama_url = url;
        }
        if let Some(model) = self.ollama_model {
            config.ollama_model = model;
        }
        if self.no_nmap {
            config.port_lookup = PortLookup::Table;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    // Check if running as administrator on Windows
    #[cfg(target_os = "windows")]
    {
        use std::process::Command;

        let is_admin = Command::new("powershell")
            .args(&["-Command", "[bool](([System.Security.Principal.WindowsIdentity]::GetCurrent()).groups -match 'S-1-5-32-544')"])
            .output()
            .map(|output| String::from_utf8_lossy(&output.stdout).trim() == "True")
            .unwrap_or(false);

        if !is_admin {
            log::warn!("Not running with administrator privileges; capture will likely fail.");
        }
    }

    let args = Args::parse();
    logging::init_logger(logging::get_log_level(&args.log_level));
    info!("Starting sniffsight v{}", env!("CARGO_PKG_VERSION"));

    let config = args.into_config()?;

    // The dispatcher owns blocking clients with their own runtimes, so it is
    // built and dropped here rather than inside the actix system.
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let dispatcher = Arc::new(Dispatcher::from_config(&config, events_tx)?);

    if let Some(interface) = &config.interface {
        match dispatcher.dispatch(Command::Start {
            interface: interface.clone(),
        }) {
            Ok(_) => info!("Capturing on {}", interface),
            Err(e) => warn!("Could not start capture on {}: {}", interface, e),
        }
    }

    let result = actix_web::rt::System::new().block_on(serve(config.port, dispatcher.clone(), events_rx));

    info!("Shutting down");
    dispatcher.shutdown();
    if dispatcher.engine().state() != EngineState::Idle {
        if let Ok(stats) = dispatcher.engine().join() {
            info!("Final session filed {} packets", stats.filed_packets);
        }
    }

    result
}

async fn serve(
    port: u16,
    dispatcher: Arc<Dispatcher>,
    events: mpsc::UnboundedReceiver<EngineEvent>,
) -> Result<()> {
    let (feed, _) = broadcast::channel(EVENT_BUFFER);
    actix_web::rt::spawn(pump_events(events, dispatcher.clone(), feed.clone()));

    let dispatcher_data = web::Data::new(dispatcher);
    let feed_data = web::Data::new(feed);

    info!("Starting API server on port {}", port);
    HttpServer::new(move || {
        App::new()
            .app_data(dispatcher_data.clone())
            .app_data(feed_data.clone())
            .configure(routes::configure)
    })
    .bind(("127.0.0.1", port))?
    .run()
    .await?;

    Ok(())
}
