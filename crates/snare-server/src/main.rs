use clap::Parser;
use snare_server::admin_api::{AdminApiServer, AdminState};
use snare_server::config::Config;
use snare_server::events::EventBus;
use snare_server::pipeline::Pipeline;
use snare_server::server::{CaptureServer, TcpCaptureServer};
use snare_server::store::MemoryStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "snare-server", version, about = "Programmable traffic interception server")]
struct Args {
    /// Path to a YAML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level)),
        )
        .init();

    let store = Arc::new(MemoryStore::new());
    let events = EventBus::default();
    let pipeline = Arc::new(Pipeline::new(store.clone()));
    let shutdown = pipeline.shutdown_flag();

    let capture = CaptureServer::new(
        config.capture.addr,
        config.capture.max_body_bytes,
        Arc::clone(&pipeline),
    );
    tokio::spawn(async move {
        if let Err(e) = capture.run().await {
            error!("HTTP capture listener failed: {}", e);
        }
    });

    if config.tcp.enabled {
        let tcp = TcpCaptureServer::new(
            config.tcp.addr,
            config.tcp.chunk_bytes,
            Arc::clone(&pipeline),
        );
        tokio::spawn(async move {
            if let Err(e) = tcp.run().await {
                error!("TCP capture listener failed: {}", e);
            }
        });
    }

    let admin = AdminApiServer::new(config.admin.addr, AdminState::new(store, events));
    tokio::spawn(async move {
        if let Err(e) = admin.run().await {
            error!("Admin API failed: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    // In-flight scripts observe the flag through the engine progress hook.
    shutdown.store(true, Ordering::Relaxed);
    Ok(())
}
