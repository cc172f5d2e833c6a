mod server;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use fanout_core::{
    bootstrap::load_config,
    config::{ForwardingMode, SfuSettings},
    logging, Config,
};
use fanout_sfu::{ForwardingPolicy, RtcEngine, SfuConfig, SfuManager};

use server::FanoutServer;

#[derive(Parser, Debug)]
#[command(name = "fanout")]
#[command(about = "Many-to-many WebSocket signaled SFU", long_about = None)]
struct Args {
    /// HTTP service address, e.g. `:8080` or `127.0.0.1:8080`
    #[arg(long, env = "FANOUT_ADDR")]
    addr: Option<String>,

    /// Path to a YAML config file
    #[arg(long)]
    config: Option<String>,
}

/// Apply a `host:port` override; an empty host means all interfaces
fn apply_addr(config: &mut Config, addr: &str) -> Result<()> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("Invalid address '{addr}': expected host:port"))?;
    let port: u16 = port
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid port in address '{addr}': {e}"))?;

    config.server.host = if host.is_empty() {
        "0.0.0.0".to_string()
    } else {
        host.to_string()
    };
    config.server.http_port = port;
    Ok(())
}

fn sfu_config(settings: &SfuSettings) -> SfuConfig {
    SfuConfig {
        policy: match settings.forwarding {
            ForwardingMode::Mesh => ForwardingPolicy::Mesh,
            ForwardingMode::Broadcast => ForwardingPolicy::Broadcast,
        },
        max_sync_attempts: settings.max_sync_attempts,
        sync_retry_cooldown: Duration::from_millis(settings.sync_retry_cooldown_ms),
        keyframe_interval: Duration::from_millis(settings.keyframe_interval_ms),
        rtp_buffer_size: settings.rtp_buffer_size,
        ice_servers: settings.ice_servers.clone(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let mut config = load_config(args.config.as_deref())?;
    if let Some(addr) = &args.addr {
        apply_addr(&mut config, addr)?;
    }

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("Fanout SFU starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Initialize the SFU
    let sfu_config = sfu_config(&config.sfu);
    let engine = Arc::new(RtcEngine::new(&sfu_config)?);
    let manager = SfuManager::new(sfu_config);

    // 4. Serve until shutdown
    FanoutServer::new(config, manager, engine).start().await
}
