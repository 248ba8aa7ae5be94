mod config;
mod directory;
mod handler;
mod services;

use crate::config::StubConfig;
use crate::directory::PlayerDirectory;
use crate::handler::ConnectionHandler;
use crate::services::ServiceContext;
use scaffolding_proto::{generate_machine_id, PlayerProfile, ProfileKind};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = load_config()?;

    // Initialize logging
    init_logging(&config);

    info!("Scaffolding stub v{} starting...", env!("CARGO_PKG_VERSION"));

    let machine_id = match &config.host.machine_id {
        Some(id) => {
            hex::decode(id)
                .map_err(|_| anyhow::anyhow!("Invalid host machine_id: must be hex-encoded"))?;
            id.clone()
        }
        None => generate_machine_id(),
    };

    let host_profile = PlayerProfile {
        name: config.host.name.clone(),
        machine_id,
        vendor: config.host.vendor.clone(),
        kind: ProfileKind::Host,
    };

    if config.host.ready {
        info!("Host ready, reporting server port {}", config.host.server_port);
    } else {
        info!("Host not ready, c:server_port will answer status 32");
    }

    let context = Arc::new(ServiceContext {
        directory: PlayerDirectory::new(host_profile, config.players.player_ttl_secs)?,
        host: config.host.clone(),
        kind_encoding: config.players.kind_encoding,
    });

    let handler = Arc::new(ConnectionHandler::new(
        context,
        config.limits.max_frame_bytes,
        config.limits.read_timeout_secs,
        config.limits.write_timeout_secs,
    ));

    // Create connection limit semaphore
    let connection_semaphore = Arc::new(Semaphore::new(config.limits.max_conns));

    let listen_addr = format!("{}:{}", config.server.listen_addr, config.server.listen_port);
    let listener = TcpListener::bind(&listen_addr).await?;

    info!("Listening on {}", listen_addr);
    info!("Maximum concurrent connections: {}", config.limits.max_conns);

    loop {
        // Acquire connection slot
        let permit = connection_semaphore.clone().acquire_owned().await?;

        let (stream, remote_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                continue;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", remote_addr, e);
        }

        let handler = handler.clone();

        tokio::spawn(async move {
            handler.handle(stream, remote_addr.to_string()).await;
            drop(permit); // Release connection slot
        });
    }
}

fn load_config() -> anyhow::Result<StubConfig> {
    // Try configs/stub.toml (development)
    if let Ok(config) = StubConfig::from_file("configs/stub.toml") {
        info!("Loaded config from configs/stub.toml");
        return Ok(config);
    }

    // Try ./stub.toml (current directory)
    if let Ok(config) = StubConfig::from_file("stub.toml") {
        info!("Loaded config from stub.toml");
        return Ok(config);
    }

    warn!("No config file found, using default configuration");
    Ok(StubConfig::default_config())
}

fn init_logging(config: &StubConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.log_level));

    if config.logging.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }
}
