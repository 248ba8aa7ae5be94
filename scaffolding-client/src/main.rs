mod checks;
mod config;

use crate::checks::{report, Check, CheckRunner};
use crate::config::ClientConfig;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

/// Checks a Scaffolding service over its framed TCP protocol
#[derive(Debug, Parser)]
#[command(name = "scaffolding-check", version)]
struct Args {
    /// Service host (default: 127.0.0.1)
    #[arg(long)]
    host: Option<String>,

    /// Service port (default: 13448)
    #[arg(long)]
    port: Option<u16>,

    /// Check to run
    #[arg(long, value_enum, default_value = "all")]
    test: Check,

    /// Config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Connect/read/write timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Player name for c:player_ping
    #[arg(long)]
    name: Option<String>,

    /// Player machine id for c:player_ping
    #[arg(long)]
    machine_id: Option<String>,

    /// Player vendor for c:player_ping
    #[arg(long)]
    vendor: Option<String>,
}

fn main() -> anyhow::Result<ExitCode> {
    init_logging();

    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);

    let session = config.session_config();
    info!("Checking {} ({:?})", session.addr(), args.test);

    let runner = CheckRunner::new(session, config.fingerprint()?, config.player());
    let outcomes = runner.run(args.test);

    if report(&outcomes) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn apply_overrides(config: &mut ClientConfig, args: &Args) {
    if let Some(host) = &args.host {
        config.service.host = host.clone();
    }
    if let Some(port) = args.port {
        config.service.port = port;
    }
    if let Some(secs) = args.timeout {
        config.timeouts.connect_timeout_secs = secs;
        config.timeouts.read_timeout_secs = secs;
        config.timeouts.write_timeout_secs = secs;
    }
    if let Some(name) = &args.name {
        config.player.name = name.clone();
    }
    if let Some(machine_id) = &args.machine_id {
        config.player.machine_id = Some(machine_id.clone());
    }
    if let Some(vendor) = &args.vendor {
        config.player.vendor = vendor.clone();
    }
}

fn load_config(explicit: Option<&std::path::Path>) -> anyhow::Result<ClientConfig> {
    if let Some(path) = explicit {
        let config = ClientConfig::from_file(path)?;
        info!("Loaded config from {}", path.display());
        return Ok(config);
    }

    // Try configs/client.toml (development)
    if let Ok(config) = ClientConfig::from_file("configs/client.toml") {
        info!("Loaded config from configs/client.toml");
        return Ok(config);
    }

    // Try ./client.toml (current directory)
    if let Ok(config) = ClientConfig::from_file("client.toml") {
        info!("Loaded config from client.toml");
        return Ok(config);
    }

    warn!("No config file found, using default configuration");
    Ok(ClientConfig::default())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
