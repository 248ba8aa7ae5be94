use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StubConfig {
    pub server: ServerSettings,
    #[serde(default)]
    pub host: HostSettings,
    #[serde(default)]
    pub players: PlayerSettings,
    #[serde(default)]
    pub limits: LimitsSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    pub listen_addr: String,
    pub listen_port: u16,
}

/// The simulated host. There is no game server behind it; `ready` only
/// decides how `c:server_port` is answered.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostSettings {
    #[serde(default)]
    pub ready: bool,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default = "default_host_name")]
    pub name: String,
    /// Generated at startup when unset
    #[serde(default)]
    pub machine_id: Option<String>,
    #[serde(default = "default_vendor")]
    pub vendor: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KindEncoding {
    /// `"kind":"HOST"`
    Bare,
    /// `"kind":{"Value":"HOST"}`
    Wrapped,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerSettings {
    #[serde(default = "default_kind_encoding")]
    pub kind_encoding: KindEncoding,
    /// Players not heard from for this long are dropped (0 = never)
    #[serde(default = "default_player_ttl")]
    pub player_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsSettings {
    /// Maximum concurrent connections
    #[serde(default = "default_max_conns")]
    pub max_conns: usize,
    /// Maximum frame size in bytes
    #[serde(default = "default_max_frame")]
    pub max_frame_bytes: u32,
    /// Idle read timeout in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Write timeout in seconds
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Output logs as JSON
    #[serde(default)]
    pub json_logs: bool,
}

fn default_server_port() -> u16 {
    25565
}

fn default_host_name() -> String {
    "Host".to_string()
}

fn default_vendor() -> String {
    format!("scaffolding-stub {}", env!("CARGO_PKG_VERSION"))
}

fn default_kind_encoding() -> KindEncoding {
    KindEncoding::Bare
}

fn default_player_ttl() -> u64 {
    30
}

fn default_max_conns() -> usize {
    100
}

fn default_max_frame() -> u32 {
    scaffolding_proto::DEFAULT_MAX_FRAME_SIZE
}

fn default_read_timeout() -> u64 {
    30
}

fn default_write_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            ready: false,
            server_port: default_server_port(),
            name: default_host_name(),
            machine_id: None,
            vendor: default_vendor(),
        }
    }
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            kind_encoding: default_kind_encoding(),
            player_ttl_secs: default_player_ttl(),
        }
    }
}

impl Default for LimitsSettings {
    fn default() -> Self {
        Self {
            max_conns: default_max_conns(),
            max_frame_bytes: default_max_frame(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

impl StubConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: StubConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            server: ServerSettings {
                listen_addr: scaffolding_proto::DEFAULT_HOST.to_string(),
                listen_port: scaffolding_proto::DEFAULT_PORT,
            },
            host: HostSettings::default(),
            players: PlayerSettings::default(),
            limits: LimitsSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}
