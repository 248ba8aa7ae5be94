use scaffolding_proto::{
    generate_machine_id, PlayerRegistration, SessionConfig, DEFAULT_HOST, DEFAULT_MAX_FRAME_SIZE,
    DEFAULT_PORT, PING_FINGERPRINT,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub player: PlayerSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_frame")]
    pub max_frame_bytes: u32,
    /// Fingerprint sent with `c:ping` (hex-encoded)
    #[serde(default = "default_fingerprint")]
    pub fingerprint: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_timeout")]
    pub write_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerSettings {
    #[serde(default = "default_player_name")]
    pub name: String,
    /// Generated once per run when unset
    #[serde(default)]
    pub machine_id: Option<String>,
    #[serde(default = "default_vendor")]
    pub vendor: String,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_frame() -> u32 {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_fingerprint() -> String {
    hex::encode(PING_FINGERPRINT)
}

fn default_timeout() -> u64 {
    5
}

fn default_player_name() -> String {
    "TestPlayer".to_string()
}

fn default_vendor() -> String {
    "TestLauncher 1.0".to_string()
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_frame_bytes: default_max_frame(),
            fingerprint: default_fingerprint(),
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_timeout(),
            read_timeout_secs: default_timeout(),
            write_timeout_secs: default_timeout(),
        }
    }
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            name: default_player_name(),
            machine_id: None,
            vendor: default_vendor(),
        }
    }
}

impl ClientConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            host: self.service.host.clone(),
            port: self.service.port,
            connect_timeout: Duration::from_secs(self.timeouts.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.timeouts.read_timeout_secs),
            write_timeout: Duration::from_secs(self.timeouts.write_timeout_secs),
            max_frame_size: self.service.max_frame_bytes,
        }
    }

    pub fn fingerprint(&self) -> anyhow::Result<Vec<u8>> {
        hex::decode(&self.service.fingerprint)
            .map_err(|_| anyhow::anyhow!("Invalid fingerprint: must be hex-encoded"))
    }

    pub fn player(&self) -> PlayerRegistration {
        let machine_id = self
            .player
            .machine_id
            .clone()
            .unwrap_or_else(generate_machine_id);
        PlayerRegistration::new(&self.player.name, machine_id, &self.player.vendor)
    }
}
