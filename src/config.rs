use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token required by the service-role endpoints.
    pub service_token: Option<String>,

    /// VAPID key material. Optional at startup; its absence surfaces as a
    /// 500 on the first send, not as a boot failure.
    pub vapid: Option<VapidConfig>,

    /// Legacy server key for the FCM provider family.
    pub fcm_server_key: Option<String>,

    #[serde(default = "default_push_timeout_secs")]
    pub push_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VapidConfig {
    /// Base64url-encoded uncompressed P-256 public point.
    pub public_key: String,
    /// Base64url-encoded 32-byte P-256 scalar.
    pub private_key: String,
    /// Contact subject, e.g. "mailto:ops@example.com".
    pub subject: String,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("push-dispatch");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("dispatch.db").to_string_lossy().to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_push_timeout_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            port: default_port(),
            service_token: None,
            vapid: None,
            fcm_server_key: None,
            push_timeout_secs: default_push_timeout_secs(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config =
                toml::from_str(&content).map_err(|e| AppError::Config(e.to_string()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("push-dispatch")
            .join("config.toml")
    }
}
