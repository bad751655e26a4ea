//! Gateway configuration
//!
//! Settings come from an optional TOML file (path in `DEVICE_CONFIG`),
//! then the `DEVICE_*` environment variables override individual fields.
//! Anything left unset falls back to the defaults below, so the gateway
//! starts with no configuration at all.

use crate::mqtt::config::MqttConfig;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CONFIG_PATH_VAR: &str = "DEVICE_CONFIG";
const ENV_PREFIX: &str = "DEVICE_";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub device: DeviceConfig,
    pub mqtt: MqttConfig,
}

/// HTTP listener and CORS settings
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Certificate served for HTTPS. Plain HTTP when unset.
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub ui_protocol: String,
    pub ui_host: String,
    pub ui_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            cert_file: None,
            key_file: None,
            ui_protocol: "http".to_string(),
            ui_host: "localhost".to_string(),
            ui_port: 3000,
        }
    }
}

impl ServerConfig {
    /// The only origin CORS lets through
    pub fn ui_origin(&self) -> String {
        format!("{}://{}:{}", self.ui_protocol, self.ui_host, self.ui_port)
    }

    /// Certificate and key, when both are configured
    pub fn tls_files(&self) -> Option<(&Path, &Path)> {
        match (&self.cert_file, &self.key_file) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceConfig {
    /// CA bundle used to verify brokers
    pub ca_path: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            ca_path: PathBuf::from("certs/ca.crt"),
        }
    }
}

impl Config {
    /// Loads the file named by `DEVICE_CONFIG`, if any, and applies
    /// environment overrides.
    pub async fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(&path).await?,
            Err(_) => {
                debug!("{} not set, starting from defaults", CONFIG_PATH_VAR);
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())?;
        Ok(config)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Overrides fields from `lookup`, which maps an unprefixed variable
    /// name (`PORT`, `CAPATH`, ...) to its value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| eyre!("Invalid {}PORT {:?}: {}", ENV_PREFIX, port, e))?;
        }
        if let Some(ui_port) = lookup("UIPORT") {
            self.server.ui_port = ui_port
                .parse()
                .map_err(|e| eyre!("Invalid {}UIPORT {:?}: {}", ENV_PREFIX, ui_port, e))?;
        }
        if let Some(host) = lookup("UIHOST") {
            self.server.ui_host = host;
        }
        if let Some(protocol) = lookup("UIPROTOCOL") {
            self.server.ui_protocol = protocol;
        }
        if let Some(ca_path) = lookup("CAPATH") {
            self.device.ca_path = PathBuf::from(ca_path);
        }
        if let Some(cert_file) = lookup("CERTFILE") {
            self.server.cert_file = Some(PathBuf::from(cert_file));
        }
        if let Some(key_file) = lookup("KEYFILE") {
            self.server.key_file = Some(PathBuf::from(key_file));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.ui_origin(), "http://localhost:3000");
        assert!(config.server.tls_files().is_none());
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PORT", "8443"),
            ("UIHOST", "ui.local"),
            ("UIPORT", "443"),
            ("UIPROTOCOL", "https"),
            ("CAPATH", "/certs/ca.pem"),
            ("CERTFILE", "/certs/server.crt"),
            ("KEYFILE", "/certs/server.key"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 8443);
        assert_eq!(config.server.ui_origin(), "https://ui.local:443");
        assert_eq!(config.device.ca_path, PathBuf::from("/certs/ca.pem"));
        assert!(config.server.tls_files().is_some());
    }

    #[test]
    fn invalid_port_is_an_error() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| (key == "PORT").then(|| "http".to_string()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn loads_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[server]\nport = 9000\n\n[mqtt]\nsubscribe_topics = [\"devices/sample\"]\n"
        )
        .unwrap();

        let config = Config::from_file(file.path()).await.unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.ui_host, "localhost");
        assert_eq!(config.mqtt.subscribe_topics, vec!["devices/sample".to_string()]);
    }
}
