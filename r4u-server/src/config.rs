// Copyright 2025 R4U Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Server configuration: file > env > defaults, generalizing the teacher's
//! `ServerConfig`/`from_file`/`from_env`/`load`/`merge_with_env` shape
//! (`agentreplay-server/src/config.rs`) down to the fields this workspace
//! actually needs — one HTTP surface, one in-memory/snapshot store, one
//! minimal bearer/api-key auth gate, one LLM credential.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub server: HttpServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Snapshot directory. `None` runs pure in-memory (spec §3: store has no
    /// real MVCC; persistence is optional file-per-collection snapshotting).
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LlmConfig {
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
}

/// Minimal bearer/api-key gate (spec.md §1 Non-goal: no authz policy
/// engine). `enabled = false` matches the teacher's development default.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_keys: Vec<String>,
}

fn default_http_addr() -> String {
    "127.0.0.1:4750".to_string()
}

fn default_enable_cors() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: HttpServerConfig {
                listen_addr: default_http_addr(),
                enable_cors: default_enable_cors(),
                cors_origins: vec![],
            },
            storage: StorageConfig { data_dir: None },
            auth: AuthConfig {
                enabled: false,
                api_keys: vec![],
            },
            llm: LlmConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Supported environment variables:
    /// - `R4U_HTTP_ADDR`, `R4U_DATA_DIR`, `R4U_ENABLE_CORS`
    /// - `R4U_AUTH_ENABLED`, `R4U_API_KEYS` (comma-separated)
    /// - `OPENAI_API_KEY`, `OPENAI_BASE_URL`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("R4U_HTTP_ADDR") {
            config.server.listen_addr = addr;
        }
        if let Ok(cors) = std::env::var("R4U_ENABLE_CORS") {
            config.server.enable_cors = cors.parse().unwrap_or(true);
        }
        if let Ok(data_dir) = std::env::var("R4U_DATA_DIR") {
            config.storage.data_dir = Some(PathBuf::from(data_dir));
        }
        if let Ok(enabled) = std::env::var("R4U_AUTH_ENABLED") {
            config.auth.enabled = enabled.parse().unwrap_or(false);
        }
        if let Ok(keys) = std::env::var("R4U_API_KEYS") {
            config.auth.api_keys = keys.split(',').map(String::from).collect();
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.llm.openai_api_key = Some(key);
        }
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            config.llm.openai_base_url = Some(base_url);
        }

        config
    }

    /// Priority: file > env > defaults, matching the teacher's `load`.
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!(path = %path.display(), "loading configuration from file");
                Self::from_file(&path)?
            }
            Some(path) => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config = Self::merge_with_env(config);
        Ok(config)
    }

    fn merge_with_env(mut config: Self) -> Self {
        let env_config = Self::from_env();

        if std::env::var("R4U_HTTP_ADDR").is_ok() {
            config.server.listen_addr = env_config.server.listen_addr;
        }
        if std::env::var("R4U_DATA_DIR").is_ok() {
            config.storage.data_dir = env_config.storage.data_dir;
        }
        if std::env::var("R4U_AUTH_ENABLED").is_ok() {
            config.auth.enabled = env_config.auth.enabled;
        }
        if std::env::var("R4U_API_KEYS").is_ok() {
            config.auth.api_keys = env_config.auth.api_keys;
        }
        if env_config.llm.openai_api_key.is_some() {
            config.llm.openai_api_key = env_config.llm.openai_api_key;
        }
        if env_config.llm.openai_base_url.is_some() {
            config.llm.openai_base_url = env_config.llm.openai_base_url;
        }

        config
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        if self.auth.enabled && self.auth.api_keys.is_empty() {
            anyhow::bail!("authentication enabled but no API keys configured");
        }
        if let Some(dir) = &self.storage.data_dir {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_auth_disabled() {
        let config = ServerConfig::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1:4750");
        assert!(!config.auth.enabled);
    }

    #[test]
    fn validate_rejects_enabled_auth_without_keys() {
        let mut config = ServerConfig::default();
        config.auth.enabled = true;
        assert!(config.validate().is_err());
    }
}
