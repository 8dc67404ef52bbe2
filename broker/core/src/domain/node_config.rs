// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Signer Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) for a keyward
// signer process:
// - where the persisted key/policy state lives
// - where the HTTP transport listens
// - how consent prompts are surfaced and when they time out
// - whether external callers see failure detail

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "keyward/v1";
pub const KIND: &str = "SignerConfig";

/// Top-level signer configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfigManifest {
    /// API version (must be "keyward/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "SignerConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: SignerConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfigSpec {
    /// Persisted key-value state (key, relays, policies, settings)
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    #[serde(default)]
    pub listen: ListenConfig,

    #[serde(default)]
    pub prompt: PromptConfig,

    /// Include raw failure detail in `OperationFailed` responses to
    /// external callers. Trusted callers always see it.
    #[serde(default)]
    pub expose_failure_detail: bool,

    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ListenConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    /// Pending prompts are exposed over the HTTP API and answered there.
    #[default]
    Http,
    /// The daemon asks on its own terminal.
    Terminal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub mode: PromptMode,

    /// Unanswered prompts resolve as deny after this many seconds
    #[serde(default = "default_prompt_timeout")]
    pub timeout_seconds: u64,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            mode: PromptMode::default(),
            timeout_seconds: default_prompt_timeout(),
        }
    }
}

fn default_state_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".keyward")
        .join("state.json")
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7447
}

fn default_prompt_timeout() -> u64 {
    120
}

fn default_event_bus_capacity() -> usize {
    256
}

impl Default for SignerConfigSpec {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            listen: ListenConfig::default(),
            prompt: PromptConfig::default(),
            expose_failure_detail: false,
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

impl Default for SignerConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "keyward".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: SignerConfigSpec::default(),
        }
    }
}

impl SignerConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. KEYWARD_CONFIG_PATH environment variable
    /// 2. ./keyward-config.yaml (working directory)
    /// 3. ~/.keyward/config.yaml (user home)
    /// 4. /etc/keyward/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("KEYWARD_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./keyward-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".keyward").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/keyward/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)?
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("KEYWARD_STATE_PATH") {
            tracing::info!("Environment override: KEYWARD_STATE_PATH={}", path);
            self.spec.state_path = PathBuf::from(path);
        }

        if let Some(val) = lookup("KEYWARD_PROMPT_TIMEOUT") {
            match val.parse::<u64>() {
                Ok(seconds) => {
                    tracing::info!("Environment override: KEYWARD_PROMPT_TIMEOUT={}", seconds);
                    self.spec.prompt.timeout_seconds = seconds;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for KEYWARD_PROMPT_TIMEOUT: '{}'. Expected seconds. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("KEYWARD_EXPOSE_FAILURE_DETAIL") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: KEYWARD_EXPOSE_FAILURE_DETAIL=true");
                    self.spec.expose_failure_detail = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: KEYWARD_EXPOSE_FAILURE_DETAIL=false");
                    self.spec.expose_failure_detail = false;
                }
                _ => tracing::warn!(
                    "Invalid value for KEYWARD_EXPOSE_FAILURE_DETAIL: '{}'. Expected true/false. Ignoring.",
                    val
                ),
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.state_path.as_os_str().is_empty() {
            anyhow::bail!("spec.state_path cannot be empty");
        }

        if self.spec.prompt.timeout_seconds == 0 {
            anyhow::bail!("spec.prompt.timeout_seconds must be greater than zero");
        }

        if self.spec.event_bus_capacity == 0 {
            anyhow::bail!("spec.event_bus_capacity must be greater than zero");
        }

        Ok(())
    }
}
