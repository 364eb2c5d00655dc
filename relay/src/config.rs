use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
}

impl RelayConfig {
    /// Reads the TOML file (if any) and then layers the process environment on top.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path();
        let mut config = Self::from_path(&config_path)?;
        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    fn from_path(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let raw = fs::read_to_string(config_path)
                .with_context(|| format!("failed to read config file {}", config_path.display()))?;
            let parsed: RelayConfig = toml::from_str(&raw)
                .with_context(|| format!("failed to parse TOML from {}", config_path.display()))?;
            return Ok(parsed);
        }

        Ok(RelayConfig::default())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("PORT") {
            match raw.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(error) => warn!("ignoring invalid PORT value {raw:?}: {error}"),
            }
        }
        if let Some(raw) = lookup("HOST") {
            match raw.trim().parse::<IpAddr>() {
                Ok(host) => self.server.host = host,
                Err(error) => warn!("ignoring invalid HOST value {raw:?}: {error}"),
            }
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.model.api_key = Credential::new(key);
        }
        if let Some(model) = lookup("OPENAI_MODEL").filter(|value| !value.trim().is_empty()) {
            self.model.model = model.trim().to_string();
        }
        if let Some(base) = lookup("OPENAI_API_BASE").filter(|value| !value.trim().is_empty()) {
            self.model.api_base = base.trim().to_string();
        }
    }
}

fn resolve_config_path() -> PathBuf {
    if let Ok(path) = env::var("RELAY_CONFIG") {
        return Path::new(&path).to_path_buf();
    }

    if let Some(base) = dirs::config_dir() {
        return base.join("english-assistant").join("config.toml");
    }

    Path::new("/tmp/english-assistant.toml").to_path_buf()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on trimmed input length in characters; `0` turns the check off.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_text_chars: default_max_text_chars(),
            body_limit_bytes: default_body_limit_bytes(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    10000
}

fn default_max_text_chars() -> usize {
    500
}

fn default_body_limit_bytes() -> usize {
    64 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_backend")]
    pub backend: ModelBackend,
    #[serde(default)]
    pub api_key: Credential,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub verify_on_startup: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            api_key: Credential::default(),
            api_base: default_api_base(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_timeout_ms(),
            verify_on_startup: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    Completion,
    Substitution,
}

impl ModelBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelBackend::Completion => "completion",
            ModelBackend::Substitution => "substitution",
        }
    }
}

fn default_backend() -> ModelBackend {
    ModelBackend::Completion
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    400
}

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FallbackConfig {
    /// Extra token replacements merged over the built-in table. Keys are matched case-insensitively.
    #[serde(default)]
    pub substitutions: HashMap<String, String>,
}

/// API key for the completion service. Blank values count as unset.
#[derive(Clone, Default, Deserialize)]
#[serde(from = "Option<String>")]
pub struct Credential(Option<String>);

impl Credential {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self(None)
        } else {
            Self(Some(trimmed.to_string()))
        }
    }

    pub fn is_configured(&self) -> bool {
        self.0.is_some()
    }

    pub fn secret(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl From<Option<String>> for Credential {
    fn from(value: Option<String>) -> Self {
        value.map(Credential::new).unwrap_or_default()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Credential(<redacted>)"),
            None => f.write_str("Credential(None)"),
        }
    }
}
