use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, SignError};

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "A3S_SIGN_CONFIG_DIR";

/// General configuration file name.
pub const CONFIG_FILE: &str = "config.json";

/// Signing key configuration file name.
pub const SIGNING_KEYS_FILE: &str = "signingkeys.json";

/// Registry credential file name.
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// Plugin directory name.
pub const PLUGINS_DIR: &str = "plugins";

/// Configuration directory (`$A3S_SIGN_CONFIG_DIR`, else `~/.a3s/sign`).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .map(|h| h.join(".a3s"))
        .unwrap_or_else(|| PathBuf::from(".a3s"))
        .join("sign")
}

/// Read a JSON file, returning the default value if it does not exist.
fn load_json<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let data = std::fs::read_to_string(path).map_err(|e| {
        SignError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&data).map_err(|e| {
        SignError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
    })
}

/// General configuration (`config.json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignConfig {
    /// Default envelope format when `--signature-format` is not given
    #[serde(default)]
    pub signature_format: Option<String>,

    /// Registries reached over plain HTTP
    #[serde(default)]
    pub insecure_registries: Vec<String>,
}

impl SignConfig {
    /// Load `config.json` from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        load_json(&dir.join(CONFIG_FILE))
    }

    /// Load `config.json` from the default configuration directory.
    pub fn load_default() -> Result<Self> {
        Self::load(&config_dir())
    }

    /// Whether `registry` is configured as insecure (plain HTTP).
    pub fn is_insecure(&self, registry: &str) -> bool {
        self.insecure_registries.iter().any(|r| r == registry)
    }
}

/// A signing key backed by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginKey {
    /// Key identifier understood by the plugin
    pub id: String,

    /// Plugin name (resolved under `plugins/<name>/`)
    pub plugin_name: String,

    /// Plugin configuration passed with every request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plugin_config: BTreeMap<String, String>,
}

/// A named signing key entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEntry {
    pub name: String,

    /// PKCS#8 private key (PEM or DER) for local signing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,

    /// PEM certificate chain, leaf first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_path: Option<PathBuf>,

    /// Plugin-backed key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<PluginKey>,
}

/// Signing key configuration (`signingkeys.json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningKeys {
    #[serde(default)]
    pub default: Option<String>,

    #[serde(default)]
    pub keys: Vec<KeyEntry>,
}

impl SigningKeys {
    /// Load `signingkeys.json` from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        load_json(&dir.join(SIGNING_KEYS_FILE))
    }

    /// Look up a key by name.
    pub fn get(&self, name: &str) -> Result<&KeyEntry> {
        self.keys
            .iter()
            .find(|k| k.name == name)
            .ok_or_else(|| SignError::ConfigError(format!("signing key '{}' not found", name)))
    }

    /// The default signing key.
    pub fn default_key(&self) -> Result<&KeyEntry> {
        let name = self.default.as_deref().ok_or_else(|| {
            SignError::ConfigError(
                "no default signing key is configured; pass --key or --plugin".to_string(),
            )
        })?;
        self.get(name)
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
