//! Persistent credential store for registries.
//!
//! Stores per-registry credentials in `credentials.json` under the A3S Sign
//! configuration directory. Writes go to a temporary file that is renamed
//! into place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use a3s_sign_core::config::{config_dir, CREDENTIALS_FILE};
use a3s_sign_core::error::{Result, SignError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Per-registry credential entry, stored as base64 `username:password`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialEntry {
    auth: String,
}

impl CredentialEntry {
    fn encode(username: &str, password: &str) -> Self {
        Self {
            auth: STANDARD.encode(format!("{}:{}", username, password)),
        }
    }

    fn decode(&self) -> Result<(String, String)> {
        let raw = STANDARD
            .decode(&self.auth)
            .map_err(|e| SignError::ConfigError(format!("Malformed credential entry: {}", e)))?;
        let raw = String::from_utf8(raw)
            .map_err(|e| SignError::ConfigError(format!("Malformed credential entry: {}", e)))?;
        let (username, password) = raw.split_once(':').ok_or_else(|| {
            SignError::ConfigError("Malformed credential entry: missing ':'".to_string())
        })?;
        Ok((username.to_string(), password.to_string()))
    }
}

/// Persistent credential file format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    registries: BTreeMap<String, CredentialEntry>,
}

/// Persistent credential store for registries.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Credential store in the default configuration directory.
    pub fn default_path() -> Self {
        Self::in_dir(&config_dir())
    }

    /// Credential store in `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CREDENTIALS_FILE))
    }

    /// Create a credential store at a custom path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store credentials for a registry. Overwrites existing entry.
    pub fn store(&self, registry: &str, username: &str, password: &str) -> Result<()> {
        let mut file = self.load()?;
        file.registries.insert(
            normalize_registry(registry),
            CredentialEntry::encode(username, password),
        );
        self.save(&file)
    }

    /// Get credentials for a registry. Returns `(username, password)`.
    pub fn get(&self, registry: &str) -> Result<Option<(String, String)>> {
        let file = self.load()?;
        file.registries
            .get(&normalize_registry(registry))
            .map(CredentialEntry::decode)
            .transpose()
    }

    /// Remove credentials for a registry. Returns true if entry existed.
    pub fn remove(&self, registry: &str) -> Result<bool> {
        let mut file = self.load()?;
        let removed = file
            .registries
            .remove(&normalize_registry(registry))
            .is_some();
        if removed {
            self.save(&file)?;
        }
        Ok(removed)
    }

    fn load(&self) -> Result<CredentialFile> {
        if !self.path.exists() {
            return Ok(CredentialFile::default());
        }
        let data = std::fs::read_to_string(&self.path).map_err(|e| {
            SignError::ConfigError(format!(
                "Failed to read credential store {}: {}",
                self.path.display(),
                e
            ))
        })?;
        serde_json::from_str(&data).map_err(|e| {
            SignError::ConfigError(format!(
                "Failed to parse credential store {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn save(&self, file: &CredentialFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, serde_json::to_string_pretty(file)?)?;
        restrict_permissions(&tmp_path)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Docker Hub aliases share one entry.
fn normalize_registry(registry: &str) -> String {
    let r = registry.trim().to_lowercase();
    if r == "docker.io" || r == "registry-1.docker.io" {
        "index.docker.io".to_string()
    } else {
        r
    }
}
