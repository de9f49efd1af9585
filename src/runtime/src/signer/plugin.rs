//! Plugin signer.
//!
//! Runs `plugins/<name>/a3s-sign-<name> generate-envelope`, writes a JSON
//! request on stdin and reads a JSON response from stdout. A non-zero exit
//! status fails the signature; stderr carries the plugin's error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use a3s_sign_core::config::PLUGINS_DIR;
use a3s_sign_core::descriptor::SIGNATURE_PAYLOAD;
use a3s_sign_core::error::{Result, SignError};
use a3s_sign_core::Descriptor;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{signature_payload, SignatureFormat, SignedEnvelope, Signer};
use crate::sign::SigningRequest;

const CONTRACT_VERSION: &str = "1.0";
const GENERATE_ENVELOPE: &str = "generate-envelope";

/// Location of the executable for plugin `name`.
pub fn plugin_path(config_dir: &Path, name: &str) -> PathBuf {
    let binary = format!("a3s-sign-{}{}", name, std::env::consts::EXE_SUFFIX);
    config_dir.join(PLUGINS_DIR).join(name).join(binary)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateEnvelopeRequest<'a> {
    contract_version: &'a str,
    key_id: &'a str,
    payload_type: &'a str,
    signature_envelope_type: &'a str,
    payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiry_duration_in_seconds: Option<u64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    plugin_config: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateEnvelopeResponse {
    signature_envelope: String,
    signature_envelope_type: String,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PluginErrorResponse {
    error_code: String,
    #[serde(default)]
    error_message: String,
}

/// Delegates envelope generation to a plugin binary.
pub struct PluginSigner {
    path: PathBuf,
    key_id: String,
    plugin_config: BTreeMap<String, String>,
}

impl PluginSigner {
    /// `plugin_config` is sent with every request; per-request entries win.
    pub fn new(path: PathBuf, key_id: String, plugin_config: BTreeMap<String, String>) -> Self {
        Self {
            path,
            key_id,
            plugin_config,
        }
    }

    async fn run(&self, input: &[u8]) -> Result<Vec<u8>> {
        if !self.path.exists() {
            return Err(SignError::SigningFailed(format!(
                "plugin executable not found at {}",
                self.path.display()
            )));
        }

        let mut child = Command::new(&self.path)
            .arg(GENERATE_ENVELOPE)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SignError::SigningFailed(format!(
                    "Failed to start plugin {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = match serde_json::from_str::<PluginErrorResponse>(&stderr) {
                Ok(e) => format!("{}: {}", e.error_code, e.error_message),
                Err(_) => stderr.trim().to_string(),
            };
            return Err(SignError::SigningFailed(format!(
                "plugin {} failed ({}): {}",
                self.path.display(),
                output.status,
                message
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl Signer for PluginSigner {
    async fn sign(&self, subject: &Descriptor, request: &SigningRequest) -> Result<SignedEnvelope> {
        let format = SignatureFormat::from_media_type(&request.signature_media_type).ok_or_else(
            || SignError::UnsupportedEnvelopeFormat(request.signature_media_type.clone()),
        )?;

        let mut plugin_config = self.plugin_config.clone();
        plugin_config.extend(request.plugin_config.clone());

        let payload = signature_payload(subject, &request.user_metadata)?;
        let body = GenerateEnvelopeRequest {
            contract_version: CONTRACT_VERSION,
            key_id: &self.key_id,
            payload_type: SIGNATURE_PAYLOAD,
            signature_envelope_type: format.media_type(),
            payload: STANDARD.encode(&payload),
            expiry_duration_in_seconds: request.expiry.map(|d| d.as_secs()).filter(|s| *s > 0),
            plugin_config,
        };

        tracing::debug!(
            plugin = %self.path.display(),
            key_id = %self.key_id,
            format = %format,
            "Requesting envelope from plugin"
        );
        let stdout = self.run(&serde_json::to_vec(&body)?).await?;

        let response: GenerateEnvelopeResponse = serde_json::from_slice(&stdout).map_err(|e| {
            SignError::SigningFailed(format!("plugin returned a malformed response: {}", e))
        })?;
        if response.signature_envelope_type != format.media_type() {
            return Err(SignError::SigningFailed(format!(
                "plugin returned envelope type {} but {} was requested",
                response.signature_envelope_type,
                format.media_type()
            )));
        }
        let bytes = STANDARD.decode(&response.signature_envelope).map_err(|e| {
            SignError::SigningFailed(format!("plugin returned an undecodable envelope: {}", e))
        })?;

        Ok(SignedEnvelope {
            media_type: response.signature_envelope_type,
            bytes,
            annotations: response.annotations,
        })
    }
}
