//! Signers produce signature envelopes over a target descriptor.
//!
//! - [`KeySigner`]: local ECDSA key, JWS envelopes
//! - [`PluginSigner`]: external plugin binary, JWS or COSE envelopes

mod key;
mod plugin;

pub use key::KeySigner;
pub use plugin::{plugin_path, PluginSigner};

use std::collections::BTreeMap;
use std::path::Path;

use a3s_sign_core::config::{KeyEntry, SigningKeys};
use a3s_sign_core::descriptor::{COSE_ENVELOPE, JWS_ENVELOPE};
use a3s_sign_core::error::{Result, SignError};
use a3s_sign_core::Descriptor;
use async_trait::async_trait;

use crate::sign::SigningRequest;

/// Signature envelope format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureFormat {
    #[default]
    Jws,
    Cose,
}

impl SignatureFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jws => "jws",
            Self::Cose => "cose",
        }
    }

    /// Envelope media type stored in the signature manifest.
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Jws => JWS_ENVELOPE,
            Self::Cose => COSE_ENVELOPE,
        }
    }

    /// Inverse of [`media_type`](Self::media_type).
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type {
            JWS_ENVELOPE => Some(Self::Jws),
            COSE_ENVELOPE => Some(Self::Cose),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignatureFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SignatureFormat {
    type Err = SignError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "jws" => Ok(Self::Jws),
            "cose" => Ok(Self::Cose),
            other => Err(SignError::UnsupportedEnvelopeFormat(other.to_string())),
        }
    }
}

/// Media type for an envelope format name.
pub fn envelope_media_type(format: &str) -> Result<&'static str> {
    format.parse::<SignatureFormat>().map(|f| f.media_type())
}

/// A signature envelope returned by a signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    pub media_type: String,
    pub bytes: Vec<u8>,
    /// Annotations for the signature manifest
    pub annotations: BTreeMap<String, String>,
}

/// Produces a signature envelope for a subject.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, subject: &Descriptor, request: &SigningRequest) -> Result<SignedEnvelope>;
}

/// Signed payload: the subject descriptor with user metadata as annotations.
pub fn signature_payload(
    subject: &Descriptor,
    user_metadata: &BTreeMap<String, String>,
) -> Result<Vec<u8>> {
    let mut target = subject.plain();
    target.annotations = user_metadata.clone();
    Ok(serde_json::to_vec(&serde_json::json!({ "targetArtifact": target }))?)
}

/// Which signer the operator asked for.
#[derive(Debug, Clone, Default)]
pub struct SignerSelection {
    /// Named key from `signingkeys.json`
    pub key: Option<String>,
    /// Plugin name, used with `id`
    pub plugin: Option<String>,
    /// Key identifier understood by the plugin
    pub id: Option<String>,
}

/// Build the signer for `selection`.
///
/// `--key` wins, then `--plugin` with `--id`, then the default key.
pub fn resolve_signer(selection: &SignerSelection, config_dir: &Path) -> Result<Box<dyn Signer>> {
    if let Some(name) = &selection.key {
        if selection.plugin.is_some() || selection.id.is_some() {
            return Err(SignError::InvalidArgument(
                "--key cannot be combined with --plugin or --id".to_string(),
            ));
        }
        let keys = SigningKeys::load(config_dir)?;
        return signer_for_entry(keys.get(name)?, config_dir);
    }

    match (&selection.plugin, &selection.id) {
        (Some(plugin), Some(id)) => {
            tracing::debug!(plugin = %plugin, key_id = %id, "Using plugin signer");
            Ok(Box::new(PluginSigner::new(
                plugin_path(config_dir, plugin),
                id.clone(),
                BTreeMap::new(),
            )))
        }
        (Some(_), None) => Err(SignError::InvalidArgument(
            "--id is required when --plugin is set".to_string(),
        )),
        (None, Some(_)) => Err(SignError::InvalidArgument(
            "--plugin is required when --id is set".to_string(),
        )),
        (None, None) => {
            let keys = SigningKeys::load(config_dir)?;
            signer_for_entry(keys.default_key()?, config_dir)
        }
    }
}

fn signer_for_entry(entry: &KeyEntry, config_dir: &Path) -> Result<Box<dyn Signer>> {
    if let Some(plugin) = &entry.plugin {
        tracing::debug!(key = %entry.name, plugin = %plugin.plugin_name, "Using plugin-backed key");
        return Ok(Box::new(PluginSigner::new(
            plugin_path(config_dir, &plugin.plugin_name),
            plugin.id.clone(),
            plugin.plugin_config.clone(),
        )));
    }

    let key_path = entry.key_path.as_deref().ok_or_else(|| {
        SignError::ConfigError(format!(
            "signing key '{}' has neither keyPath nor plugin",
            entry.name
        ))
    })?;
    tracing::debug!(key = %entry.name, path = %key_path.display(), "Using local key");
    Ok(Box::new(KeySigner::load(
        key_path,
        entry.certificate_path.as_deref(),
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use a3s_sign_core::config::SIGNING_KEYS_FILE;
    use a3s_sign_core::descriptor::OCI_IMAGE_MANIFEST;

    #[test]
    fn test_envelope_media_types() {
        assert_eq!(envelope_media_type("jws").unwrap(), "application/jose+json");
        assert_eq!(envelope_media_type("cose").unwrap(), "application/cose");
    }

    #[test]
    fn test_unknown_format() {
        for format in ["JWS", "x509", ""] {
            let err = envelope_media_type(format).unwrap_err();
            assert!(matches!(err, SignError::UnsupportedEnvelopeFormat(_)));
        }
    }

    #[test]
    fn test_format_media_type_inverse() {
        for format in [SignatureFormat::Jws, SignatureFormat::Cose] {
            assert_eq!(SignatureFormat::from_media_type(format.media_type()), Some(format));
        }
        assert_eq!(SignatureFormat::from_media_type("text/plain"), None);
    }

    #[test]
    fn test_signature_payload_carries_metadata() {
        let mut subject = Descriptor::for_content(OCI_IMAGE_MANIFEST, b"manifest");
        subject.annotations.insert("ignored".to_string(), "x".to_string());
        let mut metadata = BTreeMap::new();
        metadata.insert("buildId".to_string(), "42".to_string());

        let payload = signature_payload(&subject, &metadata).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(json["targetArtifact"]["digest"], subject.digest.to_string());
        assert_eq!(json["targetArtifact"]["annotations"]["buildId"], "42");
        assert!(json["targetArtifact"]["annotations"].get("ignored").is_none());
    }

    #[test]
    fn test_signature_payload_without_metadata() {
        let subject = Descriptor::for_content(OCI_IMAGE_MANIFEST, b"manifest");
        let payload = signature_payload(&subject, &BTreeMap::new()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert!(json["targetArtifact"].get("annotations").is_none());
    }

    #[test]
    fn test_resolve_signer_requires_id_with_plugin() {
        let tmp = tempfile::tempdir().unwrap();
        let selection = SignerSelection {
            plugin: Some("kms".to_string()),
            ..Default::default()
        };
        let err = resolve_signer(&selection, tmp.path()).err().unwrap();
        assert!(err.to_string().contains("--id is required"));
    }

    #[test]
    fn test_resolve_signer_plugin_selection() {
        let tmp = tempfile::tempdir().unwrap();
        let selection = SignerSelection {
            plugin: Some("kms".to_string()),
            id: Some("key-1".to_string()),
            ..Default::default()
        };
        assert!(resolve_signer(&selection, tmp.path()).is_ok());
    }

    #[test]
    fn test_resolve_signer_without_default_key() {
        let tmp = tempfile::tempdir().unwrap();
        let err = resolve_signer(&SignerSelection::default(), tmp.path()).err().unwrap();
        assert!(matches!(err, SignError::ConfigError(_)));
    }

    #[test]
    fn test_resolve_signer_default_plugin_key() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(SIGNING_KEYS_FILE),
            r#"{"default":"kms","keys":[{"name":"kms","plugin":{"id":"arn:key","pluginName":"aws"}}]}"#,
        )
        .unwrap();
        assert!(resolve_signer(&SignerSelection::default(), tmp.path()).is_ok());
    }

    #[test]
    fn test_resolve_signer_key_entry_without_material() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(SIGNING_KEYS_FILE),
            r#"{"keys":[{"name":"empty"}]}"#,
        )
        .unwrap();
        let selection = SignerSelection {
            key: Some("empty".to_string()),
            ..Default::default()
        };
        let err = resolve_signer(&selection, tmp.path()).err().unwrap();
        assert!(err.to_string().contains("neither keyPath nor plugin"));
    }
}
