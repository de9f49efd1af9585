//! Repository capability used by the signing workflow.
//!
//! Two implementations exist: [`RegistryRepository`](crate::oci::RegistryRepository)
//! talks to a remote registry, [`LayoutRepository`](crate::oci::LayoutRepository)
//! reads and writes a local OCI image layout. The command layer picks one with
//! [`open_repository`]; the workflow only sees the trait.

use a3s_sign_core::error::{Result, SignError};
use a3s_sign_core::Descriptor;
use async_trait::async_trait;

use crate::oci::{ArtifactReference, LayoutRepository, RegistryAuth, RegistryRepository};
use crate::signer::SignedEnvelope;

/// How a signature is stored next to its subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureManifestKind {
    /// OCI image manifest with a `subject` (default)
    #[default]
    Image,
    /// OCI artifact manifest (experimental, not supported by every registry)
    Artifact,
}

impl SignatureManifestKind {
    /// Accepted values, in the order they are listed to the operator.
    pub const SUPPORTED: [&'static str; 2] = ["artifact", "image"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Artifact => "artifact",
        }
    }
}

impl std::fmt::Display for SignatureManifestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SignatureManifestKind {
    type Err = SignError;

    /// Case-sensitive: only `image` and `artifact` are accepted.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "image" => Ok(Self::Image),
            "artifact" => Ok(Self::Artifact),
            other => Err(SignError::InvalidArgument(format!(
                "signature manifest must be one of the following [{}] but got {}",
                Self::SUPPORTED.join(" "),
                other
            ))),
        }
    }
}

/// Storage for signing targets and their signatures.
#[async_trait]
pub trait SignatureRepository: Send + Sync {
    /// Resolve a tag or digest to the descriptor of the manifest it names.
    async fn resolve(&self, reference: &str) -> Result<Descriptor>;

    /// Store `envelope` as a signature of `subject` and return the
    /// descriptor of the stored signature manifest.
    async fn push_signature(
        &self,
        kind: SignatureManifestKind,
        envelope: &SignedEnvelope,
        subject: &Descriptor,
    ) -> Result<Descriptor>;
}

/// Settings for reaching a remote registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    pub auth: Option<RegistryAuth>,
    /// Use plain HTTP
    pub insecure: bool,
}

/// Open the repository backend a reference points at.
pub fn open_repository(
    reference: &ArtifactReference,
    options: &RegistryOptions,
) -> Result<Box<dyn SignatureRepository>> {
    match reference {
        ArtifactReference::Remote {
            registry,
            repository,
            ..
        } => {
            let auth = options
                .auth
                .clone()
                .unwrap_or_else(|| RegistryAuth::from_credential_store(registry));
            let repo = RegistryRepository::new(registry, repository, auth, options.insecure)?;
            Ok(Box::new(repo))
        }
        ArtifactReference::Local { layout_path, .. } => {
            Ok(Box::new(LayoutRepository::open(layout_path)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_kind_accepts_both_values() {
        assert_eq!("image".parse::<SignatureManifestKind>().unwrap(), SignatureManifestKind::Image);
        assert_eq!(
            "artifact".parse::<SignatureManifestKind>().unwrap(),
            SignatureManifestKind::Artifact
        );
    }

    #[test]
    fn test_manifest_kind_is_case_sensitive() {
        for value in ["Image", "IMAGE", "Artifact", "container", "", " image"] {
            let err = value.parse::<SignatureManifestKind>().unwrap_err();
            assert!(matches!(err, SignError::InvalidArgument(_)), "{value}");
        }
    }

    #[test]
    fn test_manifest_kind_error_lists_supported_values() {
        let err = "container".parse::<SignatureManifestKind>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid argument: signature manifest must be one of the following [artifact image] but got container"
        );
    }

    #[test]
    fn test_manifest_kind_default_is_image() {
        assert_eq!(SignatureManifestKind::default(), SignatureManifestKind::Image);
        assert_eq!(SignatureManifestKind::default().to_string(), "image");
    }

    #[test]
    fn test_open_repository_local_requires_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let reference = ArtifactReference::parse_local(&format!(
            "{}:v1",
            tmp.path().join("missing").display()
        ))
        .unwrap();
        assert!(open_repository(&reference, &RegistryOptions::default()).is_err());
    }
}
