//! Sign a resolved target and store the signature.

use a3s_sign_core::error::{Result, SignError};
use a3s_sign_core::{Descriptor, Digest};
use tokio_util::sync::CancellationToken;

use super::cancellable;
use super::request::SigningRequest;
use crate::repository::{SignatureManifestKind, SignatureRepository};
use crate::signer::Signer;

/// Re-resolve the pinned target, sign it, push the signature.
///
/// Returns the descriptor of the stored signature manifest.
pub async fn sign_and_push(
    request: &SigningRequest,
    kind: SignatureManifestKind,
    repository: &dyn SignatureRepository,
    signer: &dyn Signer,
    cancel: &CancellationToken,
) -> Result<Descriptor> {
    let digest = pinned_digest(&request.artifact_reference)?;

    let subject = cancellable(cancel, repository.resolve(&digest.to_string()))
        .await
        .map_err(|e| match e {
            SignError::Cancelled => SignError::Cancelled,
            other => SignError::ReferenceResolutionFailed {
                reference: request.artifact_reference.clone(),
                message: other.to_string(),
            },
        })?;
    if subject.digest != digest {
        return Err(SignError::ReferenceResolutionFailed {
            reference: request.artifact_reference.clone(),
            message: format!("repository returned digest {}", subject.digest),
        });
    }

    let envelope = cancellable(cancel, signer.sign(&subject, request))
        .await
        .map_err(|e| match e {
            e @ (SignError::Cancelled | SignError::SigningFailed(_)) => e,
            other => SignError::SigningFailed(other.to_string()),
        })?;
    tracing::debug!(
        subject = %subject.digest,
        media_type = %envelope.media_type,
        size = envelope.bytes.len(),
        "Signature envelope created"
    );

    let stored = cancellable(cancel, repository.push_signature(kind, &envelope, &subject))
        .await
        .map_err(SignError::push_failed)?;

    tracing::info!(
        reference = %request.artifact_reference,
        signature = %stored.digest,
        kind = %kind,
        "Signature stored"
    );
    Ok(stored)
}

fn pinned_digest(reference: &str) -> Result<Digest> {
    let (_, digest) = reference.rsplit_once('@').ok_or_else(|| {
        SignError::InvalidArgument(format!("{} is not pinned to a digest", reference))
    })?;
    Digest::parse(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::SignedEnvelope;
    use a3s_sign_core::descriptor::{JWS_ENVELOPE, OCI_IMAGE_MANIFEST};
    use a3s_sign_core::error::PushFailureKind;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    struct Repo {
        subject: Descriptor,
        push_error: Option<fn() -> SignError>,
        pushed: Mutex<Vec<(SignatureManifestKind, Descriptor)>>,
    }

    impl Repo {
        fn new() -> Self {
            Self {
                subject: Descriptor::for_content(OCI_IMAGE_MANIFEST, b"manifest"),
                push_error: None,
                pushed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SignatureRepository for Repo {
        async fn resolve(&self, reference: &str) -> Result<Descriptor> {
            if reference == self.subject.digest.to_string() {
                Ok(self.subject.clone())
            } else {
                Err(SignError::NotFound(reference.to_string()))
            }
        }

        async fn push_signature(
            &self,
            kind: SignatureManifestKind,
            envelope: &SignedEnvelope,
            subject: &Descriptor,
        ) -> Result<Descriptor> {
            if let Some(make) = self.push_error {
                return Err(make());
            }
            self.pushed.lock().push((kind, subject.clone()));
            Ok(Descriptor::for_content(OCI_IMAGE_MANIFEST, &envelope.bytes))
        }
    }

    struct FixedSigner;

    #[async_trait]
    impl Signer for FixedSigner {
        async fn sign(
            &self,
            subject: &Descriptor,
            _request: &SigningRequest,
        ) -> Result<SignedEnvelope> {
            Ok(SignedEnvelope {
                media_type: JWS_ENVELOPE.to_string(),
                bytes: subject.digest.to_string().into_bytes(),
                annotations: BTreeMap::new(),
            })
        }
    }

    struct FailingSigner;

    #[async_trait]
    impl Signer for FailingSigner {
        async fn sign(
            &self,
            _subject: &Descriptor,
            _request: &SigningRequest,
        ) -> Result<SignedEnvelope> {
            Err(SignError::ConfigError("key missing".to_string()))
        }
    }

    fn request(reference: String) -> SigningRequest {
        SigningRequest {
            artifact_reference: reference,
            signature_media_type: JWS_ENVELOPE.to_string(),
            expiry: None,
            plugin_config: BTreeMap::new(),
            user_metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_sign_and_push() {
        let repo = Repo::new();
        let req = request(format!("registry.example.com/repo@{}", repo.subject.digest));

        let stored = sign_and_push(
            &req,
            SignatureManifestKind::Image,
            &repo,
            &FixedSigner,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(stored.digest.matches(repo.subject.digest.to_string().as_bytes()));
        let pushed = repo.pushed.lock();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0], (SignatureManifestKind::Image, repo.subject.clone()));
    }

    #[tokio::test]
    async fn test_unpinned_request_is_rejected() {
        let repo = Repo::new();
        let err = sign_and_push(
            &request("registry.example.com/repo:v1".to_string()),
            SignatureManifestKind::Image,
            &repo,
            &FixedSigner,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SignError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_signer_error_becomes_signing_failed() {
        let repo = Repo::new();
        let req = request(format!("registry.example.com/repo@{}", repo.subject.digest));
        let err = sign_and_push(
            &req,
            SignatureManifestKind::Image,
            &repo,
            &FailingSigner,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SignError::SigningFailed(_)));
        assert!(repo.pushed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_push_error_becomes_push_failure() {
        let mut repo = Repo::new();
        repo.push_error = Some(|| SignError::RegistryError {
            registry: "registry.example.com".to_string(),
            message: "HTTP 500".to_string(),
        });
        let req = request(format!("registry.example.com/repo@{}", repo.subject.digest));

        let err = sign_and_push(
            &req,
            SignatureManifestKind::Artifact,
            &repo,
            &FixedSigner,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.push_failure_kind(), Some(PushFailureKind::Other));
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_signing() {
        let repo = Repo::new();
        let req = request(format!("registry.example.com/repo@{}", repo.subject.digest));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = sign_and_push(&req, SignatureManifestKind::Image, &repo, &FixedSigner, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SignError::Cancelled));
        assert!(repo.pushed.lock().is_empty());
    }
}
