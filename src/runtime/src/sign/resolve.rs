//! Reference resolution.

use a3s_sign_core::error::{Result, SignError};
use a3s_sign_core::{Descriptor, Digest};
use tokio_util::sync::CancellationToken;

use super::cancellable;
use super::notifier::OperatorNotifier;
use crate::oci::{ArtifactReference, TagOrDigest};
use crate::repository::SignatureRepository;

/// Warning shown when the operator names the target by tag.
pub fn mutable_tag_warning(tag: &str) -> String {
    format!(
        "Always sign the artifact using digest(@sha256:...) rather than a tag(:{}) because tags are mutable and a tag reference can point to a different artifact than the one signed.",
        tag
    )
}

/// A target pinned to the digest the repository resolved it to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Digest-pinned reference
    pub reference: ArtifactReference,
    pub descriptor: Descriptor,
    /// The operator named the target by tag
    pub was_tag: bool,
}

impl ResolvedTarget {
    pub fn digest(&self) -> &Digest {
        &self.descriptor.digest
    }
}

/// Resolve `reference` through `repository`, warning once for tags.
pub async fn resolve_reference(
    reference: &ArtifactReference,
    repository: &dyn SignatureRepository,
    notifier: &dyn OperatorNotifier,
    cancel: &CancellationToken,
) -> Result<ResolvedTarget> {
    let input = reference.tag_or_digest().to_string();
    let descriptor = cancellable(cancel, repository.resolve(&input))
        .await
        .map_err(|e| resolution_failed(reference, e))?;

    if let Some(expected) = reference.tag_or_digest().digest() {
        if &descriptor.digest != expected {
            return Err(SignError::ReferenceResolutionFailed {
                reference: reference.to_string(),
                message: format!("repository returned digest {}", descriptor.digest),
            });
        }
    }

    let was_tag = reference.tag_or_digest().is_tag() && descriptor.digest.to_string() != input;
    if was_tag {
        if let TagOrDigest::Tag(tag) = reference.tag_or_digest() {
            notifier.warn(&mutable_tag_warning(tag));
        }
    }

    let pinned = reference.with_digest(descriptor.digest.clone());
    if let Some(layout) = reference.layout_path() {
        tracing::info!(
            layout = %layout.display(),
            media_type = %descriptor.media_type,
            digest = %descriptor.digest,
            size = descriptor.size,
            "Reference resolved to target manifest descriptor"
        );
    } else {
        tracing::debug!(reference = %reference, pinned = %pinned, "Reference resolved");
    }

    Ok(ResolvedTarget {
        reference: pinned,
        descriptor,
        was_tag,
    })
}

/// Wrap a repository error, leaving cancellation and earlier wraps intact.
fn resolution_failed(reference: &ArtifactReference, err: SignError) -> SignError {
    match err {
        e @ (SignError::Cancelled | SignError::ReferenceResolutionFailed { .. }) => e,
        other => SignError::ReferenceResolutionFailed {
            reference: reference.to_string(),
            message: other.to_string(),
        },
    }
}
