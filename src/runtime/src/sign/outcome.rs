//! Outcome classification.
//!
//! | Result                                              | Outcome            |
//! |-----------------------------------------------------|--------------------|
//! | Ok                                                  | Success            |
//! | push failed, image kind, stale referrers index      | SuccessWithWarning |
//! | push failed, artifact kind                          | Failure + hint     |
//! | anything else                                       | Failure            |

use a3s_sign_core::error::{PushFailureKind, Result, SignError, STALE_REFERRERS_INDEX_MESSAGE};
use a3s_sign_core::Descriptor;

use super::notifier::OperatorNotifier;
use crate::oci::ArtifactReference;
use crate::repository::SignatureManifestKind;

/// Warning for a signature stored next to an undeletable referrers index.
pub const STALE_REFERRERS_INDEX_WARNING: &str =
    "Removal of outdated referrers index is not supported by the remote registry. Garbage collection may be required.";

/// Appended to artifact-kind push failures.
pub const ARTIFACT_MANIFEST_HINT: &str =
    "Possible reason: target registry does not support OCI artifact manifest. Try removing the flag `--signature-manifest artifact` to store signatures using OCI image manifest";

/// Final result of a signing invocation.
#[derive(Debug)]
pub enum SigningOutcome {
    Success {
        /// Digest-pinned target
        target: ArtifactReference,
        /// Stored signature manifest
        descriptor: Descriptor,
    },
    /// The signature is stored but the operator should know something.
    SuccessWithWarning {
        target: ArtifactReference,
        descriptor: Option<Descriptor>,
        warning: String,
    },
    Failure(SignError),
}

impl SigningOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, SigningOutcome::Failure(_))
    }

    /// Print the outcome. Failures are returned, not printed.
    pub fn report(self, notifier: &dyn OperatorNotifier) -> Result<()> {
        match self {
            SigningOutcome::Success { target, .. } => {
                notifier.report(&format!("Successfully signed {}", target));
                Ok(())
            }
            SigningOutcome::SuccessWithWarning {
                target, warning, ..
            } => {
                notifier.warn(&warning);
                notifier.report(&format!("Successfully signed {}", target));
                Ok(())
            }
            SigningOutcome::Failure(err) => Err(err),
        }
    }
}

/// Classify the orchestrator result for `target`.
pub fn classify(
    result: Result<Descriptor>,
    kind: SignatureManifestKind,
    target: &ArtifactReference,
) -> SigningOutcome {
    let err = match result {
        Ok(descriptor) => {
            return SigningOutcome::Success {
                target: target.clone(),
                descriptor,
            }
        }
        Err(err) => err,
    };

    match (err, kind) {
        (
            SignError::SignaturePushFailed {
                kind: failure,
                message,
                signature,
            },
            SignatureManifestKind::Image,
        ) if is_stale_referrers_index(failure, &message) => {
            tracing::debug!(
                error = %message,
                "Signature stored, stale referrers index left behind"
            );
            SigningOutcome::SuccessWithWarning {
                target: target.clone(),
                descriptor: signature,
                warning: STALE_REFERRERS_INDEX_WARNING.to_string(),
            }
        }
        (
            SignError::SignaturePushFailed {
                kind: failure,
                message,
                signature,
            },
            SignatureManifestKind::Artifact,
        ) => SigningOutcome::Failure(SignError::SignaturePushFailed {
            kind: failure,
            message: format!("{}. {}", message, ARTIFACT_MANIFEST_HINT),
            signature,
        }),
        (other, _) => SigningOutcome::Failure(other),
    }
}

/// Typed kind first; the message text covers errors that lost their kind.
fn is_stale_referrers_index(kind: PushFailureKind, message: &str) -> bool {
    kind == PushFailureKind::StaleReferrersIndex || message.contains(STALE_REFERRERS_INDEX_MESSAGE)
}
