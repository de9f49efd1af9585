//! Signing workflow.
//!
//! ```text
//! prepare ──► resolve ──► bind request ──► sign + push ──► classify
//! (no I/O)    (repo)                       (signer, repo)
//! ```
//!
//! [`prepare`] validates every operator input before a repository is
//! opened; [`sign_artifact`] runs the rest against injected capabilities.

pub mod notifier;
pub mod orchestrator;
pub mod outcome;
pub mod request;
pub mod resolve;

pub use notifier::{OperatorNotifier, RecordingNotifier};
pub use orchestrator::sign_and_push;
pub use outcome::{classify, SigningOutcome, ARTIFACT_MANIFEST_HINT, STALE_REFERRERS_INDEX_WARNING};
pub use request::{
    build_signing_request, parse_flag_map, SigningParams, SigningRequest, MAX_EXPIRY,
};
pub use resolve::{mutable_tag_warning, resolve_reference, ResolvedTarget};

use std::future::Future;
use std::time::Duration;

use a3s_sign_core::error::{Result, SignError};
use tokio_util::sync::CancellationToken;

use crate::oci::{ArtifactReference, ReferenceMode};
use crate::repository::{SignatureManifestKind, SignatureRepository};
use crate::signer::Signer;

/// Race `future` against cancellation.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SignError::Cancelled),
        result = future => result,
    }
}

/// Operator input for one signing invocation.
#[derive(Debug, Clone)]
pub struct SignOptions {
    pub reference: String,
    pub mode: ReferenceMode,
    /// `image` or `artifact`
    pub signature_manifest: String,
    /// `jws` or `cose`
    pub signature_format: String,
    pub expiry: Option<Duration>,
    pub plugin_config: Vec<String>,
    pub user_metadata: Vec<String>,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            reference: String::new(),
            mode: ReferenceMode::Remote,
            signature_manifest: SignatureManifestKind::default().to_string(),
            signature_format: "jws".to_string(),
            expiry: None,
            plugin_config: Vec::new(),
            user_metadata: Vec::new(),
        }
    }
}

/// Validated input, ready to run.
#[derive(Debug, Clone)]
pub struct PreparedSign {
    pub reference: ArtifactReference,
    pub kind: SignatureManifestKind,
    pub params: SigningParams,
}

/// Validate `options` without touching any repository.
pub fn prepare(options: &SignOptions) -> Result<PreparedSign> {
    let kind = options.signature_manifest.parse::<SignatureManifestKind>()?;
    let reference = ArtifactReference::parse(&options.reference, options.mode)?;
    let params = SigningParams::new(
        &options.signature_format,
        options.expiry,
        &options.plugin_config,
        &options.user_metadata,
    )?;
    Ok(PreparedSign {
        reference,
        kind,
        params,
    })
}

/// Resolve, sign, push and classify.
pub async fn sign_artifact(
    prepared: &PreparedSign,
    repository: &dyn SignatureRepository,
    signer: &dyn Signer,
    notifier: &dyn OperatorNotifier,
    cancel: &CancellationToken,
) -> SigningOutcome {
    let target = match resolve_reference(&prepared.reference, repository, notifier, cancel).await {
        Ok(target) => target,
        Err(e) => return SigningOutcome::Failure(e),
    };

    let request = prepared.params.bind(&target);
    let result = sign_and_push(&request, prepared.kind, repository, signer, cancel).await;
    classify(result, prepared.kind, &target.reference)
}
