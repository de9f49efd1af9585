use thiserror::Error;

use crate::descriptor::Descriptor;

/// Message a registry client reports when the superseded referrers index
/// could not be deleted after the new index was pushed.
pub const STALE_REFERRERS_INDEX_MESSAGE: &str = "failed to delete dangling referrers index";

/// Why a signature push failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushFailureKind {
    /// The signature and the new referrers index were stored, but the old
    /// referrers index could not be removed.
    StaleReferrersIndex,
    /// Any other push failure.
    Other,
}

impl std::fmt::Display for PushFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaleReferrersIndex => write!(f, "stale-referrers-index"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A3S Sign error types
#[derive(Error, Debug)]
pub enum SignError {
    /// Bad command input (manifest kind, reference, key=value entry, expiry)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Envelope format without a known media type
    #[error("Unsupported signature format: {0} (supported: jws, cose)")]
    UnsupportedEnvelopeFormat(String),

    /// Repository lookup failed (network error, not found, malformed digest)
    #[error("Failed to resolve {reference}: {message}")]
    ReferenceResolutionFailed { reference: String, message: String },

    /// Signer failed to produce an envelope
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Signature was produced but storing it in the repository failed
    #[error("Failed to push signature: {message}")]
    SignaturePushFailed {
        kind: PushFailureKind,
        message: String,
        /// Signature manifest, when it was stored before the failure
        signature: Option<Descriptor>,
    },

    /// Content not found in the repository
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation was cancelled before it completed
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Container registry error
    #[error("Registry error: {registry} - {message}")]
    RegistryError { registry: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl SignError {
    /// Build a push failure from any error, keeping an existing push kind.
    pub fn push_failed(err: SignError) -> Self {
        match err {
            push @ SignError::SignaturePushFailed { .. } => push,
            SignError::Cancelled => SignError::Cancelled,
            other => SignError::SignaturePushFailed {
                kind: PushFailureKind::Other,
                message: other.to_string(),
                signature: None,
            },
        }
    }

    /// Push failure kind, if this is a push failure.
    pub fn push_failure_kind(&self) -> Option<PushFailureKind> {
        match self {
            SignError::SignaturePushFailed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SignError {
    fn from(err: serde_json::Error) -> Self {
        SignError::SerializationError(err.to_string())
    }
}

/// Result type alias for A3S Sign operations
pub type Result<T> = std::result::Result<T, SignError>;
