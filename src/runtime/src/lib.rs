//! A3S Sign Runtime - artifact signing workflow.
//!
//! Parses signing targets, resolves them through a registry or a local OCI
//! layout, produces signature envelopes and stores them next to the target.

#![allow(clippy::result_large_err)]

pub mod oci;
pub mod repository;
pub mod sign;
pub mod signer;

// Re-export common types
pub use oci::{
    ArtifactReference, CredentialStore, LayoutRepository, ReferenceMode, RegistryAuth,
    RegistryRepository, TagOrDigest,
};
pub use repository::{open_repository, RegistryOptions, SignatureManifestKind, SignatureRepository};
pub use sign::{
    prepare, sign_artifact, OperatorNotifier, PreparedSign, RecordingNotifier, SignOptions,
    SigningOutcome, SigningRequest,
};
pub use signer::{
    resolve_signer, KeySigner, PluginSigner, SignatureFormat, SignedEnvelope, Signer,
    SignerSelection,
};

/// A3S Sign Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
