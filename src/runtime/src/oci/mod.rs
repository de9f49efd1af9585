//! OCI plumbing for A3S Sign.
//!
//! - Artifact references (`registry/repo:tag`, `registry/repo@digest`,
//!   `path:tag` for OCI layouts)
//! - Signature manifest construction
//! - Registry and layout repository backends
//! - Registry credential store

pub mod credentials;
pub mod layout;
pub mod manifest;
pub mod reference;
pub mod registry;

pub use credentials::CredentialStore;
pub use layout::LayoutRepository;
pub use manifest::SignatureManifest;
pub use reference::{ArtifactReference, ReferenceMode, TagOrDigest};
pub use registry::{parse_challenge, Challenge, RegistryAuth, RegistryRepository};
