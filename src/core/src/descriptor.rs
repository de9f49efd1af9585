//! OCI content descriptors and the media types A3S Sign stores.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;

/// OCI image manifest.
pub const OCI_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
/// OCI image index.
pub const OCI_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";
/// OCI artifact manifest (experimental signature storage).
pub const OCI_ARTIFACT_MANIFEST: &str = "application/vnd.oci.artifact.manifest.v1+json";
/// Docker schema 2 manifest.
pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
/// Docker schema 2 manifest list.
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

/// Artifact type (and config media type) of signature manifests.
pub const SIGNATURE_ARTIFACT_TYPE: &str = "application/vnd.cncf.notary.signature";
/// Content type of the signed payload.
pub const SIGNATURE_PAYLOAD: &str = "application/vnd.cncf.notary.payload.v1+json";

/// JWS envelope media type.
pub const JWS_ENVELOPE: &str = "application/jose+json";
/// COSE envelope media type.
pub const COSE_ENVELOPE: &str = "application/cose";

/// Annotation holding the reference name of a manifest in an OCI layout.
pub const ANNOTATION_REF_NAME: &str = "org.opencontainers.image.ref.name";
/// Annotation holding the creation time of a manifest.
pub const ANNOTATION_CREATED: &str = "org.opencontainers.image.created";

/// Manifest media types that can be signed.
pub const MANIFEST_MEDIA_TYPES: &[&str] = &[
    OCI_IMAGE_MANIFEST,
    OCI_IMAGE_INDEX,
    OCI_ARTIFACT_MANIFEST,
    DOCKER_MANIFEST,
    DOCKER_MANIFEST_LIST,
];

/// An OCI content descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: Digest,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, digest: Digest, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest,
            size,
            artifact_type: None,
            annotations: BTreeMap::new(),
        }
    }

    /// Descriptor for `data`, addressed by its SHA-256 digest.
    pub fn for_content(media_type: impl Into<String>, data: &[u8]) -> Self {
        Self::new(media_type, Digest::sha256_of(data), data.len() as u64)
    }

    /// Same descriptor without annotations or artifact type.
    pub fn plain(&self) -> Self {
        Self::new(self.media_type.clone(), self.digest.clone(), self.size)
    }
}
