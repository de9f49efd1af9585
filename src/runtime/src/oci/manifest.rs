//! Signature manifest construction.
//!
//! Image kind stores the envelope as the single layer of an OCI image
//! manifest whose config is the empty JSON object; artifact kind stores it as
//! the single blob of an OCI artifact manifest. Both carry a `subject` that
//! points at the signed manifest.

use std::collections::BTreeMap;

use a3s_sign_core::descriptor::{
    ANNOTATION_CREATED, OCI_ARTIFACT_MANIFEST, OCI_IMAGE_MANIFEST, SIGNATURE_ARTIFACT_TYPE,
};
use a3s_sign_core::error::Result;
use a3s_sign_core::Descriptor;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::repository::SignatureManifestKind;
use crate::signer::SignedEnvelope;

/// Config blob of image-kind signature manifests.
pub const EMPTY_CONFIG: &[u8] = b"{}";

/// A serialized signature manifest and the blobs it references.
#[derive(Debug, Clone)]
pub struct SignatureManifest {
    /// Descriptor of the manifest itself
    pub descriptor: Descriptor,
    /// Serialized manifest
    pub bytes: Vec<u8>,
    /// Blobs to upload before the manifest
    pub blobs: Vec<(Descriptor, Vec<u8>)>,
}

impl SignatureManifest {
    /// Build the manifest for `envelope` signing `subject`.
    pub fn build(
        kind: SignatureManifestKind,
        envelope: &SignedEnvelope,
        subject: &Descriptor,
        created: DateTime<Utc>,
    ) -> Result<Self> {
        let envelope_desc = Descriptor::for_content(envelope.media_type.clone(), &envelope.bytes);

        let mut annotations: BTreeMap<String, String> = envelope.annotations.clone();
        annotations.insert(
            ANNOTATION_CREATED.to_string(),
            created.to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        let (media_type, manifest, mut blobs) = match kind {
            SignatureManifestKind::Image => {
                let config_desc = Descriptor::for_content(SIGNATURE_ARTIFACT_TYPE, EMPTY_CONFIG);
                let manifest = serde_json::json!({
                    "schemaVersion": 2,
                    "mediaType": OCI_IMAGE_MANIFEST,
                    "artifactType": SIGNATURE_ARTIFACT_TYPE,
                    "config": &config_desc,
                    "layers": [&envelope_desc],
                    "subject": subject.plain(),
                    "annotations": &annotations,
                });
                (
                    OCI_IMAGE_MANIFEST,
                    manifest,
                    vec![(config_desc, EMPTY_CONFIG.to_vec())],
                )
            }
            SignatureManifestKind::Artifact => {
                let manifest = serde_json::json!({
                    "mediaType": OCI_ARTIFACT_MANIFEST,
                    "artifactType": SIGNATURE_ARTIFACT_TYPE,
                    "blobs": [&envelope_desc],
                    "subject": subject.plain(),
                    "annotations": &annotations,
                });
                (OCI_ARTIFACT_MANIFEST, manifest, Vec::new())
            }
        };
        blobs.push((envelope_desc, envelope.bytes.clone()));

        let bytes = serde_json::to_vec(&manifest)?;
        let mut descriptor = Descriptor::for_content(media_type, &bytes);
        descriptor.artifact_type = Some(SIGNATURE_ARTIFACT_TYPE.to_string());
        descriptor.annotations = annotations;

        Ok(Self {
            descriptor,
            bytes,
            blobs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a3s_sign_core::descriptor::JWS_ENVELOPE;

    fn envelope() -> SignedEnvelope {
        let mut annotations = BTreeMap::new();
        annotations.insert(
            "io.cncf.notary.x509chain.thumbprint#S256".to_string(),
            "[]".to_string(),
        );
        SignedEnvelope {
            media_type: JWS_ENVELOPE.to_string(),
            bytes: br#"{"payload":"e30"}"#.to_vec(),
            annotations,
        }
    }

    fn subject() -> Descriptor {
        let mut d = Descriptor::for_content(OCI_IMAGE_MANIFEST, b"subject manifest");
        d.annotations.insert("org.opencontainers.image.ref.name".to_string(), "v1".to_string());
        d
    }

    fn created() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_image_manifest_layout() {
        let m = SignatureManifest::build(
            SignatureManifestKind::Image,
            &envelope(),
            &subject(),
            created(),
        )
        .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&m.bytes).unwrap();

        assert_eq!(json["mediaType"], OCI_IMAGE_MANIFEST);
        assert_eq!(json["config"]["mediaType"], SIGNATURE_ARTIFACT_TYPE);
        assert_eq!(json["layers"][0]["mediaType"], JWS_ENVELOPE);
        assert_eq!(json["subject"]["digest"], subject().digest.to_string());
        assert!(json["subject"].get("annotations").is_none());
        assert_eq!(json["annotations"][ANNOTATION_CREATED], "2024-01-02T03:04:05Z");

        assert_eq!(m.blobs.len(), 2);
        assert_eq!(m.blobs[0].1, EMPTY_CONFIG);
        assert_eq!(m.descriptor.media_type, OCI_IMAGE_MANIFEST);
        assert!(m.descriptor.digest.matches(&m.bytes));
        assert_eq!(m.descriptor.artifact_type.as_deref(), Some(SIGNATURE_ARTIFACT_TYPE));
    }

    #[test]
    fn test_artifact_manifest_layout() {
        let m = SignatureManifest::build(
            SignatureManifestKind::Artifact,
            &envelope(),
            &subject(),
            created(),
        )
        .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&m.bytes).unwrap();

        assert_eq!(json["mediaType"], OCI_ARTIFACT_MANIFEST);
        assert!(json.get("config").is_none());
        assert_eq!(json["blobs"][0]["mediaType"], JWS_ENVELOPE);
        assert_eq!(m.blobs.len(), 1);
        assert_eq!(m.descriptor.media_type, OCI_ARTIFACT_MANIFEST);
    }

    #[test]
    fn test_signer_annotations_are_kept() {
        let m = SignatureManifest::build(
            SignatureManifestKind::Image,
            &envelope(),
            &subject(),
            created(),
        )
        .unwrap();
        assert!(m
            .descriptor
            .annotations
            .contains_key("io.cncf.notary.x509chain.thumbprint#S256"));
    }
}
