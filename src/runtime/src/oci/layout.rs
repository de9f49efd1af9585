//! Local OCI image layout repository.
//!
//! ```text
//! layout/
//! ├── oci-layout           {"imageLayoutVersion":"1.0.0"}
//! ├── index.json           manifests, tags in org.opencontainers.image.ref.name
//! └── blobs/<alg>/<hex>
//! ```
//!
//! Signatures are written as blobs and their manifests appended to
//! `index.json`. The index is replaced via a temporary file and rename.

use std::path::{Path, PathBuf};

use a3s_sign_core::descriptor::{ANNOTATION_REF_NAME, OCI_IMAGE_INDEX};
use a3s_sign_core::error::{Result, SignError};
use a3s_sign_core::{Descriptor, Digest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::manifest::SignatureManifest;
use crate::repository::{SignatureManifestKind, SignatureRepository};
use crate::signer::SignedEnvelope;

const LAYOUT_FILE: &str = "oci-layout";
const INDEX_FILE: &str = "index.json";

/// `index.json` of an OCI layout.
///
/// Entries are kept as raw JSON so fields this crate does not model
/// (platform, urls, ...) survive a rewrite.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutIndex {
    schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    media_type: Option<String>,
    #[serde(default)]
    manifests: Vec<serde_json::Value>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl LayoutIndex {
    fn descriptors(&self) -> impl Iterator<Item = Descriptor> + '_ {
        self.manifests
            .iter()
            .filter_map(|entry| serde_json::from_value::<Descriptor>(entry.clone()).ok())
    }
}

/// Repository backed by a local OCI image layout directory.
pub struct LayoutRepository {
    root: PathBuf,
}

impl LayoutRepository {
    /// Open an existing OCI layout.
    pub fn open(root: &Path) -> Result<Self> {
        let layout_file = root.join(LAYOUT_FILE);
        let data = std::fs::read_to_string(&layout_file).map_err(|e| {
            SignError::InvalidArgument(format!(
                "{} is not an OCI layout: {}",
                root.display(),
                e
            ))
        })?;
        let marker: serde_json::Value = serde_json::from_str(&data)?;
        if marker["imageLayoutVersion"].as_str().is_none() {
            return Err(SignError::InvalidArgument(format!(
                "{} is not an OCI layout: missing imageLayoutVersion",
                root.display()
            )));
        }

        tracing::debug!(layout = %root.display(), "Opened OCI layout");
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.root
            .join("blobs")
            .join(digest.algorithm().as_str())
            .join(digest.hex())
    }

    fn read_index(&self) -> Result<LayoutIndex> {
        let path = self.root.join(INDEX_FILE);
        let data = std::fs::read_to_string(&path).map_err(|e| {
            SignError::InvalidArgument(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&data)?)
    }

    fn write_index(&self, index: &LayoutIndex) -> Result<()> {
        let path = self.root.join(INDEX_FILE);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serde_json::to_vec(index)?)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Write a blob unless it is already present.
    fn write_blob(&self, descriptor: &Descriptor, data: &[u8]) -> Result<()> {
        let path = self.blob_path(&descriptor.digest);
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, data)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Describe a manifest blob that is not listed in `index.json`.
    fn describe_blob(&self, digest: &Digest) -> Result<Descriptor> {
        let path = self.blob_path(digest);
        let data = std::fs::read(&path)
            .map_err(|_| SignError::NotFound(format!("{}@{}", self.root.display(), digest)))?;
        if !digest.matches(&data) {
            return Err(SignError::InvalidArgument(format!(
                "blob {} does not match its digest",
                path.display()
            )));
        }
        let manifest: serde_json::Value = serde_json::from_slice(&data)?;
        let media_type = manifest["mediaType"].as_str().ok_or_else(|| {
            SignError::InvalidArgument(format!("{} is not a manifest: missing mediaType", digest))
        })?;
        Ok(Descriptor::new(media_type, digest.clone(), data.len() as u64))
    }
}

#[async_trait]
impl SignatureRepository for LayoutRepository {
    async fn resolve(&self, reference: &str) -> Result<Descriptor> {
        let index = self.read_index()?;

        if let Ok(digest) = Digest::parse(reference) {
            if let Some(found) = index.descriptors().find(|d| d.digest == digest) {
                return Ok(found.plain());
            }
            return self.describe_blob(&digest);
        }

        index
            .descriptors()
            .filter(|d| {
                d.annotations.get(ANNOTATION_REF_NAME).map(String::as_str) == Some(reference)
            })
            .last()
            .map(|d| d.plain())
            .ok_or_else(|| SignError::NotFound(format!("{}:{}", self.root.display(), reference)))
    }

    async fn push_signature(
        &self,
        kind: SignatureManifestKind,
        envelope: &SignedEnvelope,
        subject: &Descriptor,
    ) -> Result<Descriptor> {
        let manifest = SignatureManifest::build(kind, envelope, subject, chrono::Utc::now())?;

        for (descriptor, data) in &manifest.blobs {
            self.write_blob(descriptor, data)?;
        }
        self.write_blob(&manifest.descriptor, &manifest.bytes)?;

        let mut index = self.read_index()?;
        if index.media_type.is_none() {
            index.media_type = Some(OCI_IMAGE_INDEX.to_string());
        }
        if !index.descriptors().any(|d| d.digest == manifest.descriptor.digest) {
            index
                .manifests
                .push(serde_json::to_value(&manifest.descriptor)?);
            self.write_index(&index)?;
        }

        tracing::info!(
            layout = %self.root.display(),
            subject = %subject.digest,
            signature = %manifest.descriptor.digest,
            "Signature stored in OCI layout"
        );
        Ok(manifest.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a3s_sign_core::descriptor::{JWS_ENVELOPE, OCI_IMAGE_MANIFEST};
    use std::collections::BTreeMap;

    /// Create a layout holding one image manifest tagged `v1`.
    fn create_layout(root: &Path) -> Descriptor {
        let manifest = br#"{"schemaVersion":2,"mediaType":"application/vnd.oci.image.manifest.v1+json","config":{"mediaType":"application/vnd.oci.empty.v1+json","digest":"sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a","size":2},"layers":[]}"#;
        let desc = Descriptor::for_content(OCI_IMAGE_MANIFEST, manifest);
        let blob_dir = root.join("blobs").join("sha256");
        std::fs::create_dir_all(&blob_dir).unwrap();
        std::fs::write(blob_dir.join(desc.digest.hex()), manifest).unwrap();
        std::fs::write(root.join(LAYOUT_FILE), r#"{"imageLayoutVersion":"1.0.0"}"#).unwrap();
        let index = serde_json::json!({
            "schemaVersion": 2,
            "manifests": [{
                "mediaType": OCI_IMAGE_MANIFEST,
                "digest": desc.digest.to_string(),
                "size": desc.size,
                "annotations": {ANNOTATION_REF_NAME: "v1"},
                "platform": {"os": "linux", "architecture": "amd64"}
            }]
        });
        std::fs::write(root.join(INDEX_FILE), index.to_string()).unwrap();
        desc
    }

    fn envelope() -> SignedEnvelope {
        SignedEnvelope {
            media_type: JWS_ENVELOPE.to_string(),
            bytes: b"envelope".to_vec(),
            annotations: BTreeMap::new(),
        }
    }

    #[test]
    fn test_open_rejects_plain_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let err = LayoutRepository::open(tmp.path()).err().unwrap();
        assert!(err.to_string().contains("is not an OCI layout"));
    }

    #[tokio::test]
    async fn test_resolve_tag() {
        let tmp = tempfile::tempdir().unwrap();
        let desc = create_layout(tmp.path());
        let repo = LayoutRepository::open(tmp.path()).unwrap();

        let resolved = repo.resolve("v1").await.unwrap();
        assert_eq!(resolved.digest, desc.digest);
        assert_eq!(resolved.media_type, OCI_IMAGE_MANIFEST);
        assert!(resolved.annotations.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_digest_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let desc = create_layout(tmp.path());
        let repo = LayoutRepository::open(tmp.path()).unwrap();

        let first = repo.resolve(&desc.digest.to_string()).await.unwrap();
        let second = repo.resolve(&desc.digest.to_string()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.size, desc.size);
    }

    #[tokio::test]
    async fn test_resolve_unknown_tag() {
        let tmp = tempfile::tempdir().unwrap();
        create_layout(tmp.path());
        let repo = LayoutRepository::open(tmp.path()).unwrap();

        let err = repo.resolve("v2").await.unwrap_err();
        assert!(matches!(err, SignError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_unknown_digest() {
        let tmp = tempfile::tempdir().unwrap();
        create_layout(tmp.path());
        let repo = LayoutRepository::open(tmp.path()).unwrap();

        let missing = Digest::sha256_of(b"missing");
        let err = repo.resolve(&missing.to_string()).await.unwrap_err();
        assert!(matches!(err, SignError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_push_signature_updates_index() {
        let tmp = tempfile::tempdir().unwrap();
        let subject = create_layout(tmp.path());
        let repo = LayoutRepository::open(tmp.path()).unwrap();

        let stored = repo
            .push_signature(SignatureManifestKind::Image, &envelope(), &subject)
            .await
            .unwrap();

        assert!(repo.blob_path(&stored.digest).exists());
        assert!(repo.blob_path(&Digest::sha256_of(b"envelope")).exists());

        let index = repo.read_index().unwrap();
        assert_eq!(index.manifests.len(), 2);
        assert_eq!(index.manifests[0]["platform"]["os"], "linux");
        assert_eq!(index.manifests[1]["digest"], stored.digest.to_string());
        assert_eq!(index.media_type.as_deref(), Some(OCI_IMAGE_INDEX));

        // Signature manifests resolve by digest like any other manifest
        let resolved = repo.resolve(&stored.digest.to_string()).await.unwrap();
        assert_eq!(resolved.digest, stored.digest);
    }

    #[tokio::test]
    async fn test_resolve_skips_malformed_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let desc = create_layout(tmp.path());
        let repo = LayoutRepository::open(tmp.path()).unwrap();

        let mut index = repo.read_index().unwrap();
        let malformed = serde_json::json!({
            "digest": "not-a-digest",
            "annotations": {ANNOTATION_REF_NAME: "v1"}
        });
        index.manifests.insert(0, malformed);
        repo.write_index(&index).unwrap();

        let resolved = repo.resolve("v1").await.unwrap();
        assert_eq!(resolved.digest, desc.digest);
        assert_eq!(repo.read_index().unwrap().manifests.len(), 2);
    }
}
