//! Artifact reference parsing.
//!
//! Parses signing targets in two forms:
//! - remote: `ghcr.io/org/app:v1` or `ghcr.io/org/app@sha256:abc...`
//! - local OCI layout: `./layout:v1` or `/data/layout@sha256:abc...`

use std::path::{Path, PathBuf};

use a3s_sign_core::error::{Result, SignError};
use a3s_sign_core::Digest;

/// Maximum tag length allowed by the distribution spec.
const MAX_TAG_LEN: usize = 128;

/// Whether the reference names registry content or a local OCI layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceMode {
    Remote,
    Local,
}

/// The tag or digest part of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOrDigest {
    Tag(String),
    Digest(Digest),
}

impl TagOrDigest {
    /// Classify `s` as a digest when it validates as one, otherwise as a tag.
    pub fn parse(s: &str) -> Result<Self> {
        if let Ok(digest) = Digest::parse(s) {
            return Ok(TagOrDigest::Digest(digest));
        }
        validate_tag(s)?;
        Ok(TagOrDigest::Tag(s.to_string()))
    }

    pub fn is_tag(&self) -> bool {
        matches!(self, TagOrDigest::Tag(_))
    }

    pub fn digest(&self) -> Option<&Digest> {
        match self {
            TagOrDigest::Digest(d) => Some(d),
            TagOrDigest::Tag(_) => None,
        }
    }
}

impl std::fmt::Display for TagOrDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagOrDigest::Tag(t) => write!(f, "{}", t),
            TagOrDigest::Digest(d) => write!(f, "{}", d),
        }
    }
}

/// A parsed signing target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactReference {
    /// Content in a remote registry.
    Remote {
        /// Registry host, optionally with port (e.g., "ghcr.io", "localhost:5000")
        registry: String,
        /// Repository path (e.g., "org/app")
        repository: String,
        tag_or_digest: TagOrDigest,
    },
    /// Content in a local OCI image layout directory.
    Local {
        layout_path: PathBuf,
        tag_or_digest: TagOrDigest,
    },
}

impl ArtifactReference {
    /// Parse a reference in the given mode.
    pub fn parse(raw: &str, mode: ReferenceMode) -> Result<Self> {
        match mode {
            ReferenceMode::Remote => Self::parse_remote(raw),
            ReferenceMode::Local => Self::parse_local(raw),
        }
    }

    /// Parse `<host>/<repository>(:<tag>|@<digest>)`.
    pub fn parse_remote(raw: &str) -> Result<Self> {
        let reference = raw.trim();
        if reference.is_empty() {
            return Err(invalid(raw, "empty reference"));
        }

        let (name, tag_or_digest) = if let Some(at_pos) = reference.rfind('@') {
            let digest = Digest::parse(&reference[at_pos + 1..])
                .map_err(|e| invalid(raw, &reason(e)))?;
            // A tag in front of the digest is redundant; the digest wins
            let name = strip_tag(&reference[..at_pos]);
            (name, TagOrDigest::Digest(digest))
        } else {
            let slash_pos = reference.rfind('/').unwrap_or(0);
            match reference[slash_pos..].rfind(':') {
                Some(colon_pos) => {
                    let split = slash_pos + colon_pos;
                    let tag = &reference[split + 1..];
                    validate_tag(tag).map_err(|e| invalid(raw, &reason(e)))?;
                    (&reference[..split], TagOrDigest::Tag(tag.to_string()))
                }
                None => return Err(invalid(raw, "missing tag or digest")),
            }
        };

        let (registry, repository) = name
            .split_once('/')
            .ok_or_else(|| invalid(raw, "missing registry host"))?;
        if registry.is_empty() {
            return Err(invalid(raw, "missing registry host"));
        }
        validate_repository(repository).map_err(|e| invalid(raw, &e))?;

        Ok(ArtifactReference::Remote {
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag_or_digest,
        })
    }

    /// Parse `<layout-path>(:<tag>|@<digest>)`.
    ///
    /// The tag or digest delimiter must appear in the final path segment, so
    /// colons in parent directories (`C:\layouts`, `/mnt/a:b/layout`) are kept
    /// as part of the path.
    pub fn parse_local(raw: &str) -> Result<Self> {
        let reference = raw.trim();
        if reference.is_empty() {
            return Err(invalid(raw, "empty reference"));
        }

        let segment_start = reference
            .rfind(|c: char| c == '/' || c == '\\')
            .map(|p| p + 1)
            .unwrap_or(0);
        let segment = &reference[segment_start..];

        let (path, tag_or_digest) = if let Some(at_pos) = segment.rfind('@') {
            let split = segment_start + at_pos;
            let digest = Digest::parse(&reference[split + 1..])
                .map_err(|e| invalid(raw, &reason(e)))?;
            (&reference[..split], TagOrDigest::Digest(digest))
        } else if let Some(colon_pos) = segment.rfind(':') {
            let split = segment_start + colon_pos;
            let tag = &reference[split + 1..];
            validate_tag(tag).map_err(|e| invalid(raw, &reason(e)))?;
            (&reference[..split], TagOrDigest::Tag(tag.to_string()))
        } else {
            return Err(invalid(raw, "missing tag or digest"));
        };

        if path.is_empty() {
            return Err(invalid(raw, "missing layout path"));
        }

        Ok(ArtifactReference::Local {
            layout_path: PathBuf::from(path),
            tag_or_digest,
        })
    }

    pub fn tag_or_digest(&self) -> &TagOrDigest {
        match self {
            ArtifactReference::Remote { tag_or_digest, .. } => tag_or_digest,
            ArtifactReference::Local { tag_or_digest, .. } => tag_or_digest,
        }
    }

    /// Local layout path, if this is a local reference.
    pub fn layout_path(&self) -> Option<&Path> {
        match self {
            ArtifactReference::Local { layout_path, .. } => Some(layout_path),
            ArtifactReference::Remote { .. } => None,
        }
    }

    /// The same location pinned to `digest`.
    pub fn with_digest(&self, digest: Digest) -> Self {
        let tag_or_digest = TagOrDigest::Digest(digest);
        match self {
            ArtifactReference::Remote {
                registry,
                repository,
                ..
            } => ArtifactReference::Remote {
                registry: registry.clone(),
                repository: repository.clone(),
                tag_or_digest,
            },
            ArtifactReference::Local { layout_path, .. } => ArtifactReference::Local {
                layout_path: layout_path.clone(),
                tag_or_digest,
            },
        }
    }

    /// Location without the tag or digest (`host/repo` or the layout path).
    pub fn location(&self) -> String {
        match self {
            ArtifactReference::Remote {
                registry,
                repository,
                ..
            } => format!("{}/{}", registry, repository),
            ArtifactReference::Local { layout_path, .. } => layout_path.display().to_string(),
        }
    }
}

impl std::fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.tag_or_digest() {
            TagOrDigest::Tag(tag) => write!(f, "{}:{}", self.location(), tag),
            TagOrDigest::Digest(digest) => write!(f, "{}@{}", self.location(), digest),
        }
    }
}

fn invalid(raw: &str, reason: &str) -> SignError {
    SignError::InvalidArgument(format!("invalid reference '{}': {}", raw, reason))
}

fn reason(err: SignError) -> String {
    match err {
        SignError::InvalidArgument(message) => message,
        other => other.to_string(),
    }
}

/// Drop a `:tag` suffix that follows the last `/`.
fn strip_tag(name: &str) -> &str {
    let slash_pos = name.rfind('/').unwrap_or(0);
    match name[slash_pos..].rfind(':') {
        Some(colon_pos) if slash_pos > 0 => &name[..slash_pos + colon_pos],
        _ => name,
    }
}

/// Tags match `[A-Za-z0-9_][A-Za-z0-9._-]{0,127}`.
fn validate_tag(tag: &str) -> Result<()> {
    let valid_start = tag
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_');
    let valid_rest = tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-');

    if !valid_start || !valid_rest || tag.len() > MAX_TAG_LEN {
        return Err(SignError::InvalidArgument(format!(
            "invalid tag '{}'",
            tag
        )));
    }
    Ok(())
}

/// Repository components are lowercase alphanumerics joined by `.`, `_` or `-`.
fn validate_repository(repository: &str) -> std::result::Result<(), String> {
    if repository.is_empty() {
        return Err("missing repository".to_string());
    }
    for component in repository.split('/') {
        let valid = !component.is_empty()
            && component
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-".contains(c))
            && component.starts_with(|c: char| c.is_ascii_alphanumeric());
        if !valid {
            return Err(format!("invalid repository component '{}'", component));
        }
    }
    Ok(())
}
