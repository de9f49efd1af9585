//! Remote registry repository over the OCI distribution API.
//!
//! Requests start anonymous. A `401` carrying a `WWW-Authenticate` challenge
//! is answered once: basic credentials are attached directly, a bearer
//! challenge is exchanged for a token at its realm. The resulting
//! `Authorization` value is reused for later requests.

use std::collections::BTreeMap;

use a3s_sign_core::descriptor::{OCI_IMAGE_INDEX, MANIFEST_MEDIA_TYPES};
use a3s_sign_core::error::{PushFailureKind, Result, SignError, STALE_REFERRERS_INDEX_MESSAGE};
use a3s_sign_core::{Descriptor, Digest};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::Mutex;
use reqwest::header::{
    HeaderMap, ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, WWW_AUTHENTICATE,
};
use reqwest::{Method, StatusCode};

use super::credentials::CredentialStore;
use super::manifest::SignatureManifest;
use crate::repository::{SignatureManifestKind, SignatureRepository};
use crate::signer::SignedEnvelope;

const DOCKER_CONTENT_DIGEST: &str = "Docker-Content-Digest";
const OCI_SUBJECT: &str = "OCI-Subject";

/// Environment variables consulted when no credentials are stored.
pub const USERNAME_ENV: &str = "A3S_SIGN_USERNAME";
pub const PASSWORD_ENV: &str = "A3S_SIGN_PASSWORD";

/// Authentication credentials for a container registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    /// Create anonymous authentication (no credentials).
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Create basic authentication with username and password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Read `A3S_SIGN_USERNAME` and `A3S_SIGN_PASSWORD`.
    ///
    /// Falls back to anonymous unless both are set.
    pub fn from_env() -> Self {
        match (std::env::var(USERNAME_ENV), std::env::var(PASSWORD_ENV)) {
            (Ok(username), Ok(password)) => Self::basic(username, password),
            _ => Self::anonymous(),
        }
    }

    /// Credential store first, then environment, then anonymous.
    pub fn from_credential_store(registry: &str) -> Self {
        match CredentialStore::default_path().get(registry) {
            Ok(Some((username, password))) => Self::basic(username, password),
            Ok(None) => Self::from_env(),
            Err(e) => {
                tracing::warn!(registry, error = %e, "Ignoring unreadable credential store");
                Self::from_env()
            }
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.credentials().is_none()
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }

    fn basic_header(&self) -> Option<String> {
        self.credentials()
            .map(|(u, p)| format!("Basic {}", STANDARD.encode(format!("{}:{}", u, p))))
    }
}

/// A parsed `WWW-Authenticate` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Lowercased scheme (`basic`, `bearer`)
    pub scheme: String,
    pub params: BTreeMap<String, String>,
}

/// Parse `Bearer realm="...",service="...",scope="..."`.
///
/// Quoted values may contain commas.
pub fn parse_challenge(header: &str) -> Option<Challenge> {
    let header = header.trim();
    let (scheme, rest) = match header.split_once(' ') {
        Some((scheme, rest)) => (scheme, rest),
        None => (header, ""),
    };
    if scheme.is_empty() {
        return None;
    }

    let mut params = BTreeMap::new();
    let mut chars = rest.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if *c == ',' || c.is_whitespace()) {
            chars.next();
        }
        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if key.trim().is_empty() {
            break;
        }
        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    c => value.push(c),
                }
            }
        } else {
            while let Some(c) = chars.peek() {
                if *c == ',' {
                    break;
                }
                value.push(*c);
                chars.next();
            }
        }
        params.insert(key.trim().to_lowercase(), value.trim().to_string());
    }

    Some(Challenge {
        scheme: scheme.to_lowercase(),
        params,
    })
}

/// Repository on a remote registry.
pub struct RegistryRepository {
    http: reqwest::Client,
    registry: String,
    repository: String,
    base_url: String,
    auth: RegistryAuth,
    authorization: Mutex<Option<String>>,
}

impl RegistryRepository {
    /// Create a client for `registry/repository`. `insecure` selects plain HTTP.
    pub fn new(
        registry: &str,
        repository: &str,
        auth: RegistryAuth,
        insecure: bool,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("a3s-sign/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SignError::RegistryError {
                registry: registry.to_string(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        let scheme = if insecure { "http" } else { "https" };
        let base_url = format!("{}://{}", scheme, api_host(registry));

        tracing::debug!(
            registry,
            repository,
            %base_url,
            anonymous = auth.is_anonymous(),
            "Opened registry repository"
        );
        Ok(Self {
            http,
            registry: registry.to_string(),
            repository: repository.to_string(),
            base_url,
            auth,
            authorization: Mutex::new(None),
        })
    }

    fn error(&self, message: impl Into<String>) -> SignError {
        SignError::RegistryError {
            registry: self.registry.clone(),
            message: message.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/{}/{}", self.base_url, self.repository, path)
    }

    /// Send a request, answering one authentication challenge.
    async fn send<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let response = self.dispatch(&build).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_challenge);
        let authorization = match challenge {
            Some(c) if c.scheme == "bearer" => {
                Some(format!("Bearer {}", self.fetch_token(&c).await?))
            }
            Some(c) if c.scheme == "basic" => self.auth.basic_header(),
            _ => None,
        };
        let Some(authorization) = authorization else {
            return Ok(response);
        };

        *self.authorization.lock() = Some(authorization);
        self.dispatch(&build).await
    }

    async fn dispatch<F>(&self, build: &F) -> Result<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let mut request = build(&self.http);
        let authorization = self.authorization.lock().clone();
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }
        request
            .send()
            .await
            .map_err(|e| self.error(format!("Request failed: {}", e)))
    }

    /// Exchange a bearer challenge for a token.
    async fn fetch_token(&self, challenge: &Challenge) -> Result<String> {
        let realm = challenge
            .params
            .get("realm")
            .ok_or_else(|| self.error("Bearer challenge without realm"))?;
        let scope = challenge
            .params
            .get("scope")
            .cloned()
            .unwrap_or_else(|| format!("repository:{}:pull,push", self.repository));

        let mut query = vec![("scope", scope.as_str())];
        if let Some(service) = challenge.params.get("service") {
            query.push(("service", service.as_str()));
        }

        let mut request = self.http.get(realm).query(&query);
        if let Some((username, password)) = self.auth.credentials() {
            request = request.basic_auth(username, Some(password));
        }

        tracing::debug!(realm = %realm, scope = %scope, "Requesting registry token");
        let response = request
            .send()
            .await
            .map_err(|e| self.error(format!("Token request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(self.error(format!("Token request failed: HTTP {}", response.status())));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.error(format!("Malformed token response: {}", e)))?;

        body["token"]
            .as_str()
            .or_else(|| body["access_token"].as_str())
            .map(str::to_string)
            .ok_or_else(|| self.error("Token response holds no token"))
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
        action: &str,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(self.error(format!("{} failed: HTTP {} {}", action, status, body.trim())))
    }

    /// Fetch a manifest; `None` when the registry reports it missing.
    async fn fetch_manifest(
        &self,
        reference: &str,
        accept: &str,
    ) -> Result<Option<(String, Vec<u8>)>> {
        let url = self.url(&format!("manifests/{}", reference));
        let response = self.send(|http| http.get(&url).header(ACCEPT, accept)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = self.check_status(response, "Fetching manifest").await?;
        let media_type = media_type_of(response.headers()).unwrap_or_default();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.error(format!("Failed to read manifest: {}", e)))?;
        Ok(Some((media_type, bytes.to_vec())))
    }

    /// PUT a manifest. Returns whether the registry acknowledged its subject.
    async fn push_manifest(&self, reference: &str, media_type: &str, bytes: &[u8]) -> Result<bool> {
        let url = self.url(&format!("manifests/{}", reference));
        let response = self
            .send(|http| {
                http.put(&url)
                    .header(CONTENT_TYPE, media_type)
                    .body(bytes.to_vec())
            })
            .await?;
        let response = self.check_status(response, "Pushing manifest").await?;
        Ok(response.headers().contains_key(OCI_SUBJECT))
    }

    async fn delete_manifest(&self, digest: &Digest) -> Result<()> {
        let url = self.url(&format!("manifests/{}", digest));
        let response = self.send(|http| http.delete(&url)).await?;
        self.check_status(response, "Deleting manifest").await?;
        Ok(())
    }

    async fn blob_exists(&self, digest: &Digest) -> Result<bool> {
        let url = self.url(&format!("blobs/{}", digest));
        let response = self.send(|http| http.head(&url)).await?;
        Ok(response.status().is_success())
    }

    /// Monolithic upload: POST for a session, then PUT with the digest.
    async fn push_blob(&self, descriptor: &Descriptor, data: &[u8]) -> Result<()> {
        if self.blob_exists(&descriptor.digest).await? {
            tracing::debug!(digest = %descriptor.digest, "Blob already present");
            return Ok(());
        }

        let url = self.url("blobs/uploads/");
        let response = self.send(|http| http.post(&url)).await?;
        let response = self.check_status(response, "Starting blob upload").await?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| self.error("Blob upload response without Location"))?;
        let location = if location.starts_with('/') {
            format!("{}{}", self.base_url, location)
        } else {
            location.to_string()
        };
        let separator = if location.contains('?') { '&' } else { '?' };
        let upload_url = format!("{}{}digest={}", location, separator, descriptor.digest);

        let response = self
            .send(|http| {
                http.put(&upload_url)
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(data.to_vec())
            })
            .await?;
        self.check_status(response, "Uploading blob").await?;

        tracing::debug!(digest = %descriptor.digest, size = data.len(), "Blob uploaded");
        Ok(())
    }

    async fn referrers_api_supported(&self, subject: &Descriptor) -> Result<bool> {
        let url = self.url(&format!("referrers/{}", subject.digest));
        let response = self
            .send(|http| http.get(&url).header(ACCEPT, OCI_IMAGE_INDEX))
            .await?;
        Ok(response.status().is_success())
    }

    /// Maintain the `sha256-<hex>` referrers index for registries without
    /// the referrers API.
    async fn update_referrers_index(
        &self,
        subject: &Descriptor,
        signature: &Descriptor,
    ) -> Result<()> {
        let tag = referrers_tag(&subject.digest);
        let existing = self.fetch_manifest(&tag, OCI_IMAGE_INDEX).await?;

        let (old_digest, mut manifests) = match &existing {
            Some((_, bytes)) => {
                let index: serde_json::Value = serde_json::from_slice(bytes)?;
                let manifests = index["manifests"].as_array().cloned().unwrap_or_default();
                (Some(Digest::sha256_of(bytes)), manifests)
            }
            None => (None, Vec::new()),
        };

        let signature_digest = signature.digest.to_string();
        if manifests
            .iter()
            .any(|m| m["digest"].as_str() == Some(signature_digest.as_str()))
        {
            return Ok(());
        }
        manifests.push(serde_json::to_value(signature)?);

        let index = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": OCI_IMAGE_INDEX,
            "manifests": manifests,
        });
        let bytes = serde_json::to_vec(&index)?;
        self.push_manifest(&tag, OCI_IMAGE_INDEX, &bytes).await?;
        tracing::debug!(tag = %tag, referrers = manifests.len(), "Referrers index updated");

        if let Some(old_digest) = old_digest {
            if let Err(e) = self.delete_manifest(&old_digest).await {
                return Err(SignError::SignaturePushFailed {
                    kind: PushFailureKind::StaleReferrersIndex,
                    message: format!("{} {}: {}", STALE_REFERRERS_INDEX_MESSAGE, old_digest, e),
                    signature: Some(signature.clone()),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SignatureRepository for RegistryRepository {
    async fn resolve(&self, reference: &str) -> Result<Descriptor> {
        let url = self.url(&format!("manifests/{}", reference));
        let accept = MANIFEST_MEDIA_TYPES.join(", ");
        let expected = Digest::parse(reference).ok();

        let response = self
            .send(|http| http.request(Method::HEAD, &url).header(ACCEPT, accept.as_str()))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SignError::NotFound(format!(
                "{}/{}{}{}",
                self.registry,
                self.repository,
                if expected.is_some() { "@" } else { ":" },
                reference
            )));
        }
        let response = self.check_status(response, "Resolving manifest").await?;
        let headers = response.headers();

        let header_digest = headers
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Digest::parse(v).ok());
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let media_type = media_type_of(headers);

        let descriptor = match (header_digest, size, media_type) {
            (Some(digest), Some(size), Some(media_type)) if size > 0 => {
                Descriptor::new(media_type, digest, size)
            }
            _ => {
                tracing::debug!(reference, "HEAD incomplete, fetching manifest");
                let (media_type, bytes) = self
                    .fetch_manifest(reference, &accept)
                    .await?
                    .ok_or_else(|| {
                        SignError::NotFound(format!(
                            "{}/{}:{}",
                            self.registry, self.repository, reference
                        ))
                    })?;
                let digest = match &expected {
                    Some(d) if d.matches(&bytes) => d.clone(),
                    _ => Digest::sha256_of(&bytes),
                };
                Descriptor::new(media_type, digest, bytes.len() as u64)
            }
        };

        if let Some(expected) = expected {
            if descriptor.digest != expected {
                return Err(self.error(format!(
                    "Registry returned digest {} for {}",
                    descriptor.digest, expected
                )));
            }
        }
        Ok(descriptor)
    }

    async fn push_signature(
        &self,
        kind: SignatureManifestKind,
        envelope: &SignedEnvelope,
        subject: &Descriptor,
    ) -> Result<Descriptor> {
        let manifest = SignatureManifest::build(kind, envelope, subject, chrono::Utc::now())?;

        for (descriptor, data) in &manifest.blobs {
            self.push_blob(descriptor, data).await?;
        }

        let subject_acknowledged = self
            .push_manifest(
                &manifest.descriptor.digest.to_string(),
                &manifest.descriptor.media_type,
                &manifest.bytes,
            )
            .await?;

        tracing::info!(
            registry = %self.registry,
            repository = %self.repository,
            signature = %manifest.descriptor.digest,
            kind = %kind,
            "Signature manifest pushed"
        );

        if kind == SignatureManifestKind::Image
            && !subject_acknowledged
            && !self.referrers_api_supported(subject).await?
        {
            self.update_referrers_index(subject, &manifest.descriptor).await?;
        }

        Ok(manifest.descriptor)
    }
}

/// Docker Hub serves the API from a different host.
fn api_host(registry: &str) -> &str {
    match registry {
        "docker.io" | "index.docker.io" => "registry-1.docker.io",
        other => other,
    }
}

/// Tag of the fallback referrers index for `digest`.
pub fn referrers_tag(digest: &Digest) -> String {
    format!("{}-{}", digest.algorithm().as_str(), digest.hex())
}

fn media_type_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty())
}
