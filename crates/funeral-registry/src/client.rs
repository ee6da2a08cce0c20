//! OCI Distribution API client for browsing the registry.
//!
//! Every call goes through the session's [`Dispatcher`], so each one carries
//! the current credential and a `401` logs the session out.

use funeral_session::{ApiRequest, Dispatcher};
use sha2::{Digest, Sha256};

use crate::error::RegistryError;
use crate::oci::{digest_parts, Catalog, Manifest, ManifestInfo, MediaType, RepositoryInfo, TagList};

/// Client for the registry's read and delete endpoints.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    dispatcher: Dispatcher,
}

impl RegistryClient {
    /// Creates a client over an authorized dispatcher.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    ///
    /// use funeral_registry::RegistryClient;
    /// use funeral_session::{ClientConfig, Dispatcher, MemoryCredentialStore, Session};
    ///
    /// let config = ClientConfig::new("https://registry.example.com");
    /// let session = Session::new(config, Arc::new(MemoryCredentialStore::new()))?;
    /// let client = RegistryClient::new(Dispatcher::new(Arc::new(session)));
    /// # Ok::<(), funeral_session::ApiError>(())
    /// ```
    #[must_use]
    pub const fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Returns the dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Lists repository names.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be retrieved.
    pub async fn catalog(&self) -> Result<Vec<String>, RegistryError> {
        let catalog: Catalog = self.dispatcher.get_json("/v2/_catalog").await?;
        Ok(catalog.repositories)
    }

    /// Lists repositories with their tag counts and timestamps.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing cannot be retrieved.
    pub async fn repositories(&self) -> Result<Vec<RepositoryInfo>, RegistryError> {
        Ok(self.dispatcher.get_json("/v2/repositories").await?)
    }

    /// Lists all tags of a repository. An unknown repository has no tags.
    ///
    /// # Errors
    ///
    /// Returns an error if the tags cannot be retrieved.
    pub async fn list_tags(&self, repository: &str) -> Result<Vec<String>, RegistryError> {
        validate_repository(repository)?;

        match self
            .dispatcher
            .get_json::<TagList>(&format!("/v2/{repository}/tags/list"))
            .await
        {
            Ok(list) => Ok(list.tags.unwrap_or_default()),
            Err(funeral_session::ApiError::Http { status: 404, .. }) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetches a manifest by tag or digest.
    ///
    /// When `reference` is a digest the served bytes are verified against it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown manifest,
    /// [`RegistryError::ChecksumMismatch`] if the content does not match the
    /// requested digest, and [`RegistryError::InvalidManifest`] if it cannot
    /// be parsed.
    pub async fn manifest(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<ManifestInfo, RegistryError> {
        validate_repository(repository)?;
        validate_reference(reference)?;
        let resource = || format!("{repository}:{reference}");

        let request = ApiRequest::get(format!("/v2/{repository}/manifests/{reference}"))
            .accept(MediaType::MANIFEST_TYPES.join(", "));
        let response = self
            .dispatcher
            .send(request)
            .await
            .map_err(|e| RegistryError::not_found_as(e, resource))?;

        let served_digest = response.header("docker-content-digest").map(String::from);
        let media_type = response.content_type.as_deref().map(MediaType::from);
        let raw = response.into_bytes();

        if is_digest(reference) {
            verify_digest(&resource(), reference, &raw)?;
        }
        let digest = served_digest.unwrap_or_else(|| compute_digest(&raw));

        let manifest: Manifest =
            serde_json::from_slice(&raw).map_err(|e| RegistryError::InvalidManifest {
                resource: resource(),
                message: e.to_string(),
            })?;

        tracing::debug!(repository, reference, %digest, "Fetched manifest");
        Ok(ManifestInfo {
            manifest,
            digest,
            media_type,
            raw,
        })
    }

    /// Downloads a blob and verifies it against its digest.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown blob and
    /// [`RegistryError::ChecksumMismatch`] for corrupt content.
    pub async fn blob(&self, repository: &str, digest: &str) -> Result<Vec<u8>, RegistryError> {
        validate_repository(repository)?;
        validate_digest(digest)?;
        let resource = || format!("{repository}@{digest}");

        let data = self
            .dispatcher
            .get_bytes(&format!("/v2/{repository}/blobs/{digest}"))
            .await
            .map_err(|e| RegistryError::not_found_as(e, resource))?;

        verify_digest(&resource(), digest, &data)?;
        tracing::debug!(repository, digest, size = data.len(), "Fetched blob");
        Ok(data)
    }

    /// Checks whether a blob exists.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidReference`] if `digest` is not a
    /// digest, or an error if the registry cannot be contacted.
    pub async fn blob_exists(&self, repository: &str, digest: &str) -> Result<bool, RegistryError> {
        validate_repository(repository)?;
        validate_digest(digest)?;
        Ok(self
            .dispatcher
            .head(&format!("/v2/{repository}/blobs/{digest}"))
            .await?)
    }

    /// Deletes a manifest by tag or digest.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown manifest.
    pub async fn delete_manifest(&self, repository: &str, reference: &str) -> Result<(), RegistryError> {
        validate_repository(repository)?;
        validate_reference(reference)?;

        self.dispatcher
            .delete(&format!("/v2/{repository}/manifests/{reference}"))
            .await
            .map_err(|e| RegistryError::not_found_as(e, || format!("{repository}:{reference}")))?;

        tracing::info!(repository, reference, "Deleted manifest");
        Ok(())
    }

    /// Deletes a repository with all its tags.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown repository.
    pub async fn delete_repository(&self, repository: &str) -> Result<(), RegistryError> {
        validate_repository(repository)?;

        self.dispatcher
            .delete(&format!("/v2/{repository}/"))
            .await
            .map_err(|e| RegistryError::not_found_as(e, || repository.to_string()))?;

        tracing::info!(repository, "Deleted repository");
        Ok(())
    }
}

/// Computes SHA-256 digest of data.
#[must_use]
pub fn compute_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Returns true if `reference` names content by digest rather than by tag.
fn is_digest(reference: &str) -> bool {
    reference.contains(':')
}

/// Checks `data` against `expected`. Only sha256 digests can be verified;
/// other algorithms are accepted as served.
fn verify_digest(resource: &str, expected: &str, data: &[u8]) -> Result<(), RegistryError> {
    let (algorithm, _) = digest_parts(expected);
    if algorithm != "sha256" {
        tracing::debug!(resource, algorithm, "Skipping verification of unsupported digest");
        return Ok(());
    }

    let actual = compute_digest(data);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(RegistryError::ChecksumMismatch {
            resource: resource.to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}

fn validate_repository(repository: &str) -> Result<(), RegistryError> {
    let valid = !repository.is_empty()
        && !repository.starts_with('/')
        && !repository.ends_with('/')
        && repository
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..");
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidReference {
            reference: repository.to_string(),
        })
    }
}

fn validate_digest(digest: &str) -> Result<(), RegistryError> {
    if is_digest(digest) && !digest.contains('/') {
        Ok(())
    } else {
        Err(RegistryError::InvalidReference {
            reference: digest.to_string(),
        })
    }
}

fn validate_reference(reference: &str) -> Result<(), RegistryError> {
    if reference.is_empty() || reference.contains('/') {
        return Err(RegistryError::InvalidReference {
            reference: reference.to_string(),
        });
    }
    Ok(())
}
