//! OCI Distribution Specification types.
//!
//! This module defines the registry payloads the console reads: catalogs,
//! tag lists, manifests (single-image and index) and error bodies.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Manifest and blob media types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType(String);

impl MediaType {
    /// OCI image manifest media type.
    pub const OCI_MANIFEST: &'static str = "application/vnd.oci.image.manifest.v1+json";

    /// OCI image index media type.
    pub const OCI_INDEX: &'static str = "application/vnd.oci.image.index.v1+json";

    /// Docker image manifest (schema 2) media type.
    pub const DOCKER_MANIFEST: &'static str =
        "application/vnd.docker.distribution.manifest.v2+json";

    /// Docker manifest list media type.
    pub const DOCKER_MANIFEST_LIST: &'static str =
        "application/vnd.docker.distribution.manifest.list.v2+json";

    /// Every manifest type the console can render, for `Accept` headers.
    pub const MANIFEST_TYPES: [&'static str; 4] = [
        Self::OCI_MANIFEST,
        Self::OCI_INDEX,
        Self::DOCKER_MANIFEST,
        Self::DOCKER_MANIFEST_LIST,
    ];

    /// Creates a new media type.
    #[must_use]
    pub fn new(media_type: impl Into<String>) -> Self {
        Self(media_type.into())
    }

    /// Returns the media type string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for index and manifest-list types.
    #[must_use]
    pub fn is_index(&self) -> bool {
        self.0 == Self::OCI_INDEX || self.0 == Self::DOCKER_MANIFEST_LIST
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MediaType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Serialize for MediaType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MediaType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self(s))
    }
}

/// Target platform of an index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// CPU architecture, e.g. `amd64`.
    pub architecture: String,

    /// Operating system, e.g. `linux`.
    pub os: String,

    /// CPU variant, e.g. `v8`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.variant {
            Some(ref variant) => write!(f, "{}/{}/{variant}", self.os, self.architecture),
            None => write!(f, "{}/{}", self.os, self.architecture),
        }
    }
}

/// OCI content descriptor.
///
/// A descriptor describes the disposition of targeted content. It includes
/// the type of the content, a content identifier (digest), and the byte-size
/// of the raw content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    pub media_type: MediaType,

    /// Digest of the targeted content.
    pub digest: String,

    /// Size in bytes of the content.
    pub size: u64,

    /// Platform of an index entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,

    /// Optional annotations (key-value metadata).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

impl Descriptor {
    /// Returns the digest algorithm (e.g., "sha256").
    #[must_use]
    pub fn digest_algorithm(&self) -> &str {
        digest_parts(&self.digest).0
    }

    /// Returns the digest value (without algorithm prefix).
    #[must_use]
    pub fn digest_value(&self) -> &str {
        digest_parts(&self.digest).1
    }
}

/// Splits `algorithm:hex` into its two halves.
pub(crate) fn digest_parts(digest: &str) -> (&str, &str) {
    digest.split_once(':').unwrap_or(("sha256", digest))
}

/// An image manifest or an image index.
///
/// Single-image manifests carry `config` and `layers`; indexes carry
/// `manifests`. Both shapes parse into this one type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Schema version (always 2).
    pub schema_version: u32,

    /// Media type of this manifest, when the document declares it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,

    /// Configuration descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Descriptor>,

    /// Layers that make up the image.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<Descriptor>,

    /// Per-platform manifests of an index.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifests: Vec<Descriptor>,

    /// Optional annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,

    /// Optional artifact type (OCI 1.1+).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
}

impl Manifest {
    /// Returns true if this is an index rather than a single image.
    #[must_use]
    pub fn is_index(&self) -> bool {
        self.media_type.as_ref().map_or(!self.manifests.is_empty(), MediaType::is_index)
    }

    /// Total size of the config and layers in bytes.
    #[must_use]
    pub fn image_size(&self) -> u64 {
        self.config.as_ref().map_or(0, |c| c.size) + self.layers.iter().map(|l| l.size).sum::<u64>()
    }
}

/// A manifest together with the metadata the registry sent alongside it.
#[derive(Debug, Clone)]
pub struct ManifestInfo {
    /// Parsed manifest.
    pub manifest: Manifest,

    /// Content digest (`Docker-Content-Digest`, or computed).
    pub digest: String,

    /// Response content type.
    pub media_type: Option<MediaType>,

    /// Manifest bytes exactly as served.
    pub raw: Vec<u8>,
}

/// Response from the `/v2/_catalog` endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Repository names.
    #[serde(default)]
    pub repositories: Vec<String>,
}

/// Response from the `/v2/<name>/tags/list` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagList {
    /// Repository name.
    pub name: String,

    /// List of tags; registries send `null` for an empty repository.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// An entry of the `/v2/repositories` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryInfo {
    /// Repository name.
    pub name: String,

    /// Creation time.
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,

    /// Last update time.
    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,

    /// Number of manifests held.
    #[serde(default)]
    pub tag_count: u64,
}

/// Error response from registry API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// List of errors.
    pub errors: Vec<RegistryApiError>,
}

impl ErrorResponse {
    /// Parses an error body, if it has the registry's error shape.
    #[must_use]
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }
}

/// Individual error from registry API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryApiError {
    /// Error code.
    pub code: String,

    /// Human-readable message.
    pub message: String,

    /// Additional details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_digest_parts() {
        let desc: Descriptor = serde_json::from_str(
            r#"{"mediaType":"application/vnd.oci.image.layer.v1.tar+gzip","digest":"sha256:abc123def456","size":1024}"#,
        )
        .unwrap();
        assert_eq!(desc.size, 1024);
        assert_eq!(desc.digest_algorithm(), "sha256");
        assert_eq!(desc.digest_value(), "abc123def456");
    }

    #[test]
    fn test_image_manifest_parsing() {
        let json = r#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
            "config": {"mediaType": "application/vnd.docker.container.image.v1+json", "digest": "sha256:c0", "size": 1470},
            "layers": [
                {"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "digest": "sha256:l1", "size": 2000000},
                {"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "digest": "sha256:l2", "size": 30}
            ]
        }"#;

        let manifest: Manifest = serde_json::from_str(json).unwrap();
        assert!(!manifest.is_index());
        assert_eq!(manifest.layers.len(), 2);
        assert_eq!(manifest.image_size(), 1470 + 2_000_000 + 30);
    }

    #[test]
    fn test_index_parsing() {
        let json = r#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "manifests": [
                {"mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": "sha256:a", "size": 500,
                 "platform": {"architecture": "arm64", "os": "linux", "variant": "v8"}},
                {"mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": "sha256:b", "size": 501,
                 "platform": {"architecture": "amd64", "os": "linux"}}
            ]
        }"#;

        let manifest: Manifest = serde_json::from_str(json).unwrap();
        assert!(manifest.is_index());
        assert_eq!(manifest.image_size(), 0);
        let platforms: Vec<String> = manifest
            .manifests
            .iter()
            .filter_map(|m| m.platform.as_ref().map(ToString::to_string))
            .collect();
        assert_eq!(platforms, ["linux/arm64/v8", "linux/amd64"]);
    }

    #[test]
    fn test_index_without_media_type() {
        let manifest: Manifest = serde_json::from_str(
            r#"{"schemaVersion":2,"manifests":[{"mediaType":"x","digest":"sha256:a","size":1}]}"#,
        )
        .unwrap();
        assert!(manifest.is_index());
    }

    #[test]
    fn test_tag_list_deserialization() {
        let tags: TagList =
            serde_json::from_str(r#"{"name": "library/nginx", "tags": ["1.25", "latest"]}"#)
                .unwrap();
        assert_eq!(tags.name, "library/nginx");
        assert_eq!(tags.tags.unwrap().len(), 2);

        let empty: TagList = serde_json::from_str(r#"{"name": "scratch", "tags": null}"#).unwrap();
        assert!(empty.tags.is_none());
    }

    #[test]
    fn test_repository_info_deserialization() {
        let info: RepositoryInfo = serde_json::from_str(
            r#"{"name":"busybox","createdAt":"2025-03-01T10:15:30.123","updatedAt":null,"tagCount":3}"#,
        )
        .unwrap();
        assert_eq!(info.name, "busybox");
        assert_eq!(info.tag_count, 3);
        assert!(info.created_at.is_some());
        assert!(info.updated_at.is_none());
    }

    #[test]
    fn test_error_response_parse() {
        let parsed = ErrorResponse::parse(
            r#"{"errors":[{"code":"NAME_UNKNOWN","message":"repository name not known to registry","detail":"nope"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.errors[0].code, "NAME_UNKNOWN");
        assert!(ErrorResponse::parse("404 page not found").is_none());
    }
}
