//! OCI wire types shared by the registry handlers.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};

/// Media types the registry classifies manifests by.
pub mod media_type {
    /// OCI image manifest.
    pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
    /// OCI image index.
    pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
    /// Docker schema 2 image manifest.
    pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
    /// Docker schema 2 manifest list.
    pub const DOCKER_MANIFEST_LIST: &str =
        "application/vnd.docker.distribution.manifest.list.v2+json";

    const DOCKER_FOREIGN_LAYER: &str = "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip";
    const OCI_RESTRICTED_LAYER: &str =
        "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip";
    const OCI_UNCOMPRESSED_RESTRICTED_LAYER: &str =
        "application/vnd.oci.image.layer.nondistributable.v1.tar";

    /// Whether this media type is a single-image manifest.
    pub fn is_image(media_type: &str) -> bool {
        matches!(media_type, OCI_MANIFEST | DOCKER_MANIFEST)
    }

    /// Whether this media type is a manifest index (multi-arch image or
    /// artifact set).
    pub fn is_index(media_type: &str) -> bool {
        matches!(media_type, OCI_INDEX | DOCKER_MANIFEST_LIST)
    }

    /// Whether content of this media type may be freely pushed and pulled.
    /// Foreign and non-distributable layers may not.
    pub fn is_distributable(media_type: &str) -> bool {
        !matches!(
            media_type,
            DOCKER_FOREIGN_LAYER | OCI_RESTRICTED_LAYER | OCI_UNCOMPRESSED_RESTRICTED_LAYER
        )
    }
}

/// A content digest of the form `<algorithm>:<hex>`.
///
/// Parsing validates the algorithm and the hex payload, so a `Digest` value
/// always names well-formed content-addressed bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: String,
    hex: String,
}

impl Digest {
    /// Digest of `data` under SHA-256.
    pub fn sha256(data: &[u8]) -> Self {
        Digest {
            algorithm: "sha256".to_string(),
            hex: hex::encode(Sha256::digest(data)),
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

/// Error parsing a string as a [`Digest`].
#[derive(Debug, thiserror::Error)]
#[error("invalid digest {0:?}")]
pub struct InvalidDigest(String);

impl FromStr for Digest {
    type Err = InvalidDigest;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((algorithm, hex)) = s.split_once(':') else {
            return Err(InvalidDigest(s.to_string()));
        };

        let expected_len = match algorithm {
            "sha256" => 64,
            "sha512" => 128,
            _ => return Err(InvalidDigest(s.to_string())),
        };
        if hex.len() != expected_len
            || !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(InvalidDigest(s.to_string()));
        }

        Ok(Digest {
            algorithm: algorithm.to_string(),
            hex: hex.to_string(),
        })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// OCI content descriptor, as it appears in manifests, indexes and the
/// referrers response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default)]
    pub media_type: String,
    pub digest: Digest,
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
}

/// OCI image manifest, parsed only as far as the registry needs for
/// dependency collection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    #[serde(default)]
    pub schema_version: i64,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub config: Option<Descriptor>,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
    #[serde(default)]
    pub subject: Option<Descriptor>,
}

/// OCI image index. The serialized form doubles as the referrers response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexManifest {
    pub schema_version: i64,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input() {
        let digest = Digest::sha256(b"");
        assert_eq!(
            digest.to_string(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(digest.algorithm(), "sha256");
    }

    #[test]
    fn parse_roundtrip() {
        let raw = "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        let digest: Digest = raw.parse().unwrap();
        assert_eq!(digest.to_string(), raw);
    }

    #[test]
    fn parse_rejects_malformed_digests() {
        for raw in [
            "",
            "latest",
            "sha256:",
            "sha256:abc",
            "sha256:E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855",
            "md5:d41d8cd98f00b204e9800998ecf8427e",
            "sha256:zzb0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        ] {
            assert!(raw.parse::<Digest>().is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn descriptor_serde() {
        let digest = Digest::sha256(b"config");
        let descriptor = Descriptor {
            media_type: media_type::OCI_MANIFEST.to_string(),
            digest: digest.clone(),
            size: 42,
            artifact_type: None,
        };

        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["digest"], digest.to_string());
        assert_eq!(value["size"], 42);
        assert!(value.get("artifactType").is_none());

        let parsed: Descriptor = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, descriptor);
    }

    #[test]
    fn media_type_predicates() {
        assert!(media_type::is_image(media_type::OCI_MANIFEST));
        assert!(media_type::is_image(media_type::DOCKER_MANIFEST));
        assert!(!media_type::is_image(media_type::OCI_INDEX));

        assert!(media_type::is_index(media_type::OCI_INDEX));
        assert!(media_type::is_index(media_type::DOCKER_MANIFEST_LIST));
        assert!(!media_type::is_index("application/vnd.example.artifact"));

        assert!(media_type::is_distributable(media_type::OCI_MANIFEST));
        assert!(!media_type::is_distributable(
            "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip"
        ));
    }
}
