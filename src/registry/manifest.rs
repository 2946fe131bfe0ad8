use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::format_timestamp;

pub const MANIFEST_V1_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v1+json";
pub const MANIFEST_V2_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Docker image manifest, schema 1. Carries the human-facing metadata the
/// summary needs (name, tag, architecture, creation history).
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestV1 {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// Each history entry embeds a JSON document as a string; the first entry's
/// `created` field is the image creation time.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "v1Compatibility")]
    pub v1_compatibility: String,
}

/// Docker image manifest, schema 2. Carries the size information.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestV2 {
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Descriptor {
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSummary {
    pub name: String,
    pub tag: String,
    pub architecture: String,
    pub created: String,
    pub size: u64,
    #[serde(rename = "dockerContentDigest")]
    pub content_digest: String,
}

/// Merges the two manifest schema versions into one summary: identity and
/// creation time from schema 1, total size from schema 2, content digest from
/// the schema 2 response header.
pub fn summarize(v1: &ManifestV1, v2: &ManifestV2, content_digest: String) -> ManifestSummary {
    let size = v2.config.size + v2.layers.iter().map(|layer| layer.size).sum::<u64>();

    let created = v1
        .history
        .first()
        .and_then(|entry| serde_json::from_str::<serde_json::Value>(&entry.v1_compatibility).ok())
        .and_then(|doc| doc.get("created")?.as_str().map(str::to_string))
        .unwrap_or_else(|| format_timestamp(DateTime::<Utc>::UNIX_EPOCH));

    ManifestSummary {
        name: v1.name.clone(),
        tag: v1.tag.clone(),
        architecture: v1.architecture.clone(),
        created,
        size,
        content_digest,
    }
}
