use serde::Serialize;

/// A content-addressed binary object's bytes, keyed by `digest`; see
/// [`crate::oci_digest::OciDigest`].
#[derive(Debug, Clone)]
pub struct BlobContent {
    pub digest: String,
    pub size: i64,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ManifestRow {
    pub repository: String,
    pub reference: String,
    pub digest: String,
    pub media_type: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GcResult {
    #[serde(rename = "blobsRemoved")]
    pub blobs_removed: i64,
    #[serde(rename = "spaceFreed")]
    pub space_freed: i64,
    #[serde(rename = "manifestsRemoved")]
    pub manifests_removed: i64,
    #[serde(rename = "orphanedSessions")]
    pub orphaned_sessions: i64,
}
