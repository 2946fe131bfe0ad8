use std::path::PathBuf;

use crate::error::AppError;

const BLOBS_PATH: &str = "docker/registry/v2/blobs";
const BLOB_FILENAME: &str = "data";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BlobSizes {
    pub sizes: Vec<u64>,
    pub total: u64,
}

/// Resolves blob sizes statically from the registry's storage mount, without
/// going through the registry API.
pub struct BlobSizeReader {
    mount_root: PathBuf,
}

impl BlobSizeReader {
    pub fn new(mount_root: impl Into<PathBuf>) -> Self {
        Self {
            mount_root: mount_root.into(),
        }
    }

    /// Maps `algorithm:hex` onto the registry's on-disk blob layout and reads
    /// the data file's length.
    pub async fn blob_size(&self, digest: &str) -> Result<u64, AppError> {
        let (algorithm, hex) = digest
            .split_once(':')
            .ok_or_else(|| AppError::DigestInvalid(digest.to_string()))?;
        if algorithm.is_empty() || hex.len() < 2 {
            return Err(AppError::DigestInvalid(digest.to_string()));
        }

        let path = self
            .mount_root
            .join(BLOBS_PATH)
            .join(algorithm)
            .join(&hex[..2])
            .join(hex)
            .join(BLOB_FILENAME);
        Ok(tokio::fs::metadata(path).await?.len())
    }

    pub async fn blob_sizes(&self, digests: &[String]) -> Result<BlobSizes, AppError> {
        let mut result = BlobSizes {
            sizes: Vec::with_capacity(digests.len()),
            total: 0,
        };
        for digest in digests {
            let size = self.blob_size(digest).await?;
            result.sizes.push(size);
            result.total += size;
        }
        Ok(result)
    }
}
