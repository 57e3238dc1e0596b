//! Deployment artifact handling.
//!
//! Building the artifact (vendoring dependencies, assembling the zip) is a
//! separate concern; the deployer consumes it as an opaque file and only
//! needs its path, size, and a content hash for change detection.

use anyhow::{Context, Result, bail};
use awskit::LAMBDA_PACKAGE_LIMIT_BYTES;
use std::fs;
use std::path::Path;

/// The resolved deployment artifact for one deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageArtifact {
    pub filename: String,
    pub content_hash: String,
    pub size: u64,
}

impl PackageArtifact {
    /// Resolve and hash the artifact at `path`.
    ///
    /// Oversized artifacts are only warned about here; the provider
    /// enforces the hard limit and the executor surfaces that failure
    /// with the measured numbers.
    pub fn resolve(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!(
                "No deployment artifact at {} (build your package first)",
                path.display()
            );
        }

        let bytes = fs::read(path)
            .with_context(|| format!("Could not read artifact {}", path.display()))?;
        let size = bytes.len() as u64;
        if size > LAMBDA_PACKAGE_LIMIT_BYTES {
            log::warn!(
                "Artifact {} is {} bytes, over the {} byte service limit",
                path.display(),
                size,
                LAMBDA_PACKAGE_LIMIT_BYTES
            );
        }

        Ok(Self {
            filename: path.display().to_string(),
            content_hash: blake3::hash(&bytes).to_hex().to_string(),
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_size_and_stable_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployment.zip");
        fs::write(&path, b"zip bytes").unwrap();

        let first = PackageArtifact::resolve(&path).unwrap();
        let second = PackageArtifact::resolve(&path).unwrap();
        assert_eq!(first.size, 9);
        assert_eq!(first.content_hash, second.content_hash);
    }

    #[test]
    fn hash_tracks_content_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployment.zip");

        fs::write(&path, b"v1").unwrap();
        let first = PackageArtifact::resolve(&path).unwrap();
        fs::write(&path, b"v2").unwrap();
        let second = PackageArtifact::resolve(&path).unwrap();
        assert_ne!(first.content_hash, second.content_hash);
    }

    #[test]
    fn missing_artifact_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PackageArtifact::resolve(&dir.path().join("missing.zip")).unwrap_err();
        assert!(err.to_string().contains("build your package"));
    }
}
