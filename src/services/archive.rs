//! Archival sink for raw fetched bytes.
//!
//! Archiving is fire-and-forget: callers go through [`archive_quietly`],
//! which logs failures and never returns them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::ServiceError;

/// What kind of bytes are being archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    LandingPage,
    Pdf,
}

impl ArchiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LandingPage => "landing-page",
            Self::Pdf => "pdf",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Self::LandingPage => "html",
            Self::Pdf => "pdf",
        }
    }
}

/// Durable storage for fetched bytes, keyed by the work or target they belong to.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    async fn archive(
        &self,
        key: &str,
        kind: ArchiveKind,
        bytes: &[u8],
    ) -> Result<(), ServiceError>;
}

/// Archive `bytes`, logging instead of failing.
pub async fn archive_quietly(sink: &dyn ArchiveSink, key: &str, kind: ArchiveKind, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    if let Err(e) = sink.archive(key, kind, bytes).await {
        tracing::warn!("Failed to archive {} for {}: {}", kind.as_str(), key, e);
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullArchiveSink;

#[async_trait]
impl ArchiveSink for NullArchiveSink {
    async fn archive(&self, _key: &str, _kind: ArchiveKind, _bytes: &[u8]) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Writes each payload to `<root>/<kind>/<sha256(key)>.<ext>`.
#[derive(Debug, Clone)]
pub struct FsArchiveSink {
    root: PathBuf,
}

impl FsArchiveSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str, kind: ArchiveKind) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.root
            .join(kind.as_str())
            .join(format!("{}.{}", digest, kind.extension()))
    }
}

#[async_trait]
impl ArchiveSink for FsArchiveSink {
    async fn archive(&self, key: &str, kind: ArchiveKind, bytes: &[u8]) -> Result<(), ServiceError> {
        let path = self.path_for(key, kind);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ServiceError::Archive(format!("{}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ServiceError::Archive(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Archived {} for {} to {}", kind.as_str(), key, path.display());
        Ok(())
    }
}
