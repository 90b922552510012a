//! Filesystem storage for uploaded specifications and generated artifacts.
//!
//! Every job owns one directory under the configured root:
//! `{job_id}/spec.{json|yaml}`, `{job_id}/summary.json` and any rendered
//! `{job_id}/summary.{md|html|docx}` exports.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

use crate::domain::types::SpecFormat;

pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Error)]
pub enum JobStorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("uploaded file is empty")]
    EmptyPayload,
}

/// Result of storing an uploaded specification.
#[derive(Debug, Clone)]
pub struct StoredSpec {
    pub checksum: String,
    pub size_bytes: u64,
}

#[derive(Debug)]
pub struct JobStorage {
    root: PathBuf,
}

impl JobStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn spec_path(job_id: Uuid, format: SpecFormat) -> String {
        format!("{job_id}/spec.{}", format.extension())
    }

    pub fn artifact_path(job_id: Uuid, name: &str) -> String {
        format!("{job_id}/{name}")
    }

    pub async fn store_spec(
        &self,
        job_id: Uuid,
        format: SpecFormat,
        data: &[u8],
    ) -> Result<StoredSpec, JobStorageError> {
        if data.is_empty() {
            return Err(JobStorageError::EmptyPayload);
        }

        self.write(&Self::spec_path(job_id, format), data).await?;

        Ok(StoredSpec {
            checksum: hex::encode(Sha256::digest(data)),
            size_bytes: data.len() as u64,
        })
    }

    pub async fn read_spec(
        &self,
        job_id: Uuid,
        format: SpecFormat,
    ) -> Result<Bytes, JobStorageError> {
        let absolute = self.resolve(&Self::spec_path(job_id, format))?;
        Ok(Bytes::from(fs::read(absolute).await?))
    }

    pub async fn write_artifact(
        &self,
        job_id: Uuid,
        name: &str,
        data: &[u8],
    ) -> Result<(), JobStorageError> {
        self.write(&Self::artifact_path(job_id, name), data).await
    }

    /// Read a previously written artifact. Missing files yield `None`.
    pub async fn read_artifact(
        &self,
        job_id: Uuid,
        name: &str,
    ) -> Result<Option<Bytes>, JobStorageError> {
        let absolute = self.resolve(&Self::artifact_path(job_id, name))?;
        match fs::read(&absolute).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(JobStorageError::Io(err)),
        }
    }

    /// Remove everything stored for the job. Missing directories are treated as success.
    pub async fn remove_job(&self, job_id: Uuid) -> Result<(), JobStorageError> {
        let absolute = self.resolve(&job_id.to_string())?;
        match fs::remove_dir_all(&absolute).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(JobStorageError::Io(err)),
        }
    }

    async fn write(&self, stored_path: &str, data: &[u8]) -> Result<(), JobStorageError> {
        let absolute = self.resolve(stored_path)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a sibling temp file first so readers never observe a partial artifact.
        let staging = absolute.with_extension("partial");
        let mut file = fs::File::create(&staging).await?;
        file.write_all(data).await?;
        file.flush().await?;
        drop(file);
        fs::rename(&staging, &absolute).await?;
        Ok(())
    }

    fn resolve(&self, stored_path: &str) -> Result<PathBuf, JobStorageError> {
        let relative = Path::new(stored_path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(JobStorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}
