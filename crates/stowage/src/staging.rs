//! Local staging of uploaded content.
//!
//! Uploads are written under a unique temporary name, then renamed to their
//! content address once hot storage has assigned one. The staged file is
//! removed when the job's watcher finishes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::StagingError;

const INCOMING_PREFIX: &str = ".incoming-";

async fn move_file(src: &Path, dst: &Path) -> Result<(), StagingError> {
    if tokio::fs::rename(src, dst).await.is_ok() {
        return Ok(());
    }

    tokio::fs::copy(src, dst)
        .await
        .map_err(|e| StagingError::MoveFile {
            from: src.to_path_buf(),
            to: dst.to_path_buf(),
            source: e,
        })?;
    tokio::fs::remove_file(src)
        .await
        .map_err(|e| StagingError::MoveFile {
            from: src.to_path_buf(),
            to: dst.to_path_buf(),
            source: e,
        })?;
    Ok(())
}

fn is_valid_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Debug, Clone)]
pub struct FileStaging {
    directory: PathBuf,
}

impl FileStaging {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Where content with the given address is staged.
    pub fn path_for(&self, content_address: &str) -> Result<PathBuf, StagingError> {
        if !is_valid_file_name(content_address) {
            return Err(StagingError::InvalidContentAddress(
                content_address.to_string(),
            ));
        }
        Ok(self.directory.join(content_address))
    }

    /// Writes content under a fresh temporary name and returns its path.
    pub async fn stage(&self, content: &[u8]) -> Result<PathBuf, StagingError> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| StagingError::CreateDirectory {
                path: self.directory.clone(),
                source: e,
            })?;

        let path = self
            .directory
            .join(format!("{}{}", INCOMING_PREFIX, uuid::Uuid::new_v4()));
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| StagingError::WriteFile {
                path: path.clone(),
                source: e,
            })?;
        Ok(path)
    }

    /// Renames a staged file to its content address.
    pub async fn promote(
        &self,
        staged: &Path,
        content_address: &str,
    ) -> Result<PathBuf, StagingError> {
        let target = self.path_for(content_address)?;
        move_file(staged, &target).await?;
        Ok(target)
    }

    /// Deletes a staged file. Returns `false` if it was already gone.
    pub async fn remove(&self, path: &Path) -> Result<bool, StagingError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StagingError::RemoveFile {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}
