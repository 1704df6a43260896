//! Storage of uploaded photos and videos

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::errors::SightingError;
use crate::models::MediaRef;

const MAX_NAME_ATTEMPTS: u32 = 100;

/// Writes uploads under a single directory with collision-resistant names
#[derive(Debug, Clone)]
pub struct MediaStore {
    upload_dir: PathBuf,
}

impl MediaStore {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Write `bytes` to a new file derived from `original_name`
    ///
    /// The stored name is the sanitized original name prefixed with the
    /// current UTC time. An existing file is never overwritten.
    pub async fn store(&self, bytes: &[u8], original_name: &str) -> Result<MediaRef, SightingError> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;

        let prefix = Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string();
        let path = self
            .write_new(&prefix, &sanitize_filename(original_name), bytes)
            .await?;
        debug!("Stored {} bytes at {}", bytes.len(), path.display());

        Ok(MediaRef {
            original_name: original_name.to_string(),
            path,
        })
    }

    /// Create `{prefix}_{name}`, adding a counter to the prefix while the
    /// name is taken
    async fn write_new(&self, prefix: &str, name: &str, bytes: &[u8]) -> Result<PathBuf, SightingError> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let stored_name = if attempt == 0 {
                format!("{}_{}", prefix, name)
            } else {
                format!("{}-{}_{}", prefix, attempt, name)
            };
            let path = self.upload_dir.join(stored_name);

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };
            let written = match file.write_all(bytes).await {
                Ok(()) => file.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e.into());
            }
            return Ok(path);
        }

        Err(SightingError::IoError(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free file name for '{}' after {} attempts", name, MAX_NAME_ATTEMPTS),
        )))
    }

    /// Delete a stored file, logging instead of failing
    pub async fn remove(&self, media: &MediaRef) {
        if let Err(e) = tokio::fs::remove_file(&media.path).await {
            warn!("Could not remove media {}: {}", media.path.display(), e);
        }
    }
}

/// Replace every character outside `[A-Za-z0-9_.-]` with `_`
///
/// Leading dots are replaced too, so the result can never name a hidden file
/// or a parent directory. Empty names become `upload`.
pub fn sanitize_filename(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let leading_dots = sanitized.chars().take_while(|&c| c == '.').count();
    sanitized.replace_range(..leading_dots, &"_".repeat(leading_dots));

    if sanitized.is_empty() {
        "upload".to_string()
    } else {
        sanitized
    }
}
