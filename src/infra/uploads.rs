//! Transient storage for upload parts before they are laid out into a job tree.

use std::error::Error as StdError;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut, stream};
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

/// Errors that can occur while staging an upload part.
#[derive(Debug, Error)]
pub enum UploadStorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("uploaded file exceeds the {limit} byte limit")]
    FileTooLarge { limit: u64 },
    #[error("uploaded file stream failed")]
    PayloadStream {
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl UploadStorageError {
    pub fn stream(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::PayloadStream {
            source: Box::new(source),
        }
    }
}

/// An upload part written to the raw uploads directory.
#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Filesystem-backed staging area for upload parts.
#[derive(Debug, Clone)]
pub struct UploadStorage {
    root: PathBuf,
}

impl UploadStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Stream a part to disk under a fresh identifier, refusing anything above `limit` bytes.
    ///
    /// A partially written file is removed when the stream fails or overflows.
    pub async fn store_stream<S>(
        &self,
        stream: S,
        limit: u64,
    ) -> Result<StagedUpload, UploadStorageError>
    where
        S: Stream<Item = Result<Bytes, UploadStorageError>>,
    {
        fs::create_dir_all(&self.root).await?;
        let path = self.root.join(Uuid::new_v4().to_string());
        let mut file = fs::File::create(&path).await?;
        let mut total_bytes: u64 = 0;

        pin_mut!(stream);
        while let Some(chunk_result) = stream.next().await {
            let chunk = match chunk_result {
                Ok(chunk) => chunk,
                Err(err) => {
                    drop(file);
                    let _ = fs::remove_file(&path).await;
                    return Err(err);
                }
            };

            total_bytes = total_bytes.saturating_add(chunk.len() as u64);
            if total_bytes > limit {
                drop(file);
                let _ = fs::remove_file(&path).await;
                return Err(UploadStorageError::FileTooLarge { limit });
            }
            file.write_all(&chunk).await?;
        }

        file.flush().await?;

        Ok(StagedUpload {
            path,
            size_bytes: total_bytes,
        })
    }

    /// Stage a fully-buffered payload.
    pub async fn store(&self, data: Bytes, limit: u64) -> Result<StagedUpload, UploadStorageError> {
        let stream = stream::once(async move { Ok::<_, UploadStorageError>(data) });
        self.store_stream(stream, limit).await
    }

    /// Remove a staged part. Missing files are treated as success.
    pub async fn delete(&self, path: &Path) -> Result<(), UploadStorageError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(UploadStorageError::Io(err)),
        }
    }
}
