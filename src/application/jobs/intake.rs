//! Batch reconstruction: validate an upload batch and lay it out as a job tree.

use std::{
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tokio::fs;

use crate::domain::{
    error::DomainError,
    paths::{is_markdown, normalize_relative_path},
};

/// How many markdown documents a batch may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// A selected folder: exactly one document plus its media.
    Folder,
    /// Any number of documents (at least one) plus media.
    Multiple,
}

/// One upload part: where the client says it lives and where it was staged.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub client_path: String,
    pub content_type: Option<String>,
    pub staged_path: PathBuf,
}

impl UploadedFile {
    pub fn is_document(&self) -> bool {
        is_markdown(&self.client_path, self.content_type.as_deref())
    }
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("no files uploaded")]
    Empty,
    #[error("at least one markdown file is required")]
    NoDocument,
    #[error("only one markdown file is allowed in a folder upload, found {count}")]
    MultipleDocuments { count: usize },
    #[error("file path `{path}` does not name a file")]
    InvalidPath { path: String },
    #[error("too many files, at most {limit} per upload")]
    TooManyFiles { limit: u32 },
    #[error("file type of `{path}` is not accepted")]
    UnsupportedFile { path: String },
    #[error("`{path}` exceeds the {limit} byte file size limit")]
    FileTooLarge { path: String, limit: u64 },
    #[error(transparent)]
    Registry(#[from] DomainError),
    #[error("failed to lay out upload batch: {0}")]
    Io(#[from] io::Error),
}

impl IntakeError {
    /// Whether the caller sent a bad batch, as opposed to the server failing to store it.
    pub fn is_validation(&self) -> bool {
        !matches!(self, IntakeError::Io(_) | IntakeError::Registry(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PlannedCopy {
    source: PathBuf,
    destination: PathBuf,
}

/// A validated batch: every file has a job-root-relative destination.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    documents: Vec<PlannedCopy>,
    media: Vec<PlannedCopy>,
}

impl BatchPlan {
    /// Classify and validate `files` for `mode`. Nothing touches the disk.
    pub fn new(mode: BatchMode, files: &[UploadedFile]) -> Result<Self, IntakeError> {
        if files.is_empty() {
            return Err(IntakeError::Empty);
        }

        let mut documents = Vec::new();
        let mut media = Vec::new();
        for file in files {
            let destination = normalize_relative_path(&file.client_path).ok_or_else(|| {
                IntakeError::InvalidPath {
                    path: file.client_path.clone(),
                }
            })?;
            let copy = PlannedCopy {
                source: file.staged_path.clone(),
                destination,
            };
            if file.is_document() {
                documents.push(copy);
            } else {
                media.push(copy);
            }
        }

        match (mode, documents.len()) {
            (_, 0) => Err(IntakeError::NoDocument),
            (BatchMode::Folder, count) if count > 1 => {
                Err(IntakeError::MultipleDocuments { count })
            }
            _ => Ok(Self { documents, media }),
        }
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn file_count(&self) -> usize {
        self.documents.len() + self.media.len()
    }

    /// Job-root-relative destinations of the documents.
    pub fn document_paths(&self) -> Vec<PathBuf> {
        self.documents
            .iter()
            .map(|copy| copy.destination.clone())
            .collect()
    }

    /// Copy every staged file into `job_root`, documents first.
    ///
    /// Copying onto an existing destination overwrites it, so replaying the
    /// same plan yields the same tree. A failure part way leaves the files
    /// already copied in place.
    pub async fn reconstruct(&self, job_root: &Path) -> Result<(), IntakeError> {
        fs::create_dir_all(job_root).await?;
        for copy in self.documents.iter().chain(self.media.iter()) {
            let destination = job_root.join(&copy.destination);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::copy(&copy.source, &destination).await?;
        }
        Ok(())
    }
}
