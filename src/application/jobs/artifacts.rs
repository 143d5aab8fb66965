//! Maps `(job, document index, kind)` to a file on disk.

use std::{io, path::PathBuf, sync::Arc};

use thiserror::Error;
use tokio::fs::File;

use crate::{
    domain::jobs::{ArtifactKind, JobId},
    infra::workspace::Workspace,
};

use super::registry::JobRegistry;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("job not found")]
    JobNotFound,
    #[error("file index {index} not found")]
    IndexNotFound { index: usize },
    #[error("unknown artifact kind `{kind}`")]
    UnknownKind { kind: String },
    #[error("no {kind} artifact for this file")]
    KindNotAvailable { kind: &'static str },
    #[error("artifact is missing on disk")]
    Missing(#[source] io::Error),
    #[error("failed to open artifact: {0}")]
    Open(#[source] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub path: PathBuf,
    /// `<basename>.<ext>`, suitable for a download file name.
    pub filename: String,
    pub kind: ArtifactKind,
}

pub struct ArtifactResolver {
    registry: Arc<JobRegistry>,
    workspace: Workspace,
}

impl ArtifactResolver {
    pub fn new(registry: Arc<JobRegistry>, workspace: Workspace) -> Self {
        Self {
            registry,
            workspace,
        }
    }

    /// Looks up the recorded path only; the file itself is not touched.
    pub fn resolve(
        &self,
        id: JobId,
        index: usize,
        kind: &str,
    ) -> Result<ResolvedArtifact, ResolveError> {
        let job = self
            .registry
            .get(id)
            .map_err(|_| ResolveError::JobNotFound)?;
        let set = job
            .files
            .get(index)
            .ok_or(ResolveError::IndexNotFound { index })?;
        let kind: ArtifactKind = kind.parse().map_err(|_| ResolveError::UnknownKind {
            kind: kind.to_string(),
        })?;
        let relative = set
            .path_for(kind)
            .ok_or(ResolveError::KindNotAvailable {
                kind: kind.as_str(),
            })?;
        let path = self
            .workspace
            .resolve_output(relative)
            .ok_or(ResolveError::KindNotAvailable {
                kind: kind.as_str(),
            })?;

        Ok(ResolvedArtifact {
            path,
            filename: format!("{}.{}", set.basename, kind.extension()),
            kind,
        })
    }

    /// Resolve and open the artifact for streaming.
    pub async fn open(
        &self,
        id: JobId,
        index: usize,
        kind: &str,
    ) -> Result<(ResolvedArtifact, File, u64), ResolveError> {
        let artifact = self.resolve(id, index, kind)?;
        let file = File::open(&artifact.path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                ResolveError::Missing(err)
            } else {
                ResolveError::Open(err)
            }
        })?;
        let length = file.metadata().await.map_err(ResolveError::Open)?.len();
        Ok((artifact, file, length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::jobs::notifier::testing::RecordingNotifier;
    use crate::domain::jobs::{ArtifactSet, Job};
    use crate::infra::workspace::workspace_in;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use uuid::Uuid;

    fn fixture() -> (TempDir, ArtifactResolver, JobId, Workspace) {
        let dir = TempDir::new().expect("temp dir");
        let registry = Arc::new(JobRegistry::new(Arc::new(RecordingNotifier::default())));
        let workspace = workspace_in(dir.path());

        let id = Uuid::new_v4();
        registry.create(Job::new(id)).expect("create");
        registry
            .update_and_notify(id, |job| {
                job.start()?;
                job.push_artifacts(ArtifactSet {
                    basename: "chapter1".into(),
                    html: None,
                    pdf: Some(format!("{id}/pdf/chapter1.pdf")),
                    zip: Some(format!("{id}/zip/chapter1.zip")),
                })
            })
            .expect("artifacts");

        let pdf = workspace.job_outputs(id).join("pdf/chapter1.pdf");
        std::fs::create_dir_all(pdf.parent().unwrap()).expect("pdf dir");
        std::fs::write(&pdf, b"%PDF-1.7").expect("pdf");

        let resolver = ArtifactResolver::new(registry, workspace.clone());
        (dir, resolver, id, workspace)
    }

    #[tokio::test]
    async fn opens_recorded_artifact() {
        let (_dir, resolver, id, workspace) = fixture();

        let (artifact, mut file, length) = resolver.open(id, 0, "pdf").await.expect("open");
        assert_eq!(artifact.filename, "chapter1.pdf");
        assert_eq!(artifact.kind, ArtifactKind::Pdf);
        assert_eq!(artifact.path, workspace.job_outputs(id).join("pdf/chapter1.pdf"));
        assert_eq!(length, 8);

        let mut body = Vec::new();
        file.read_to_end(&mut body).await.expect("read");
        assert_eq!(body, b"%PDF-1.7");
    }

    #[test]
    fn distinguishes_lookup_failures() {
        let (_dir, resolver, id, _) = fixture();

        assert!(matches!(
            resolver.resolve(Uuid::new_v4(), 0, "pdf"),
            Err(ResolveError::JobNotFound)
        ));
        assert!(matches!(
            resolver.resolve(id, 1, "pdf"),
            Err(ResolveError::IndexNotFound { index: 1 })
        ));
        assert!(matches!(
            resolver.resolve(id, 0, "docx"),
            Err(ResolveError::UnknownKind { .. })
        ));
        assert!(matches!(
            resolver.resolve(id, 0, "html"),
            Err(ResolveError::KindNotAvailable { kind: "html" })
        ));
    }

    #[tokio::test]
    async fn recorded_but_deleted_file_is_missing() {
        let (_dir, resolver, id, _) = fixture();
        let err = resolver.open(id, 0, "zip").await.expect_err("no zip on disk");
        assert!(matches!(err, ResolveError::Missing(_)));
    }
}
