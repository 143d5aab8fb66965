//! Entry point the transports talk to: accept batches, query, delete, download.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    domain::{
        error::DomainError,
        jobs::{Job, JobId},
    },
    infra::{
        render::Toolchain, telemetry::METRIC_JOBS_ACCEPTED, uploads::UploadStorage,
        workspace::Workspace,
    },
};

use super::{
    artifacts::{ArtifactResolver, ResolveError, ResolvedArtifact},
    intake::{BatchMode, BatchPlan, IntakeError, UploadedFile},
    notifier::BroadcastNotifier,
    pipeline::ConversionPipeline,
    registry::JobRegistry,
};

pub struct JobService {
    registry: Arc<JobRegistry>,
    notifier: Arc<BroadcastNotifier>,
    workspace: Workspace,
    uploads: UploadStorage,
    pipeline: Arc<ConversionPipeline>,
    resolver: ArtifactResolver,
}

impl JobService {
    pub fn new(workspace: Workspace, tools: Toolchain, notifier: Arc<BroadcastNotifier>) -> Self {
        let registry = Arc::new(JobRegistry::new(notifier.clone()));
        let pipeline = Arc::new(ConversionPipeline::new(
            registry.clone(),
            workspace.clone(),
            tools,
        ));
        let resolver = ArtifactResolver::new(registry.clone(), workspace.clone());
        let uploads = UploadStorage::new(workspace.uploads_root().to_path_buf());

        Self {
            registry,
            notifier,
            workspace,
            uploads,
            pipeline,
            resolver,
        }
    }

    /// Staging area for upload parts.
    pub fn uploads(&self) -> &UploadStorage {
        &self.uploads
    }

    /// Accept a batch under `id` and start converting it in the background.
    ///
    /// Returns as soon as the job record exists; the conversion outcome is
    /// only visible through the registry and the event feed.
    pub async fn accept(
        &self,
        id: JobId,
        mode: BatchMode,
        files: Vec<UploadedFile>,
    ) -> Result<JobId, IntakeError> {
        let plan = self.admit(id, mode, &files).await?;

        let pipeline = self.pipeline.clone();
        let documents = plan.document_paths();
        tokio::spawn(async move { pipeline.run(id, documents).await });
        Ok(id)
    }

    /// Accept a batch and convert it on the current task, returning the final record.
    pub async fn convert(
        &self,
        id: JobId,
        mode: BatchMode,
        files: Vec<UploadedFile>,
    ) -> Result<Job, IntakeError> {
        let plan = self.admit(id, mode, &files).await?;
        self.pipeline.run(id, plan.document_paths()).await;
        Ok(self.registry.get(id)?)
    }

    async fn admit(
        &self,
        id: JobId,
        mode: BatchMode,
        files: &[UploadedFile],
    ) -> Result<BatchPlan, IntakeError> {
        let admitted = self.lay_out(id, mode, files).await;
        self.discard_staged(files).await;

        match admitted {
            Ok(plan) => {
                self.registry.create(Job::new(id))?;
                counter!(METRIC_JOBS_ACCEPTED).increment(1);
                info!(
                    target = "mdpress::jobs",
                    job_id = %id,
                    documents = plan.document_count(),
                    files = plan.file_count(),
                    "Upload batch accepted"
                );
                Ok(plan)
            }
            Err(err) => {
                warn!(
                    target = "mdpress::jobs",
                    job_id = %id,
                    error = %err,
                    "Upload batch rejected"
                );
                Err(err)
            }
        }
    }

    async fn lay_out(
        &self,
        id: JobId,
        mode: BatchMode,
        files: &[UploadedFile],
    ) -> Result<BatchPlan, IntakeError> {
        if self.registry.contains(id) {
            return Err(DomainError::validation(format!("job `{id}` already exists")).into());
        }

        let plan = BatchPlan::new(mode, files)?;
        if let Err(err) = plan.reconstruct(&self.workspace.job_tree(id)).await {
            self.workspace.remove_job(id).await;
            return Err(err);
        }
        Ok(plan)
    }

    async fn discard_staged(&self, files: &[UploadedFile]) {
        for file in files {
            if let Err(err) = self.uploads.delete(&file.staged_path).await {
                warn!(
                    target = "mdpress::jobs",
                    path = %file.staged_path.display(),
                    error = %err,
                    "Failed to remove staged upload"
                );
            }
        }
    }

    pub fn list(&self) -> Vec<Job> {
        self.registry.list()
    }

    pub fn get(&self, id: JobId) -> Result<Job, DomainError> {
        self.registry.get(id)
    }

    /// Remove the record and, best-effort, its files. `false` when the job did not exist.
    pub async fn delete(&self, id: JobId) -> bool {
        if !self.registry.remove(id) {
            return false;
        }
        self.workspace.remove_job(id).await;
        info!(target = "mdpress::jobs", job_id = %id, "Job deleted");
        true
    }

    pub fn resolve_artifact(
        &self,
        id: JobId,
        index: usize,
        kind: &str,
    ) -> Result<ResolvedArtifact, ResolveError> {
        self.resolver.resolve(id, index, kind)
    }

    pub async fn open_artifact(
        &self,
        id: JobId,
        index: usize,
        kind: &str,
    ) -> Result<(ResolvedArtifact, tokio::fs::File, u64), ResolveError> {
        self.resolver.open(id, index, kind).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Job> {
        self.notifier.subscribe()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::application::jobs::testing::{PANDOC_OK, toolchain};
    use crate::domain::jobs::JobStatus;
    use crate::infra::workspace::workspace_in;
    use std::path::Path;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn service(dir: &Path) -> JobService {
        let workspace = workspace_in(dir);
        JobService::new(
            workspace,
            toolchain(dir, PANDOC_OK, false),
            Arc::new(BroadcastNotifier::new(64)),
        )
    }

    async fn stage(service: &JobService, client_path: &str, body: &str) -> UploadedFile {
        stage_typed(service, client_path, None, body).await
    }

    async fn stage_typed(
        service: &JobService,
        client_path: &str,
        content_type: Option<&str>,
        body: &str,
    ) -> UploadedFile {
        let staged = service
            .uploads()
            .store(bytes::Bytes::from(body.to_string()), 1024)
            .await
            .expect("stage");
        UploadedFile {
            client_path: client_path.to_string(),
            content_type: content_type.map(str::to_string),
            staged_path: staged.path,
        }
    }

    #[tokio::test]
    async fn accepted_batch_converts_in_background() {
        let dir = TempDir::new().expect("temp dir");
        let service = service(dir.path());
        let mut events = service.subscribe();

        let files = vec![
            stage(&service, "book/chapter1.md", "# One").await,
            stage(&service, "book/images/fig1.png", "png").await,
        ];
        let staged: Vec<_> = files.iter().map(|file| file.staged_path.clone()).collect();
        let id = Uuid::new_v4();

        let returned = service
            .accept(id, BatchMode::Folder, files)
            .await
            .expect("accept");
        assert_eq!(returned, id);
        assert!(staged.iter().all(|path| !path.exists()));

        let first = events.recv().await.expect("created event");
        assert_eq!(first.id, id);
        assert_eq!(first.status, JobStatus::Uploaded);

        let last = loop {
            let job = events.recv().await.expect("event");
            if job.status.is_terminal() {
                break job;
            }
        };
        assert_eq!(last.status, JobStatus::Processed);
        assert_eq!(last.files.len(), 1);
        assert_eq!(service.get(id).expect("job").status, JobStatus::Processed);

        let (artifact, _file, _) = service.open_artifact(id, 0, "zip").await.expect("zip");
        assert_eq!(artifact.filename, "chapter1.zip");
    }

    #[tokio::test]
    async fn rejected_batch_creates_no_job() {
        let dir = TempDir::new().expect("temp dir");
        let service = service(dir.path());

        let files = vec![
            stage(&service, "book/a.md", "a").await,
            stage(&service, "book/b.md", "b").await,
        ];
        let staged: Vec<_> = files.iter().map(|file| file.staged_path.clone()).collect();
        let id = Uuid::new_v4();

        let err = service
            .accept(id, BatchMode::Folder, files)
            .await
            .expect_err("two documents");
        assert!(matches!(err, IntakeError::MultipleDocuments { count: 2 }));
        assert!(service.list().is_empty());
        assert!(staged.iter().all(|path| !path.exists()));
        assert!(!service.workspace.job_tree(id).exists());
    }

    #[tokio::test]
    async fn convert_returns_terminal_record() {
        let dir = TempDir::new().expect("temp dir");
        let service = service(dir.path());

        let files = vec![
            stage(&service, "book/a.md", "a").await,
            stage(&service, "book/b.md", "b").await,
        ];
        let job = service
            .convert(Uuid::new_v4(), BatchMode::Multiple, files)
            .await
            .expect("convert");

        assert_eq!(job.status, JobStatus::Processed);
        assert_eq!(job.files.len(), 2);
        assert_eq!(job.progress, Some(1.0));
    }

    #[tokio::test]
    async fn markdown_declared_by_type_is_converted() {
        let dir = TempDir::new().expect("temp dir");
        let service = service(dir.path());

        let files = vec![
            stage_typed(&service, "book/notes.markdown", Some("text/markdown"), "# Notes").await,
            stage(&service, "book/images/fig1.png", "png").await,
        ];
        let id = Uuid::new_v4();
        let job = service
            .convert(id, BatchMode::Folder, files)
            .await
            .expect("convert");

        assert_eq!(job.status, JobStatus::Processed, "{:?}", job.error);
        assert_eq!(job.files.len(), 1);
        let (artifact, _file, _) = service.open_artifact(id, 0, "pdf").await.expect("pdf");
        assert_eq!(artifact.filename, "notes.pdf");
    }

    #[tokio::test]
    async fn delete_removes_record_and_files() {
        let dir = TempDir::new().expect("temp dir");
        let service = service(dir.path());

        let files = vec![stage(&service, "a.md", "a").await];
        let id = Uuid::new_v4();
        service
            .convert(id, BatchMode::Folder, files)
            .await
            .expect("convert");
        assert!(service.workspace.job_outputs(id).exists());

        assert!(!service.delete(Uuid::new_v4()).await);
        assert_eq!(service.list().len(), 1);

        assert!(service.delete(id).await);
        assert!(service.list().is_empty());
        assert!(!service.workspace.job_tree(id).exists());
        assert!(!service.workspace.job_outputs(id).exists());
        assert!(matches!(
            service.resolve_artifact(id, 0, "pdf"),
            Err(ResolveError::JobNotFound)
        ));
    }
}
