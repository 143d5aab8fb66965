//! Sequential markdown → HTML → PDF → zip conversion for one job.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::{
    domain::{
        error::DomainError,
        jobs::{ArtifactSet, Job, JobId},
        paths::{document_basename, is_markdown},
    },
    infra::{
        render::{ToolError, Toolchain},
        telemetry::{METRIC_JOBS_FAILED, METRIC_JOBS_PROCESSED},
        workspace::Workspace,
    },
};

use super::registry::JobRegistry;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("no markdown documents found in the uploaded files")]
    NoDocuments,
    #[error("failed to scan job files: {0}")]
    Discovery(#[from] walkdir::Error),
    #[error("document scan aborted: {0}")]
    DiscoveryTask(#[from] tokio::task::JoinError),
    #[error("artifact `{}` is outside the outputs directory", .0.display())]
    ArtifactPath(PathBuf),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("job was deleted during conversion")]
    Cancelled,
}

impl PipelineError {
    fn is_cancellation(&self) -> bool {
        matches!(
            self,
            PipelineError::Cancelled | PipelineError::Domain(DomainError::NotFound { .. })
        )
    }
}

/// Runs every document of a job through the toolchain, one document at a time.
pub struct ConversionPipeline {
    registry: Arc<JobRegistry>,
    workspace: Workspace,
    tools: Toolchain,
}

impl ConversionPipeline {
    pub fn new(registry: Arc<JobRegistry>, workspace: Workspace, tools: Toolchain) -> Self {
        Self {
            registry,
            workspace,
            tools,
        }
    }

    /// Drive job `id` from `uploaded` to a terminal state.
    ///
    /// `declared` lists job-root-relative documents accepted by their media
    /// type; they are converted alongside every `*.md` file in the tree.
    /// Failures are recorded on the job rather than returned. A job deleted
    /// while converting is left alone and its partial outputs are removed.
    pub async fn run(&self, id: JobId, declared: Vec<PathBuf>) {
        let started_at = Instant::now();

        if let Err(err) = self.registry.update_and_notify(id, Job::start) {
            warn!(
                target = "mdpress::pipeline",
                job_id = %id,
                error = %err,
                "Job could not enter processing"
            );
            return;
        }

        let outcome = match self.convert(id, declared).await {
            Ok(()) => self
                .registry
                .update_and_notify(id, Job::complete)
                .map(|_| ())
                .map_err(PipelineError::from),
            Err(err) => Err(err),
        };

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => {
                counter!(METRIC_JOBS_PROCESSED).increment(1);
                info!(
                    target = "mdpress::pipeline",
                    job_id = %id,
                    elapsed_ms,
                    "Job processed"
                );
            }
            Err(err) if err.is_cancellation() => {
                info!(
                    target = "mdpress::pipeline",
                    job_id = %id,
                    elapsed_ms,
                    "Job deleted during conversion; discarding outputs"
                );
                self.workspace.remove_job(id).await;
            }
            Err(err) => {
                counter!(METRIC_JOBS_FAILED).increment(1);
                let message = err.to_string();
                warn!(
                    target = "mdpress::pipeline",
                    job_id = %id,
                    elapsed_ms,
                    error = %message,
                    "Job failed"
                );
                if let Err(record_err) = self.registry.update_and_notify(id, |job| job.fail(message))
                {
                    warn!(
                        target = "mdpress::pipeline",
                        job_id = %id,
                        error = %record_err,
                        "Failed to record job failure"
                    );
                }
            }
        }
    }

    async fn convert(&self, id: JobId, declared: Vec<PathBuf>) -> Result<(), PipelineError> {
        let tree = self.workspace.job_tree(id);
        let documents =
            tokio::task::spawn_blocking(move || discover_documents(&tree, &declared)).await??;
        if documents.is_empty() {
            return Err(PipelineError::NoDocuments);
        }
        let basenames: Vec<String> = documents.iter().map(|path| document_basename(path)).collect();
        let stems = output_stems(&basenames);

        let output_dir = self.workspace.job_outputs(id);
        let html_dir = output_dir.join("html");
        let pdf_dir = output_dir.join("pdf");

        self.ensure_active(id)?;
        let stylesheets = self.tools.install_stylesheets(&html_dir).await?;
        let pdf_stylesheets: Vec<PathBuf> = stylesheets
            .iter()
            .map(|relative| html_dir.join(relative))
            .collect();

        let total = documents.len() as f64;
        for (index, ((source, basename), stem)) in
            documents.iter().zip(basenames).zip(stems).enumerate()
        {
            info!(
                target = "mdpress::pipeline",
                job_id = %id,
                document = %source.display(),
                index,
                "Converting document"
            );

            self.ensure_active(id)?;
            let html = self
                .tools
                .html
                .render(source, &html_dir, &stem, &stylesheets)
                .await?;
            let halfway = (index as f64 + 0.5) / total;
            self.registry
                .update_and_notify(id, |job| job.advance(halfway))?;

            self.ensure_active(id)?;
            let pdf = self
                .tools
                .pdf
                .render(&html, &pdf_dir, &stem, &pdf_stylesheets)
                .await?;

            self.ensure_active(id)?;
            let zip = self.tools.archive.bundle(&output_dir, &stem).await?;

            let artifacts = ArtifactSet {
                basename,
                html: if self.tools.html.self_contained() {
                    Some(self.relative(&html)?)
                } else {
                    None
                },
                pdf: Some(self.relative(&pdf)?),
                zip: Some(self.relative(&zip)?),
            };
            let done = (index as f64 + 1.0) / total;
            self.registry.update_and_notify(id, |job| {
                job.push_artifacts(artifacts)?;
                job.advance(done)
            })?;
        }

        Ok(())
    }

    fn ensure_active(&self, id: JobId) -> Result<(), PipelineError> {
        if self.registry.contains(id) {
            Ok(())
        } else {
            Err(PipelineError::Cancelled)
        }
    }

    fn relative(&self, path: &Path) -> Result<String, PipelineError> {
        self.workspace
            .relative_to_outputs(path)
            .ok_or_else(|| PipelineError::ArtifactPath(path.to_path_buf()))
    }
}

/// Documents under `root`, ordered by a depth-first walk sorted by file name.
///
/// A file is a document when it has the `.md` extension or its path relative
/// to `root` is one of `declared`.
pub fn discover_documents(root: &Path, declared: &[PathBuf]) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut documents = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let by_name = entry
            .file_name()
            .to_str()
            .is_some_and(|name| is_markdown(name, None));
        let by_upload = entry
            .path()
            .strip_prefix(root)
            .is_ok_and(|relative| declared.iter().any(|path| path == relative));
        if by_name || by_upload {
            documents.push(entry.into_path());
        }
    }
    Ok(documents)
}

/// Output file stems, one per basename. A basename seen before (ignoring
/// case) gets the first free `-2`, `-3`, ... suffix.
fn output_stems(basenames: &[String]) -> Vec<String> {
    let mut taken = HashSet::new();
    basenames
        .iter()
        .map(|basename| {
            let mut stem = basename.clone();
            let mut suffix = 1;
            while !taken.insert(stem.to_lowercase()) {
                suffix += 1;
                stem = format!("{basename}-{suffix}");
            }
            stem
        })
        .collect()
}
