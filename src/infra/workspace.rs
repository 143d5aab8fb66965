//! The three on-disk roots shared by every job: raw uploads, job trees and outputs.

use std::{
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
};

use tokio::fs;
use tracing::{error, info, warn};

use crate::{config::WorkspaceSettings, domain::jobs::JobId};

#[derive(Debug, Clone)]
pub struct Workspace {
    uploads: PathBuf,
    jobs: PathBuf,
    outputs: PathBuf,
}

impl Workspace {
    /// Resolve the configured roots to absolute paths; nothing is touched on disk.
    pub fn new(settings: &WorkspaceSettings) -> io::Result<Self> {
        Ok(Self {
            uploads: std::path::absolute(&settings.uploads_dir)?,
            jobs: std::path::absolute(&settings.jobs_dir)?,
            outputs: std::path::absolute(&settings.outputs_dir)?,
        })
    }

    /// Delete and recreate all three roots.
    ///
    /// Removal failures are logged and tolerated. Creation failures are logged
    /// too; later stages recreate what they need and fail loudly if they cannot.
    pub async fn reset(&self) {
        for root in self.roots() {
            match fs::remove_dir_all(root).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!(
                    target = "mdpress::workspace",
                    path = %root.display(),
                    error = %err,
                    "Failed to remove workspace directory"
                ),
            }
        }

        for root in self.roots() {
            if let Err(err) = fs::create_dir_all(root).await {
                error!(
                    target = "mdpress::workspace",
                    path = %root.display(),
                    error = %err,
                    "Failed to create workspace directory"
                );
            }
        }

        info!(
            target = "mdpress::workspace",
            uploads = %self.uploads.display(),
            jobs = %self.jobs.display(),
            outputs = %self.outputs.display(),
            "Workspace reset"
        );
    }

    pub fn uploads_root(&self) -> &Path {
        &self.uploads
    }

    pub fn job_tree(&self, id: JobId) -> PathBuf {
        self.jobs.join(id.to_string())
    }

    pub fn job_outputs(&self, id: JobId) -> PathBuf {
        self.outputs.join(id.to_string())
    }

    /// Resolve a path stored relative to the outputs root. Escaping paths are refused.
    pub fn resolve_output(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative);
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            return None;
        }
        Some(self.outputs.join(relative))
    }

    /// Express an artifact path relative to the outputs root with `/` separators.
    pub fn relative_to_outputs(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.outputs).ok()?;
        let segments: Vec<&str> = relative
            .components()
            .map(|component| component.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(segments.join("/"))
    }

    /// Best-effort removal of a job's tree and outputs.
    pub async fn remove_job(&self, id: JobId) {
        for dir in [self.job_tree(id), self.job_outputs(id)] {
            match fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!(
                    target = "mdpress::workspace",
                    job_id = %id,
                    path = %dir.display(),
                    error = %err,
                    "Failed to remove job files"
                ),
            }
        }
    }

    fn roots(&self) -> [&PathBuf; 3] {
        [&self.uploads, &self.jobs, &self.outputs]
    }
}

#[cfg(test)]
pub(crate) fn workspace_in(root: &Path) -> Workspace {
    Workspace::new(&WorkspaceSettings {
        uploads_dir: root.join("uploads"),
        jobs_dir: root.join("jobs"),
        outputs_dir: root.join("output"),
    })
    .expect("absolute workspace")
}
