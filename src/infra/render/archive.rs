use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use super::process::{ToolError, ToolInvocation, ensure_parent, output_path};

const TOOL: &str = "zip";
const ARCHIVED_DIRS: [&str; 2] = ["html", "pdf"];

/// Bundles a job's `html/` and `pdf/` output trees with the zip CLI at maximum compression.
#[derive(Debug, Clone)]
pub struct ZipArchiver {
    program: PathBuf,
    timeout: Duration,
}

impl ZipArchiver {
    pub fn new(program: PathBuf, timeout: Duration) -> Self {
        Self { program, timeout }
    }

    /// Write `<job_output_dir>/zip/<basename>.zip`. Missing subtrees are left out.
    pub async fn bundle(&self, job_output_dir: &Path, basename: &str) -> Result<PathBuf, ToolError> {
        let output = output_path(&job_output_dir.join("zip"), basename, "zip");
        ensure_parent(TOOL, &output).await?;

        // zip would otherwise update an archive left from an earlier run.
        match tokio::fs::remove_file(&output).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(ToolError::Io { tool: TOOL, source: err }),
        }

        let mut invocation = ToolInvocation::new(TOOL, &self.program, self.timeout);
        invocation.arg("-r").arg("-9").arg("-q").arg(&output);

        let mut included = 0;
        for dir in ARCHIVED_DIRS {
            if tokio::fs::try_exists(job_output_dir.join(dir))
                .await
                .map_err(ToolError::io(TOOL))?
            {
                invocation.arg(dir);
                included += 1;
            }
        }

        if included == 0 {
            return Err(ToolError::Io {
                tool: TOOL,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("nothing to archive in {}", job_output_dir.display()),
                ),
            });
        }

        invocation.current_dir(job_output_dir);
        invocation.run().await?;

        Ok(output)
    }
}
