use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use super::process::{ToolError, ToolInvocation, ensure_parent, output_path};

const TOOL: &str = "weasyprint";

/// HTML to paginated PDF through the weasyprint CLI, always with the print media profile.
#[derive(Debug, Clone)]
pub struct WeasyprintRenderer {
    program: PathBuf,
    pdf_variant: Option<String>,
    timeout: Duration,
}

impl WeasyprintRenderer {
    pub fn new(program: PathBuf, pdf_variant: Option<String>, timeout: Duration) -> Self {
        Self {
            program,
            pdf_variant,
            timeout,
        }
    }

    /// Render `html` into `<pdf_dir>/<basename>.pdf`. `stylesheets` are absolute paths.
    pub async fn render(
        &self,
        html: &Path,
        pdf_dir: &Path,
        basename: &str,
        stylesheets: &[PathBuf],
    ) -> Result<PathBuf, ToolError> {
        let output = output_path(pdf_dir, basename, "pdf");
        ensure_parent(TOOL, &output).await?;

        let mut invocation = ToolInvocation::new(TOOL, &self.program, self.timeout);
        invocation.arg(html).arg(&output);

        for stylesheet in stylesheets {
            invocation.arg("--stylesheet").arg(stylesheet);
        }

        if let Some(base) = html.parent() {
            invocation.arg("--base-url").arg(base);
        }

        if let Some(variant) = self.pdf_variant.as_deref() {
            invocation.arg("--pdf-variant").arg(variant);
        }

        invocation.arg("--media-type").arg("print");
        invocation.run().await?;

        Ok(output)
    }
}
