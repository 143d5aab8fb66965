//! External renderer adapters: pandoc, weasyprint and zip.

mod archive;
mod pandoc;
mod process;
mod stylesheets;
mod weasyprint;

use std::path::{Path, PathBuf};

pub use archive::ZipArchiver;
pub use pandoc::PandocRenderer;
pub use process::ToolError;
pub use weasyprint::WeasyprintRenderer;

pub(crate) use process::METRIC_STAGE_MS;

use crate::config::RenderSettings;

/// The three conversion stages plus the stylesheet bundle they share.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub html: PandocRenderer,
    pub pdf: WeasyprintRenderer,
    pub archive: ZipArchiver,
    stylesheet_dir: PathBuf,
}

impl Toolchain {
    pub fn new(
        html: PandocRenderer,
        pdf: WeasyprintRenderer,
        archive: ZipArchiver,
        stylesheet_dir: PathBuf,
    ) -> Self {
        Self {
            html,
            pdf,
            archive,
            stylesheet_dir,
        }
    }

    pub fn from_settings(settings: &RenderSettings) -> Self {
        let timeout = settings.stage_timeout;
        Self::new(
            PandocRenderer::new(
                settings.pandoc_path.clone(),
                settings.template_path.clone(),
                settings.self_contained,
                timeout,
            )
            .with_page_fragments(
                settings.before_template_path.clone(),
                settings.after_template_path.clone(),
            ),
            WeasyprintRenderer::new(
                settings.weasyprint_path.clone(),
                settings.pdf_variant.clone(),
                timeout,
            ),
            ZipArchiver::new(settings.zip_path.clone(), timeout),
            settings.stylesheet_dir.clone(),
        )
    }

    /// Copy the stylesheet bundle into `html_dir`; returns names relative to it.
    pub async fn install_stylesheets(&self, html_dir: &Path) -> Result<Vec<String>, ToolError> {
        stylesheets::install(&self.stylesheet_dir, html_dir)
            .await
            .map_err(ToolError::io("stylesheets"))
    }
}
