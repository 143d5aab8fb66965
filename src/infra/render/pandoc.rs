use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::fs;

use super::process::{ToolError, ToolInvocation, ensure_parent, output_path};

const TOOL: &str = "pandoc";
const LOCALE: &str = "en_US.UTF-8";
const WRAPPED_DIR: &str = "wrapped";

/// Markdown to standalone HTML5 through the pandoc CLI.
#[derive(Debug, Clone)]
pub struct PandocRenderer {
    program: PathBuf,
    template: Option<PathBuf>,
    before_template: Option<PathBuf>,
    after_template: Option<PathBuf>,
    self_contained: bool,
    timeout: Duration,
}

impl PandocRenderer {
    pub fn new(
        program: PathBuf,
        template: Option<PathBuf>,
        self_contained: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            program,
            template,
            before_template: None,
            after_template: None,
            self_contained,
            timeout,
        }
    }

    /// Surround every document with the given HTML fragments before rendering.
    pub fn with_page_fragments(mut self, before: Option<PathBuf>, after: Option<PathBuf>) -> Self {
        self.before_template = before;
        self.after_template = after;
        self
    }

    pub fn self_contained(&self) -> bool {
        self.self_contained
    }

    /// Render `source` into `<html_dir>/<basename>.html`.
    ///
    /// Runs inside `html_dir` so the relative `stylesheets` resolve; media
    /// referenced by the document is either embedded or extracted next to it.
    pub async fn render(
        &self,
        source: &Path,
        html_dir: &Path,
        basename: &str,
        stylesheets: &[String],
    ) -> Result<PathBuf, ToolError> {
        let output = output_path(html_dir, basename, "html");
        ensure_parent(TOOL, &output).await?;
        let wrapped = self.wrap_source(source, html_dir, basename).await?;

        let mut invocation = ToolInvocation::new(TOOL, &self.program, self.timeout);
        invocation
            .arg(wrapped.as_deref().unwrap_or(source))
            .arg("--from")
            .arg("gfm")
            .arg("--to")
            .arg("html5")
            .arg("--toc")
            .arg("--toc-depth=3")
            .arg("--standalone");

        if let Some(template) = self.template.as_ref() {
            invocation.arg(format!("--template={}", template.display()));
        }

        invocation.arg("--output").arg(&output);

        if let Some(resources) = source.parent() {
            invocation.arg("--resource-path").arg(resources);
        }

        if self.self_contained {
            invocation.arg("--embed-resources");
        } else {
            invocation.arg("--extract-media").arg(html_dir);
        }

        for stylesheet in stylesheets {
            invocation.arg("--css").arg(stylesheet);
        }

        invocation
            .current_dir(html_dir)
            .env("LANG", LOCALE)
            .env("LC_ALL", LOCALE);
        invocation.run().await?;

        Ok(output)
    }

    /// Write `<before>` + `<div id="maincontent">` + document + `</div>` + `<after>`
    /// next to the html directory. `None` when no fragment is configured.
    async fn wrap_source(
        &self,
        source: &Path,
        html_dir: &Path,
        basename: &str,
    ) -> Result<Option<PathBuf>, ToolError> {
        if self.before_template.is_none() && self.after_template.is_none() {
            return Ok(None);
        }

        let before = read_fragment(self.before_template.as_deref()).await?;
        let after = read_fragment(self.after_template.as_deref()).await?;
        let content = fs::read_to_string(source)
            .await
            .map_err(ToolError::io(TOOL))?;

        let scratch = html_dir.parent().unwrap_or(html_dir).join(WRAPPED_DIR);
        let path = output_path(&scratch, basename, "md");
        ensure_parent(TOOL, &path).await?;
        fs::write(
            &path,
            format!("{before}\n\n<div id=\"maincontent\">\n\n{content}\n\n</div>\n\n{after}"),
        )
        .await
        .map_err(ToolError::io(TOOL))?;
        Ok(Some(path))
    }
}

async fn read_fragment(path: Option<&Path>) -> Result<String, ToolError> {
    match path {
        Some(path) => fs::read_to_string(path).await.map_err(ToolError::io(TOOL)),
        None => Ok(String::new()),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::infra::render::test_support::{ARGS_SCRIPT, FAILING_SCRIPT, fake_tool};
    use tempfile::TempDir;

    #[tokio::test]
    async fn passes_conversion_flags_and_stylesheets() {
        let dir = TempDir::new().expect("temp dir");
        let args_path = dir.path().join("args.log");
        let program = fake_tool(dir.path(), "fake-pandoc", &ARGS_SCRIPT.replace("{args}", &args_path.display().to_string()));

        let source = dir.path().join("job/notes/chapter1.md");
        std::fs::create_dir_all(source.parent().unwrap()).expect("source dir");
        std::fs::write(&source, "# Title").expect("write md");
        let html_dir = dir.path().join("out/html");

        let renderer = PandocRenderer::new(program, None, false, Duration::from_secs(10));
        let output = renderer
            .render(&source, &html_dir, "chapter1", &["css/base.css".to_string()])
            .await
            .expect("render");

        assert_eq!(output, html_dir.join("chapter1.html"));
        let args = std::fs::read_to_string(&args_path).expect("args");
        assert!(args.contains("--from gfm --to html5 --toc --toc-depth=3 --standalone"), "{args}");
        assert!(args.contains("--extract-media"), "{args}");
        assert!(args.contains("--css css/base.css"), "{args}");
        assert!(!args.contains("--embed-resources"), "{args}");
    }

    #[tokio::test]
    async fn self_contained_mode_embeds_resources() {
        let dir = TempDir::new().expect("temp dir");
        let args_path = dir.path().join("args.log");
        let program = fake_tool(dir.path(), "fake-pandoc", &ARGS_SCRIPT.replace("{args}", &args_path.display().to_string()));
        let source = dir.path().join("a.md");
        std::fs::write(&source, "text").expect("write md");

        let renderer = PandocRenderer::new(program, None, true, Duration::from_secs(10));
        renderer
            .render(&source, &dir.path().join("html"), "a", &[])
            .await
            .expect("render");

        let args = std::fs::read_to_string(&args_path).expect("args");
        assert!(args.contains("--embed-resources"), "{args}");
        assert!(!args.contains("--extract-media"), "{args}");
    }

    #[tokio::test]
    async fn page_fragments_wrap_the_document() {
        let dir = TempDir::new().expect("temp dir");
        let args_path = dir.path().join("args.log");
        let program = fake_tool(dir.path(), "fake-pandoc", &ARGS_SCRIPT.replace("{args}", &args_path.display().to_string()));
        let source = dir.path().join("job/guide.md");
        std::fs::create_dir_all(source.parent().unwrap()).expect("source dir");
        std::fs::write(&source, "# Guide").expect("write md");
        let before = dir.path().join("before.html");
        let after = dir.path().join("after.html");
        std::fs::write(&before, "<header>top</header>").expect("before");
        std::fs::write(&after, "<footer>end</footer>").expect("after");
        let html_dir = dir.path().join("out/html");

        let renderer = PandocRenderer::new(program, None, false, Duration::from_secs(10))
            .with_page_fragments(Some(before), Some(after));
        renderer
            .render(&source, &html_dir, "guide", &[])
            .await
            .expect("render");

        let wrapped = dir.path().join("out/wrapped/guide.md");
        let args = std::fs::read_to_string(&args_path).expect("args");
        assert!(args.starts_with(&wrapped.display().to_string()), "{args}");
        assert!(args.contains(&format!("--resource-path {}", dir.path().join("job").display())), "{args}");
        assert_eq!(
            std::fs::read_to_string(&wrapped).expect("wrapped"),
            "<header>top</header>\n\n<div id=\"maincontent\">\n\n# Guide\n\n</div>\n\n<footer>end</footer>"
        );
    }

    #[tokio::test]
    async fn missing_fragment_is_an_io_error() {
        let dir = TempDir::new().expect("temp dir");
        let program = fake_tool(dir.path(), "fake-pandoc", "#!/bin/sh\nexit 0\n");
        let source = dir.path().join("a.md");
        std::fs::write(&source, "text").expect("write md");

        let renderer = PandocRenderer::new(program, None, false, Duration::from_secs(10))
            .with_page_fragments(Some(dir.path().join("no-such.html")), None);
        let err = renderer
            .render(&source, &dir.path().join("out/html"), "a", &[])
            .await
            .expect_err("fragment is missing");
        assert!(matches!(err, ToolError::Io { tool: "pandoc", .. }));
    }

    #[tokio::test]
    async fn captures_stderr_on_failure() {
        let dir = TempDir::new().expect("temp dir");
        let program = fake_tool(dir.path(), "fake-pandoc", FAILING_SCRIPT);
        let source = dir.path().join("a.md");
        std::fs::write(&source, "text").expect("write md");

        let renderer = PandocRenderer::new(program, None, false, Duration::from_secs(10));
        let err = renderer
            .render(&source, &dir.path().join("html"), "a", &[])
            .await
            .expect_err("pandoc should fail");

        match &err {
            ToolError::Failed { exit_code, stderr, .. } => {
                assert_eq!(*exit_code, Some(42));
                assert!(stderr.contains("boom"), "stderr did not propagate: {stderr}");
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
        assert!(err.to_string().starts_with("pandoc failed: boom"));
    }

    #[tokio::test]
    async fn missing_executable_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("a.md");
        std::fs::write(&source, "text").expect("write md");

        let renderer = PandocRenderer::new(
            dir.path().join("no-such-pandoc"),
            None,
            false,
            Duration::from_secs(10),
        );
        let err = renderer
            .render(&source, &dir.path().join("html"), "a", &[])
            .await
            .expect_err("spawn should fail");
        assert!(matches!(err, ToolError::NotFound { tool: "pandoc", .. }));
    }
}
