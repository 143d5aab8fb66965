use std::{
    io::{self, ErrorKind},
    path::Path,
};

use tokio::fs;
use tracing::debug;

pub(crate) const STYLESHEET_SUBDIR: &str = "css";
const BASE_STYLESHEET: &str = "minimal-style.css";

/// Copy the bundled stylesheet directory into `<html_dir>/css`.
///
/// Every regular file is copied so stylesheets can reference fonts or images
/// next to them. Returns the `.css` file names relative to `html_dir`, with
/// `minimal-style.css` first and the rest sorted by name so later sheets win.
/// A missing source directory yields no stylesheets.
pub(crate) async fn install(source_dir: &Path, html_dir: &Path) -> io::Result<Vec<String>> {
    let mut entries = match fs::read_dir(source_dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(
                target = "mdpress::render",
                stylesheet_dir = %source_dir.display(),
                "Stylesheet directory missing; rendering without stylesheets"
            );
            return Ok(Vec::new());
        }
        Err(err) => return Err(err),
    };

    let target_dir = html_dir.join(STYLESHEET_SUBDIR);
    fs::create_dir_all(&target_dir).await?;

    let mut stylesheets = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        fs::copy(entry.path(), target_dir.join(&name)).await?;

        if let Some(name) = name.to_str()
            && name.to_ascii_lowercase().ends_with(".css")
        {
            stylesheets.push(format!("{STYLESHEET_SUBDIR}/{name}"));
        }
    }

    stylesheets.sort_by_key(|path| {
        let base = path.rsplit('/').next() == Some(BASE_STYLESHEET);
        (!base, path.clone())
    });
    Ok(stylesheets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn copies_bundle_and_lists_css_sorted() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("css");
        std::fs::create_dir_all(&source).expect("source dir");
        std::fs::write(source.join("b-code.css"), "pre {}").expect("write");
        std::fs::write(source.join("a-base.css"), "body {}").expect("write");
        std::fs::write(source.join("font.woff2"), [0u8; 4]).expect("write");

        let html_dir = dir.path().join("out/html");
        let sheets = install(&source, &html_dir).await.expect("install");

        assert_eq!(sheets, vec!["css/a-base.css", "css/b-code.css"]);
        assert!(html_dir.join("css/font.woff2").exists());
    }

    #[tokio::test]
    async fn base_stylesheet_comes_first() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("css");
        std::fs::create_dir_all(&source).expect("source dir");
        for name in ["tokyo-night-light.css", "minimal-style.css", "code.css"] {
            std::fs::write(source.join(name), "body {}").expect("write");
        }

        let sheets = install(&source, &dir.path().join("html")).await.expect("install");

        assert_eq!(
            sheets,
            vec!["css/minimal-style.css", "css/code.css", "css/tokyo-night-light.css"]
        );
    }

    #[tokio::test]
    async fn missing_source_dir_means_no_stylesheets() {
        let dir = TempDir::new().expect("temp dir");
        let sheets = install(&dir.path().join("absent"), dir.path())
            .await
            .expect("install");
        assert!(sheets.is_empty());
    }
}
