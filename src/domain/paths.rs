//! Client-supplied path normalization and upload classification.

use std::path::{Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

const MARKDOWN_EXTENSION: &str = "md";
const MARKDOWN_MIME: &str = "text/markdown";
const ACCEPTED_MEDIA_PREFIXES: [&str; 3] = ["image/", "video/", "audio/"];
const ACCEPTED_EXTENSIONS: [&str; 10] = [
    "png", "jpg", "jpeg", "gif", "svg", "webp", "pdf", "doc", "docx", "txt",
];

/// Strip embedded NUL characters and normalize to Unicode NFC.
pub fn sanitize_filename(name: &str) -> String {
    name.chars().filter(|ch| *ch != '\0').nfc().collect()
}

/// Map a client-relative upload path onto a job-root-relative path.
///
/// The path is percent-decoded and split on both separator styles. When more
/// than one segment remains, the first one (the client's selected folder) is
/// dropped. Empty, `.` and `..` segments never reach the filesystem. Returns
/// `None` when nothing usable is left.
pub fn normalize_relative_path(raw: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(raw)
        .map(|value| value.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    let sanitized = sanitize_filename(&decoded);

    let mut segments: Vec<&str> = sanitized
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect();

    if segments.len() > 1 {
        segments.remove(0);
    }

    if segments.is_empty() {
        return None;
    }

    Some(segments.iter().collect())
}

/// A file is a markdown document when its name ends in `.md` or it declares `text/markdown`.
pub fn is_markdown(name: &str, content_type: Option<&str>) -> bool {
    has_extension(name, MARKDOWN_EXTENSION) || content_type.is_some_and(is_markdown_mime)
}

/// Whether an upload part is allowed into a batch at all.
pub fn is_accepted_upload(name: &str, content_type: Option<&str>) -> bool {
    if is_markdown(name, content_type) {
        return true;
    }

    let declared = content_type
        .filter(|value| !value.is_empty() && *value != "application/octet-stream")
        .map(str::to_ascii_lowercase)
        .or_else(|| {
            mime_guess::from_path(name)
                .first()
                .map(|mime| mime.essence_str().to_string())
        });

    if let Some(mime) = declared.as_deref()
        && ACCEPTED_MEDIA_PREFIXES
            .iter()
            .any(|prefix| mime.starts_with(prefix))
    {
        return true;
    }

    ACCEPTED_EXTENSIONS
        .iter()
        .any(|extension| has_extension(name, extension))
}

/// Display basename of a source document: its sanitized file stem.
pub fn document_basename(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("document");
    sanitize_filename(stem)
}

fn has_extension(name: &str, extension: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|value| value.to_str())
        .is_some_and(|value| value.eq_ignore_ascii_case(extension))
}

fn is_markdown_mime(value: &str) -> bool {
    value
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(MARKDOWN_MIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_selected_folder_segment() {
        assert_eq!(
            normalize_relative_path("project/notes/chapter1.md"),
            Some(PathBuf::from("notes/chapter1.md"))
        );
        assert_eq!(
            normalize_relative_path("project/images/fig1.png"),
            Some(PathBuf::from("images/fig1.png"))
        );
    }

    #[test]
    fn keeps_single_segment_paths() {
        assert_eq!(
            normalize_relative_path("chapter1.md"),
            Some(PathBuf::from("chapter1.md"))
        );
    }

    #[test]
    fn decodes_percent_encoding_and_backslashes() {
        assert_eq!(
            normalize_relative_path("my%20book%2Fch%C3%A4pter.md"),
            Some(PathBuf::from("chäpter.md"))
        );
        assert_eq!(
            normalize_relative_path("book\\img\\a.png"),
            Some(PathBuf::from("img/a.png"))
        );
    }

    #[test]
    fn never_escapes_job_root() {
        assert_eq!(
            normalize_relative_path("book/../../etc/passwd"),
            Some(PathBuf::from("etc/passwd"))
        );
        assert_eq!(normalize_relative_path("../.."), None);
        assert_eq!(normalize_relative_path(""), None);
    }

    #[test]
    fn sanitizes_nul_and_composes_unicode() {
        let decomposed = "cafe\u{301}\0.md";
        assert_eq!(sanitize_filename(decomposed), "caf\u{e9}.md");
    }

    #[test]
    fn classifies_markdown_by_extension_or_mime() {
        assert!(is_markdown("README.MD", None));
        assert!(is_markdown("notes", Some("text/markdown; charset=utf-8")));
        assert!(!is_markdown("fig.png", Some("image/png")));
    }

    #[test]
    fn upload_filter_accepts_media_and_known_extensions() {
        assert!(is_accepted_upload("fig.png", Some("image/png")));
        assert!(is_accepted_upload("clip.mp4", None));
        assert!(is_accepted_upload("notes.TXT", Some("application/octet-stream")));
        assert!(!is_accepted_upload("script.sh", Some("application/x-sh")));
        assert!(!is_accepted_upload("binary.exe", None));
    }

    #[test]
    fn basename_strips_extension() {
        assert_eq!(document_basename(Path::new("notes/chapter1.md")), "chapter1");
    }
}
