//! Fake conversion tools for pipeline and service tests.

use std::{path::Path, time::Duration};

use crate::infra::render::{
    PandocRenderer, Toolchain, WeasyprintRenderer, ZipArchiver, test_support::fake_tool,
};

/// Writes a stub HTML file to the path following `--output`.
pub(crate) const PANDOC_OK: &str = r#"#!/bin/sh
out=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    --output)
      shift
      out="$1"
      ;;
  esac
  shift
done
echo "<html><body>ok</body></html>" > "$out"
"#;

/// Fails the way pandoc does on unreadable input.
pub(crate) const PANDOC_FAIL: &str = r#"#!/bin/sh
echo "pandoc: chapter1.md: withBinaryFile: does not exist" >&2
exit 1
"#;

/// Succeeds for every document except one whose path ends in `b.md`.
pub(crate) const PANDOC_FAIL_ON_B: &str = r#"#!/bin/sh
case "$1" in
  *b.md)
    echo "pandoc: cannot parse b.md" >&2
    exit 64
    ;;
esac
out=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    --output)
      shift
      out="$1"
      ;;
  esac
  shift
done
echo "<html></html>" > "$out"
"#;

/// Takes long enough for a test to delete the job mid-flight.
pub(crate) const PANDOC_SLOW: &str = r#"#!/bin/sh
sleep 1
out=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    --output)
      shift
      out="$1"
      ;;
  esac
  shift
done
echo "<html></html>" > "$out"
"#;

const WEASYPRINT_OK: &str = "#!/bin/sh\necho \"%PDF-1.7\" > \"$2\"\n";

const ZIP_OK: &str = "#!/bin/sh\necho \"PK\" > \"$4\"\n";

pub(crate) fn toolchain(dir: &Path, pandoc_script: &str, self_contained: bool) -> Toolchain {
    let bin = dir.join("bin");
    std::fs::create_dir_all(&bin).expect("bin dir");
    let timeout = Duration::from_secs(20);

    let css = dir.join("css");
    std::fs::create_dir_all(&css).expect("css dir");
    std::fs::write(css.join("minimal-style.css"), "body { margin: 0 }").expect("css");

    Toolchain::new(
        PandocRenderer::new(
            fake_tool(&bin, "pandoc", pandoc_script),
            None,
            self_contained,
            timeout,
        ),
        WeasyprintRenderer::new(
            fake_tool(&bin, "weasyprint", WEASYPRINT_OK),
            Some("pdf/ua-1".to_string()),
            timeout,
        ),
        ZipArchiver::new(fake_tool(&bin, "zip", ZIP_OK), timeout),
        css,
    )
}
