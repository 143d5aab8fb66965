#![allow(dead_code)]

use std::{
    num::{NonZeroU32, NonZeroU64},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, StatusCode, header},
};
use http_body_util::BodyExt;
use mdpress::{
    application::jobs::{BroadcastNotifier, JobService},
    config::{UploadSettings, WorkspaceSettings},
    domain::jobs::{Job, JobStatus},
    infra::{
        http::{ApiState, build_router},
        render::{PandocRenderer, Toolchain, WeasyprintRenderer, ZipArchiver},
        workspace::Workspace,
    },
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "mdpress-test-boundary";

const PANDOC: &str = r#"#!/bin/sh
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

const PANDOC_BROKEN: &str = "#!/bin/sh\necho \"pandoc: unexpected end of input\" >&2\nexit 2\n";

const WEASYPRINT: &str = "#!/bin/sh\necho \"%PDF-1.7\" > \"$2\"\n";

const ZIP: &str = "#!/bin/sh\necho \"PK\" > \"$4\"\n";

pub struct TestApp {
    pub dir: TempDir,
    pub router: Router,
    pub service: Arc<JobService>,
    pub workspace: Workspace,
}

fn fake_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, script).expect("write fake tool");
    let mut permissions = std::fs::metadata(&path).expect("metadata").permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).expect("chmod");
    path
}

pub fn app() -> TestApp {
    app_with(PANDOC, 50)
}

pub fn app_with_broken_pandoc() -> TestApp {
    app_with(PANDOC_BROKEN, 50)
}

pub fn app_with_max_files(max_files: u32) -> TestApp {
    app_with(PANDOC, max_files)
}

fn app_with(pandoc_script: &str, max_files: u32) -> TestApp {
    let dir = TempDir::new().expect("temp dir");
    let bin = dir.path().join("bin");
    let css = dir.path().join("css");
    std::fs::create_dir_all(&bin).expect("bin");
    std::fs::create_dir_all(&css).expect("css");
    std::fs::write(css.join("minimal-style.css"), "body { margin: 0 }").expect("stylesheet");

    let timeout = Duration::from_secs(20);
    let tools = Toolchain::new(
        PandocRenderer::new(fake_tool(&bin, "pandoc", pandoc_script), None, false, timeout),
        WeasyprintRenderer::new(fake_tool(&bin, "weasyprint", WEASYPRINT), None, timeout),
        ZipArchiver::new(fake_tool(&bin, "zip", ZIP), timeout),
        css,
    );

    let workspace = Workspace::new(&WorkspaceSettings {
        uploads_dir: dir.path().join("uploads"),
        jobs_dir: dir.path().join("jobs"),
        outputs_dir: dir.path().join("output"),
    })
    .expect("workspace");

    let service = Arc::new(JobService::new(
        workspace.clone(),
        tools,
        Arc::new(BroadcastNotifier::new(64)),
    ));
    let router = build_router(ApiState {
        jobs: service.clone(),
        limits: UploadSettings {
            max_request_bytes: NonZeroU64::new(16 * 1024 * 1024).expect("non-zero"),
            max_file_bytes: NonZeroU64::new(1024 * 1024).expect("non-zero"),
            max_files: NonZeroU32::new(max_files).expect("non-zero"),
        },
    });

    TestApp {
        dir,
        router,
        service,
        workspace,
    }
}

/// A part of a multipart body: `(client path, content type, contents)`.
pub type Part<'a> = (&'a str, &'a str, &'a [u8]);

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (filename, content_type, contents) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(contents);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("request should build");
        self.send(request).await
    }

    pub async fn delete(&self, uri: &str) -> Response<Body> {
        let request = Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .body(Body::empty())
            .expect("request should build");
        self.send(request).await
    }

    pub async fn upload(&self, route: &str, parts: &[Part<'_>]) -> Response<Body> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(route)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .expect("request should build");
        self.send(request).await
    }

    /// Poll the job endpoint until the job reaches a terminal status.
    pub async fn wait_for_terminal(&self, job_id: &str) -> Job {
        for _ in 0..200 {
            let response = self.get(&format!("/api/files/{job_id}")).await;
            assert_eq!(response.status(), StatusCode::OK);
            let body = json_body(response).await;
            let job: Job = serde_json::from_value(body["job"].clone()).expect("job json");
            if matches!(job.status, JobStatus::Processed | JobStatus::Error) {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("job {job_id} never finished");
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes()
        .to_vec()
}

pub async fn json_body(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}
