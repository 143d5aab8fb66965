#![cfg(unix)]

mod common;

use std::collections::HashSet;

use axum::http::StatusCode;
use common::{app, app_with_broken_pandoc, json_body};
use mdpress::application::stream::job_update_stream;
use metrics_util::debugging::DebuggingRecorder;

#[tokio::test]
async fn job_lifecycle_emits_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let app = app();
    let _events = job_update_stream(app.service.subscribe());

    let body = json_body(
        app.upload(
            "/api/upload/folder",
            &[("book/chapter1.md", "text/markdown", b"# One")],
        )
        .await,
    )
    .await;
    app.wait_for_terminal(body["jobId"].as_str().expect("job id"))
        .await;

    let rejected = app
        .upload(
            "/api/upload/folder",
            &[("book/fig.png", "image/png", b"png")],
        )
        .await;
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);

    let broken = app_with_broken_pandoc();
    let body = json_body(
        broken
            .upload(
                "/api/upload/folder",
                &[("book/chapter1.md", "text/markdown", b"# One")],
            )
            .await,
    )
    .await;
    broken
        .wait_for_terminal(body["jobId"].as_str().expect("job id"))
        .await;

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for expected in [
        "mdpress_jobs_accepted_total",
        "mdpress_jobs_processed_total",
        "mdpress_jobs_failed_total",
        "mdpress_uploads_rejected_total",
        "mdpress_stage_ms",
        "mdpress_event_subscribers",
    ] {
        assert!(names.contains(expected), "missing metric `{expected}`");
    }
}
