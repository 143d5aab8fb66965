use axum::Json;
use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use metrics::counter;
use tokio_util::io::ReaderStream;
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::jobs::{BatchMode, IntakeError, ResolveError, UploadedFile};
use crate::application::stream::job_update_response;
use crate::domain::jobs::JobId;
use crate::domain::paths::is_accepted_upload;
use crate::infra::telemetry::METRIC_UPLOADS_REJECTED;
use crate::infra::uploads::UploadStorageError;

use super::error::{ApiError, codes};
use super::models::*;
use super::state::ApiState;

const SOURCE: &str = "mdpress::http::api";
const FILES_FIELD: &str = "files";

pub async fn upload_folder(
    State(state): State<ApiState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    accept_upload(&state, BatchMode::Folder, multipart).await
}

pub async fn upload_multiple(
    State(state): State<ApiState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    accept_upload(&state, BatchMode::Multiple, multipart).await
}

async fn accept_upload(
    state: &ApiState,
    mode: BatchMode,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut files = Vec::new();
    if let Err(err) = read_files(state, &mut multipart, &mut files).await {
        discard(state, &files).await;
        counter!(METRIC_UPLOADS_REJECTED).increment(1);
        return Err(err);
    }

    let count = files.len();
    let job_id = state
        .jobs
        .accept(Uuid::new_v4(), mode, files)
        .await
        .map_err(|err| {
            if err.is_validation() {
                counter!(METRIC_UPLOADS_REJECTED).increment(1);
            }
            intake_to_api(err)
        })?;

    Ok(Json(UploadResponse {
        success: true,
        job_id,
        message: format!("{count} files uploaded, conversion started"),
    }))
}

/// Stage every `files` part, enforcing the type filter and the per-upload limits.
async fn read_files(
    state: &ApiState,
    multipart: &mut Multipart,
    files: &mut Vec<UploadedFile>,
) -> Result<(), ApiError> {
    let max_files = state.limits.max_files.get();
    let max_file_bytes = state.limits.max_file_bytes.get();

    while let Some(field) = multipart.next_field().await.map_err(multipart_to_api)? {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }

        let client_path = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request("file part without a file name", None))?;
        let content_type = field.content_type().map(str::to_string);

        if !is_accepted_upload(&client_path, content_type.as_deref()) {
            return Err(intake_to_api(IntakeError::UnsupportedFile { path: client_path }));
        }
        if files.len() >= max_files as usize {
            return Err(intake_to_api(IntakeError::TooManyFiles { limit: max_files }));
        }

        let stream = field.map(|chunk| chunk.map_err(UploadStorageError::stream));
        let staged = match state.jobs.uploads().store_stream(stream, max_file_bytes).await {
            Ok(staged) => staged,
            Err(UploadStorageError::FileTooLarge { limit }) => {
                return Err(intake_to_api(IntakeError::FileTooLarge {
                    path: client_path,
                    limit,
                }));
            }
            Err(UploadStorageError::PayloadStream { source }) => {
                return Err(match source.downcast_ref::<MultipartError>() {
                    Some(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                        payload_too_large(err.to_string())
                    }
                    _ => ApiError::bad_request("failed to read upload", Some(source.to_string())),
                });
            }
            Err(UploadStorageError::Io(err)) => {
                error!(target = SOURCE, error = %err, "Failed to stage upload part");
                return Err(ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    codes::UPLOAD,
                    "Could not store uploaded file",
                    None,
                ));
            }
        };

        files.push(UploadedFile {
            client_path,
            content_type,
            staged_path: staged.path,
        });
    }

    Ok(())
}

async fn discard(state: &ApiState, files: &[UploadedFile]) {
    for file in files {
        if let Err(err) = state.jobs.uploads().delete(&file.staged_path).await {
            warn!(
                target = SOURCE,
                path = %file.staged_path.display(),
                error = %err,
                "Failed to remove staged upload"
            );
        }
    }
}

pub async fn list_files(State(state): State<ApiState>) -> impl IntoResponse {
    Json(JobListResponse {
        jobs: state.jobs.list(),
    })
}

pub async fn get_file(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_job_id(&job_id)?;
    let job = state
        .jobs
        .get(id)
        .map_err(|_| ApiError::not_found("Job not found"))?;
    Ok(Json(JobResponse { job }))
}

pub async fn delete_file(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_job_id(&job_id)?;
    if !state.jobs.delete(id).await {
        return Err(ApiError::not_found("Job not found"));
    }
    Ok(Json(DeleteResponse {
        message: "Job deleted",
        job_id: id,
    }))
}

pub async fn download(
    State(state): State<ApiState>,
    Path((job_id, index, kind)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let id = parse_job_id(&job_id)?;
    let index: usize = index
        .parse()
        .map_err(|_| ApiError::not_found("File not found"))?;

    let (artifact, file, length) = state
        .jobs
        .open_artifact(id, index, &kind)
        .await
        .map_err(resolve_to_api)?;

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(artifact.kind.content_type()),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&artifact.filename)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

pub async fn events(State(state): State<ApiState>) -> Response {
    job_update_response(state.jobs.subscribe())
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found("Job not found"))
}

/// `attachment` header with an ASCII fallback name and the exact UTF-8 name.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|ch| {
            if ch == ' ' || (ch.is_ascii_graphic() && ch != '"' && ch != '\\') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

fn payload_too_large(detail: String) -> ApiError {
    ApiError::new(
        StatusCode::PAYLOAD_TOO_LARGE,
        codes::PAYLOAD_TOO_LARGE,
        "Upload exceeds the size limit",
        Some(detail),
    )
}

fn multipart_to_api(err: MultipartError) -> ApiError {
    match err.status() {
        StatusCode::PAYLOAD_TOO_LARGE => payload_too_large(err.to_string()),
        _ => ApiError::bad_request("invalid multipart payload", Some(err.to_string())),
    }
}

fn intake_to_api(err: IntakeError) -> ApiError {
    let hint = Some(err.to_string());
    match err {
        IntakeError::Empty => ApiError::bad_request("No files uploaded", hint),
        IntakeError::NoDocument | IntakeError::MultipleDocuments { .. } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Upload must contain the allowed number of markdown files",
            hint,
        ),
        IntakeError::InvalidPath { .. } | IntakeError::UnsupportedFile { .. } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Upload contains an unusable file",
            hint,
        ),
        IntakeError::TooManyFiles { .. } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Too many files in upload",
            hint,
        ),
        IntakeError::FileTooLarge { .. } => ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            codes::PAYLOAD_TOO_LARGE,
            "Uploaded file is too large",
            hint,
        ),
        IntakeError::Io(_) | IntakeError::Registry(_) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::UPLOAD,
            "Could not store uploaded files",
            hint,
        ),
    }
}

fn resolve_to_api(err: ResolveError) -> ApiError {
    match err {
        ResolveError::JobNotFound => ApiError::not_found("Job not found"),
        ResolveError::IndexNotFound { .. } => ApiError::not_found("File not found"),
        ResolveError::UnknownKind { .. } | ResolveError::KindNotAvailable { .. } => {
            ApiError::not_found("File type not found")
        }
        ResolveError::Missing(err) | ResolveError::Open(err) => ApiError::new(
            StatusCode::NOT_FOUND,
            codes::ARTIFACT,
            "File could not be opened",
            Some(err.to_string()),
        ),
    }
}
