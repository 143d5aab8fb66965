pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router,
    routing::{get, post},
};

pub fn build_api_router() -> Router<ApiState> {
    Router::new()
        .route("/api/upload/folder", post(handlers::upload_folder))
        .route("/api/upload/multiple", post(handlers::upload_multiple))
        .route("/api/files", get(handlers::list_files))
        .route(
            "/api/files/{job_id}",
            get(handlers::get_file).delete(handlers::delete_file),
        )
        .route(
            "/api/download/{job_id}/{index}/{kind}",
            get(handlers::download),
        )
        .route("/api/events", get(handlers::events))
}
