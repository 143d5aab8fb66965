//! Application services layer: job orchestration and transport-facing helpers.

pub mod error;
pub mod jobs;
pub mod stream;
