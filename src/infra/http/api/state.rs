use std::sync::Arc;

use crate::application::jobs::JobService;
use crate::config::UploadSettings;

#[derive(Clone)]
pub struct ApiState {
    pub jobs: Arc<JobService>,
    pub limits: UploadSettings,
}
