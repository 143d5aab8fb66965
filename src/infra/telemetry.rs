use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

pub const METRIC_JOBS_ACCEPTED: &str = "mdpress_jobs_accepted_total";
pub const METRIC_JOBS_PROCESSED: &str = "mdpress_jobs_processed_total";
pub const METRIC_JOBS_FAILED: &str = "mdpress_jobs_failed_total";
pub const METRIC_UPLOADS_REJECTED: &str = "mdpress_uploads_rejected_total";
pub const METRIC_EVENT_SUBSCRIBERS: &str = "mdpress_event_subscribers";

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_JOBS_ACCEPTED,
            Unit::Count,
            "Total number of upload batches accepted as jobs."
        );
        describe_counter!(
            METRIC_JOBS_PROCESSED,
            Unit::Count,
            "Total number of jobs that converted every document."
        );
        describe_counter!(
            METRIC_JOBS_FAILED,
            Unit::Count,
            "Total number of jobs that ended in the error state."
        );
        describe_counter!(
            METRIC_UPLOADS_REJECTED,
            Unit::Count,
            "Total number of upload batches rejected before a job was created."
        );
        describe_gauge!(
            METRIC_EVENT_SUBSCRIBERS,
            Unit::Count,
            "Current number of connected job-update subscribers."
        );
        describe_histogram!(
            crate::infra::render::METRIC_STAGE_MS,
            Unit::Milliseconds,
            "External conversion stage latency in milliseconds."
        );
    });
}
