//! Server-sent event feed of job snapshots.

use std::convert::Infallible;

use async_stream::stream;
use axum::response::{
    IntoResponse, Response,
    sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use metrics::gauge;
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tracing::{debug, warn};

use crate::{
    application::jobs::JOB_UPDATE_EVENT, domain::jobs::Job,
    infra::telemetry::METRIC_EVENT_SUBSCRIBERS,
};

/// Counts a live event stream in the subscriber gauge until dropped.
struct SubscriberGauge;

impl SubscriberGauge {
    fn attach() -> Self {
        gauge!(METRIC_EVENT_SUBSCRIBERS).increment(1.0);
        SubscriberGauge
    }
}

impl Drop for SubscriberGauge {
    fn drop(&mut self) {
        gauge!(METRIC_EVENT_SUBSCRIBERS).decrement(1.0);
    }
}

/// Turn a broadcast subscription into `job-update` events.
///
/// A subscriber that falls behind skips the snapshots it missed; the stream
/// ends when the sender side is dropped. The stream is counted in the
/// subscriber gauge for as long as it exists, polled or not.
pub fn job_update_stream(mut receiver: Receiver<Job>) -> impl Stream<Item = Result<Event, Infallible>> {
    let subscribed = SubscriberGauge::attach();
    stream! {
        let _subscribed = subscribed;
        loop {
            match receiver.recv().await {
                Ok(job) => match Event::default().event(JOB_UPDATE_EVENT).json_data(&job) {
                    Ok(event) => yield Ok(event),
                    Err(err) => warn!(
                        target = "mdpress::events",
                        job_id = %job.id,
                        error = %err,
                        "Failed to encode job snapshot"
                    ),
                },
                Err(RecvError::Lagged(skipped)) => {
                    debug!(target = "mdpress::events", skipped, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

/// SSE response over a job subscription, with keep-alive comments.
pub fn job_update_response(receiver: Receiver<Job>) -> Response {
    Sse::new(job_update_stream(receiver))
        .keep_alive(KeepAlive::default())
        .into_response()
}
