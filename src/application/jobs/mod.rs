mod artifacts;
mod intake;
mod notifier;
mod pipeline;
mod registry;
mod service;

#[cfg(all(test, unix))]
mod testing;

pub use artifacts::{ArtifactResolver, ResolveError, ResolvedArtifact};
pub use intake::{BatchMode, BatchPlan, IntakeError, UploadedFile};
pub use notifier::{BroadcastNotifier, JOB_UPDATE_EVENT, JobNotifier};
pub use pipeline::{ConversionPipeline, PipelineError, discover_documents};
pub use registry::JobRegistry;
pub use service::JobService;
