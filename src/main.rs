use std::{
    path::{Path, PathBuf},
    process,
    sync::Arc,
};

use futures::StreamExt;
use mdpress::{
    application::{
        error::AppError,
        jobs::{BatchMode, BroadcastNotifier, IntakeError, JobService, UploadedFile},
    },
    config,
    domain::{jobs::JobStatus, paths::is_accepted_upload},
    infra::{
        error::InfraError,
        http::{self, ApiState},
        render::Toolchain,
        telemetry,
        uploads::UploadStorageError,
        workspace::Workspace,
    },
};
use tokio_util::{io::ReaderStream, sync::CancellationToken};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use uuid::Uuid;
use walkdir::WalkDir;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Convert(args) => run_convert(settings, *args).await,
    }
}

fn build_service(settings: &config::Settings) -> Result<(Arc<JobService>, Workspace), AppError> {
    let workspace = Workspace::new(&settings.workspace).map_err(InfraError::from)?;
    let notifier = Arc::new(BroadcastNotifier::new(
        settings.events.channel_capacity.get() as usize,
    ));
    let service = JobService::new(
        workspace.clone(),
        Toolchain::from_settings(&settings.render),
        notifier,
    );
    Ok((Arc::new(service), workspace))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (service, workspace) = build_service(&settings)?;
    workspace.reset().await;

    let router = http::build_router(ApiState {
        jobs: service,
        limits: settings.uploads.clone(),
    });

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "mdpress listening");

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let grace = settings.server.graceful_shutdown;

    tokio::select! {
        result = async move { server.await } => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = async {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                grace_seconds = grace.as_secs(),
                "Graceful shutdown timed out; dropping open connections"
            );
        }
    }

    info!("mdpress stopped");
    Ok(())
}

async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}

async fn run_convert(settings: config::Settings, args: config::ConvertArgs) -> Result<(), AppError> {
    if !args.input.is_dir() {
        return Err(InfraError::configuration(format!(
            "input `{}` is not a directory",
            args.input.display()
        ))
        .into());
    }

    let (service, workspace) = build_service(&settings)?;
    let files = stage_directory(&service, &args.input, settings.uploads.max_file_bytes.get()).await?;
    let mode = if args.all {
        BatchMode::Multiple
    } else {
        BatchMode::Folder
    };

    let job = service.convert(Uuid::new_v4(), mode, files).await?;
    if job.status != JobStatus::Processed {
        return Err(AppError::Conversion {
            job_id: job.id,
            message: job
                .error
                .unwrap_or_else(|| format!("job ended in `{}`", job.status)),
        });
    }

    for set in &job.files {
        for path in [&set.html, &set.pdf, &set.zip].into_iter().flatten() {
            if let Some(absolute) = workspace.resolve_output(path) {
                info!(
                    job_id = %job.id,
                    document = %set.basename,
                    artifact = %absolute.display(),
                    "Artifact written"
                );
            }
        }
    }
    Ok(())
}

/// Stage every accepted file under `input` as if the folder had been uploaded.
async fn stage_directory(
    service: &JobService,
    input: &Path,
    max_file_bytes: u64,
) -> Result<Vec<UploadedFile>, AppError> {
    let folder = input
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("input")
        .to_string();

    let root = input.to_path_buf();
    let entries = tokio::task::spawn_blocking(move || collect_files(&root))
        .await
        .map_err(|err| AppError::unexpected(format!("folder scan aborted: {err}")))?
        .map_err(|err| AppError::unexpected(format!("failed to scan input folder: {err}")))?;

    let mut files = Vec::new();
    for (path, relative) in entries {
        let client_path = format!("{folder}/{relative}");
        if !is_accepted_upload(&relative, None) {
            warn!(path = %path.display(), "Skipping file with unsupported type");
            continue;
        }

        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|err| AppError::from(InfraError::from(err)))?;
        let stream = ReaderStream::new(file).map(|chunk| chunk.map_err(UploadStorageError::from));
        let staged = service
            .uploads()
            .store_stream(stream, max_file_bytes)
            .await
            .map_err(|err| match err {
                UploadStorageError::FileTooLarge { limit } => AppError::from(IntakeError::FileTooLarge {
                    path: client_path.clone(),
                    limit,
                }),
                UploadStorageError::Io(err) => AppError::from(InfraError::from(err)),
                other => AppError::unexpected(other.to_string()),
            })?;

        files.push(UploadedFile {
            client_path,
            content_type: None,
            staged_path: staged.path,
        });
    }
    Ok(files)
}

/// Regular files under `root` with their `/`-joined relative paths, sorted.
fn collect_files(root: &Path) -> Result<Vec<(PathBuf, String)>, walkdir::Error> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((entry.into_path(), relative));
    }
    Ok(files)
}
