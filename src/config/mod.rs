//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{
    CliArgs, Command, ConvertArgs, LoggingOverrides, RenderOverrides, ServeArgs, ServeOverrides,
    WorkspaceOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "mdpress";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_UPLOADS_DIR: &str = "uploads";
const DEFAULT_JOBS_DIR: &str = "jobs";
const DEFAULT_OUTPUTS_DIR: &str = "output";
const DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES: u64 = 512 * 1024 * 1024;
const DEFAULT_UPLOAD_FILE_LIMIT_BYTES: u64 = 100 * 1024 * 1024;
const DEFAULT_UPLOAD_MAX_FILES: u32 = 50;
const DEFAULT_PANDOC_PATH: &str = "pandoc";
const DEFAULT_WEASYPRINT_PATH: &str = "weasyprint";
const DEFAULT_ZIP_PATH: &str = "zip";
const DEFAULT_STYLESHEET_DIR: &str = "css";
const DEFAULT_PDF_VARIANT: &str = "pdf/ua-1";
const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 600;
const DEFAULT_EVENT_CHANNEL_CAPACITY: u32 = 256;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub workspace: WorkspaceSettings,
    pub uploads: UploadSettings,
    pub render: RenderSettings,
    pub events: EventSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct WorkspaceSettings {
    pub uploads_dir: PathBuf,
    pub jobs_dir: PathBuf,
    pub outputs_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub max_request_bytes: NonZeroU64,
    pub max_file_bytes: NonZeroU64,
    pub max_files: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub pandoc_path: PathBuf,
    pub weasyprint_path: PathBuf,
    pub zip_path: PathBuf,
    pub stylesheet_dir: PathBuf,
    pub template_path: Option<PathBuf>,
    /// Fragments placed before and after each document, which is wrapped in `<div id="maincontent">`.
    pub before_template_path: Option<PathBuf>,
    pub after_template_path: Option<PathBuf>,
    pub self_contained: bool,
    pub pdf_variant: Option<String>,
    pub stage_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct EventSettings {
    pub channel_capacity: NonZeroU32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("MDPRESS").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Convert(args)) => raw.apply_convert_overrides(args),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    workspace: RawWorkspaceSettings,
    uploads: RawUploadSettings,
    render: RawRenderSettings,
    events: RawEventSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(limit) = overrides.uploads_max_request_bytes {
            self.uploads.max_request_bytes = Some(limit);
        }
        if let Some(limit) = overrides.uploads_max_file_bytes {
            self.uploads.max_file_bytes = Some(limit);
        }
        if let Some(count) = overrides.uploads_max_files {
            self.uploads.max_files = Some(count);
        }
        if let Some(capacity) = overrides.events_channel_capacity {
            self.events.channel_capacity = Some(capacity);
        }

        self.apply_logging_overrides(&overrides.logging);
        self.apply_workspace_overrides(&overrides.workspace);
        self.apply_render_overrides(&overrides.render);
    }

    fn apply_convert_overrides(&mut self, args: &ConvertArgs) {
        self.apply_logging_overrides(&args.logging);
        self.apply_workspace_overrides(&args.workspace);
        self.apply_render_overrides(&args.render);
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_workspace_overrides(&mut self, overrides: &WorkspaceOverrides) {
        if let Some(dir) = overrides.uploads_dir.as_ref() {
            self.workspace.uploads_dir = Some(dir.clone());
        }
        if let Some(dir) = overrides.jobs_dir.as_ref() {
            self.workspace.jobs_dir = Some(dir.clone());
        }
        if let Some(dir) = overrides.outputs_dir.as_ref() {
            self.workspace.outputs_dir = Some(dir.clone());
        }
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(path) = overrides.pandoc_path.as_ref() {
            self.render.pandoc_path = Some(path.clone());
        }
        if let Some(path) = overrides.weasyprint_path.as_ref() {
            self.render.weasyprint_path = Some(path.clone());
        }
        if let Some(path) = overrides.zip_path.as_ref() {
            self.render.zip_path = Some(path.clone());
        }
        if let Some(dir) = overrides.stylesheet_dir.as_ref() {
            self.render.stylesheet_dir = Some(dir.clone());
        }
        if let Some(path) = overrides.template_path.as_ref() {
            self.render.template_path = Some(path.clone());
        }
        if let Some(path) = overrides.before_template_path.as_ref() {
            self.render.before_template_path = Some(path.clone());
        }
        if let Some(path) = overrides.after_template_path.as_ref() {
            self.render.after_template_path = Some(path.clone());
        }
        if let Some(value) = overrides.self_contained {
            self.render.self_contained = Some(value);
        }
        if let Some(variant) = overrides.pdf_variant.as_ref() {
            self.render.pdf_variant = Some(variant.clone());
        }
        if let Some(seconds) = overrides.stage_timeout_seconds {
            self.render.stage_timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            workspace,
            uploads,
            render,
            events,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            workspace: build_workspace_settings(workspace)?,
            uploads: build_upload_settings(uploads)?,
            render: build_render_settings(render)?,
            events: build_event_settings(events)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr =
        parse_socket_addr(&host, port).map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_workspace_settings(
    workspace: RawWorkspaceSettings,
) -> Result<WorkspaceSettings, LoadError> {
    let uploads_dir = non_empty_path(
        workspace.uploads_dir,
        DEFAULT_UPLOADS_DIR,
        "workspace.uploads_dir",
    )?;
    let jobs_dir = non_empty_path(workspace.jobs_dir, DEFAULT_JOBS_DIR, "workspace.jobs_dir")?;
    let outputs_dir = non_empty_path(
        workspace.outputs_dir,
        DEFAULT_OUTPUTS_DIR,
        "workspace.outputs_dir",
    )?;

    if uploads_dir == jobs_dir || uploads_dir == outputs_dir || jobs_dir == outputs_dir {
        return Err(LoadError::invalid(
            "workspace",
            "uploads, jobs and outputs directories must be distinct",
        ));
    }

    Ok(WorkspaceSettings {
        uploads_dir,
        jobs_dir,
        outputs_dir,
    })
}

fn build_upload_settings(uploads: RawUploadSettings) -> Result<UploadSettings, LoadError> {
    let max_request_bytes_value = uploads
        .max_request_bytes
        .unwrap_or(DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES);
    let max_request_bytes = NonZeroU64::new(max_request_bytes_value).ok_or_else(|| {
        LoadError::invalid("uploads.max_request_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_request_bytes_value).map_err(|_| {
        LoadError::invalid(
            "uploads.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    let max_file_bytes = NonZeroU64::new(
        uploads
            .max_file_bytes
            .unwrap_or(DEFAULT_UPLOAD_FILE_LIMIT_BYTES),
    )
    .ok_or_else(|| LoadError::invalid("uploads.max_file_bytes", "must be greater than zero"))?;

    let max_files = non_zero_u32(
        uploads.max_files.unwrap_or(DEFAULT_UPLOAD_MAX_FILES).into(),
        "uploads.max_files",
    )?;

    Ok(UploadSettings {
        max_request_bytes,
        max_file_bytes,
        max_files,
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let pandoc_path = non_empty_path(
        render.pandoc_path,
        DEFAULT_PANDOC_PATH,
        "render.pandoc_path",
    )?;
    let weasyprint_path = non_empty_path(
        render.weasyprint_path,
        DEFAULT_WEASYPRINT_PATH,
        "render.weasyprint_path",
    )?;
    let zip_path = non_empty_path(render.zip_path, DEFAULT_ZIP_PATH, "render.zip_path")?;
    let stylesheet_dir = non_empty_path(
        render.stylesheet_dir,
        DEFAULT_STYLESHEET_DIR,
        "render.stylesheet_dir",
    )?;
    let template_path = render
        .template_path
        .filter(|path| !path.as_os_str().is_empty());
    let before_template_path = render
        .before_template_path
        .filter(|path| !path.as_os_str().is_empty());
    let after_template_path = render
        .after_template_path
        .filter(|path| !path.as_os_str().is_empty());

    let pdf_variant = match render.pdf_variant {
        Some(value) => {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        None => Some(DEFAULT_PDF_VARIANT.to_string()),
    };

    let timeout_secs = render
        .stage_timeout_seconds
        .unwrap_or(DEFAULT_STAGE_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "render.stage_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(RenderSettings {
        pandoc_path,
        weasyprint_path,
        zip_path,
        stylesheet_dir,
        template_path,
        before_template_path,
        after_template_path,
        self_contained: render.self_contained.unwrap_or(false),
        pdf_variant,
        stage_timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_event_settings(events: RawEventSettings) -> Result<EventSettings, LoadError> {
    let capacity = events
        .channel_capacity
        .unwrap_or(DEFAULT_EVENT_CHANNEL_CAPACITY);
    Ok(EventSettings {
        channel_capacity: non_zero_u32(capacity.into(), "events.channel_capacity")?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWorkspaceSettings {
    uploads_dir: Option<PathBuf>,
    jobs_dir: Option<PathBuf>,
    outputs_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUploadSettings {
    max_request_bytes: Option<u64>,
    max_file_bytes: Option<u64>,
    max_files: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    pandoc_path: Option<PathBuf>,
    weasyprint_path: Option<PathBuf>,
    zip_path: Option<PathBuf>,
    stylesheet_dir: Option<PathBuf>,
    template_path: Option<PathBuf>,
    before_template_path: Option<PathBuf>,
    after_template_path: Option<PathBuf>,
    self_contained: Option<bool>,
    pdf_variant: Option<String>,
    stage_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEventSettings {
    channel_capacity: Option<u32>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_empty_path(
    value: Option<PathBuf>,
    default: &str,
    key: &'static str,
) -> Result<PathBuf, LoadError> {
    let path = value.unwrap_or_else(|| PathBuf::from(default));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid(key, "path must not be empty"));
    }
    Ok(path)
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
