use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the mdpress binary.
#[derive(Debug, Parser)]
#[command(
    name = "mdpress",
    version,
    about = "Markdown to HTML, PDF and zip conversion service"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MDPRESS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP conversion service.
    Serve(Box<ServeArgs>),
    /// Convert a local folder once and exit.
    Convert(Box<ConvertArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub workspace: WorkspaceOverrides,

    #[command(flatten)]
    pub render: RenderOverrides,

    /// Convert every markdown document in the folder instead of requiring exactly one.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub all: bool,

    /// Folder holding the markdown document(s) and their media.
    #[arg(value_name = "INPUT_DIR", value_hint = ValueHint::DirPath)]
    pub input: PathBuf,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkspaceOverrides {
    /// Override the directory receiving raw uploads.
    #[arg(long = "workspace-uploads-dir", value_name = "PATH")]
    pub uploads_dir: Option<PathBuf>,

    /// Override the directory holding reconstructed job trees.
    #[arg(long = "workspace-jobs-dir", value_name = "PATH")]
    pub jobs_dir: Option<PathBuf>,

    /// Override the directory receiving generated artifacts.
    #[arg(long = "workspace-outputs-dir", value_name = "PATH")]
    pub outputs_dir: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the pandoc executable path.
    #[arg(long = "render-pandoc-path", value_name = "PATH")]
    pub pandoc_path: Option<PathBuf>,

    /// Override the weasyprint executable path.
    #[arg(long = "render-weasyprint-path", value_name = "PATH")]
    pub weasyprint_path: Option<PathBuf>,

    /// Override the zip executable path.
    #[arg(long = "render-zip-path", value_name = "PATH")]
    pub zip_path: Option<PathBuf>,

    /// Override the directory of stylesheets applied to every document.
    #[arg(long = "render-stylesheet-dir", value_name = "PATH")]
    pub stylesheet_dir: Option<PathBuf>,

    /// Use a custom pandoc HTML template.
    #[arg(long = "render-template-path", value_name = "PATH")]
    pub template_path: Option<PathBuf>,

    /// HTML fragment inserted before every document's content.
    #[arg(long = "render-before-template-path", value_name = "PATH")]
    pub before_template_path: Option<PathBuf>,

    /// HTML fragment appended after every document's content.
    #[arg(long = "render-after-template-path", value_name = "PATH")]
    pub after_template_path: Option<PathBuf>,

    /// Embed media into the HTML instead of extracting it next to the file.
    #[arg(
        long = "render-self-contained",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub self_contained: Option<bool>,

    /// Override the PDF variant passed to weasyprint; an empty value disables it.
    #[arg(long = "render-pdf-variant", value_name = "VARIANT")]
    pub pdf_variant: Option<String>,

    /// Override the per-stage deadline for external tools.
    #[arg(long = "render-stage-timeout-seconds", value_name = "SECONDS")]
    pub stage_timeout_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub workspace: WorkspaceOverrides,

    #[command(flatten)]
    pub render: RenderOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the maximum request size for uploads in bytes.
    #[arg(long = "uploads-max-request-bytes", value_name = "BYTES")]
    pub uploads_max_request_bytes: Option<u64>,

    /// Override the maximum size of a single uploaded file in bytes.
    #[arg(long = "uploads-max-file-bytes", value_name = "BYTES")]
    pub uploads_max_file_bytes: Option<u64>,

    /// Override the maximum number of files in one upload.
    #[arg(long = "uploads-max-files", value_name = "COUNT")]
    pub uploads_max_files: Option<u32>,

    /// Override the job-update broadcast buffer.
    #[arg(long = "events-channel-capacity", value_name = "COUNT")]
    pub events_channel_capacity: Option<u32>,
}
