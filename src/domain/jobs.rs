//! Conversion job records and their lifecycle.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Uploaded,
    Processing,
    Processed,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Uploaded => "uploaded",
            JobStatus::Processing => "processing",
            JobStatus::Processed => "processed",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Processed | JobStatus::Error)
    }

    /// Only `uploaded → processing → {processed | error}` is permitted.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Uploaded, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Processed)
                | (JobStatus::Processing, JobStatus::Error)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output files produced for one source document. Paths are relative to the outputs root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    pub basename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
}

impl ArtifactSet {
    pub fn path_for(&self, kind: ArtifactKind) -> Option<&str> {
        match kind {
            ArtifactKind::Html => self.html.as_deref(),
            ArtifactKind::Pdf => self.pdf.as_deref(),
            ArtifactKind::Zip => self.zip.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Html,
    Pdf,
    Zip,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Html => "html",
            ArtifactKind::Pdf => "pdf",
            ArtifactKind::Zip => "zip",
        }
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ArtifactKind::Html => "text/html; charset=utf-8",
            ArtifactKind::Pdf => "application/pdf",
            ArtifactKind::Zip => "application/zip",
        }
    }
}

impl FromStr for ArtifactKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(ArtifactKind::Html),
            "pdf" => Ok(ArtifactKind::Pdf),
            "zip" => Ok(ArtifactKind::Zip),
            _ => Err(DomainError::not_found("artifact kind")),
        }
    }
}

/// One accepted upload batch and its conversion state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub files: Vec<ArtifactSet>,
}

impl Job {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Uploaded,
            created_at: OffsetDateTime::now_utc(),
            completed_at: None,
            progress: None,
            error: None,
            files: Vec::new(),
        }
    }

    pub fn start(&mut self) -> Result<(), DomainError> {
        self.transition(JobStatus::Processing)?;
        self.progress = Some(0.0);
        Ok(())
    }

    /// Raise progress to `value`; lower values are ignored so readers never see it go backwards.
    pub fn advance(&mut self, value: f64) -> Result<(), DomainError> {
        if self.status != JobStatus::Processing {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: JobStatus::Processing,
            });
        }
        let value = value.clamp(0.0, 1.0);
        if self.progress.is_none_or(|current| value > current) {
            self.progress = Some(value);
        }
        Ok(())
    }

    pub fn push_artifacts(&mut self, artifacts: ArtifactSet) -> Result<(), DomainError> {
        if self.status != JobStatus::Processing {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: JobStatus::Processing,
            });
        }
        self.files.push(artifacts);
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), DomainError> {
        self.transition(JobStatus::Processed)?;
        self.progress = Some(1.0);
        self.completed_at = Some(OffsetDateTime::now_utc());
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), DomainError> {
        self.transition(JobStatus::Error)?;
        self.error = Some(message.into());
        self.completed_at = Some(OffsetDateTime::now_utc());
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}
