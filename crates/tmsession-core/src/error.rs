use crate::dictionary::DictionaryKind;
use thiserror::Error;

/// Errors raised by a [`Service`](crate::Service) or while building one.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service {service} failed to start: {reason}")]
    StartFailed { service: String, reason: String },

    /// The service deliberately declined to run in this session.
    #[error("Service {service} will not run: {reason}")]
    NotRunnable { service: String, reason: String },

    #[error("Could not build service {service}: {reason}")]
    Build { service: String, reason: String },

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn start_failed(service: impl Into<String>, reason: impl ToString) -> Self {
        Self::StartFailed {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    pub fn build(service: impl Into<String>, reason: impl ToString) -> Self {
        Self::Build {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::StartFailed { .. } => "service_start_failed",
            ServiceError::NotRunnable { .. } => "service_not_runnable",
            ServiceError::Build { .. } => "service_build_failed",
            ServiceError::Other(_) => "service_other",
        }
    }
}

/// A reference-data load failure reported by a [`DictionaryLoader`](crate::DictionaryLoader).
#[derive(Error, Debug)]
#[error("Failed to load {kind} dictionary: {source}")]
pub struct LoadError {
    pub kind: DictionaryKind,
    #[source]
    pub source: anyhow::Error,
}

impl LoadError {
    pub fn new(kind: DictionaryKind, source: impl Into<anyhow::Error>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }
}

/// Error types for process operations
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn process: {0}")]
    SpawnFailed(String),
    #[error("Process not found: {0}")]
    ProcessNotFound(u32),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid session configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Could not read configuration: {0}")]
    Read(#[from] anyhow::Error),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// Configuration errors are never retryable.
    pub fn is_fatal(&self) -> bool {
        true
    }
}
