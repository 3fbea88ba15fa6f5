//! Error types for Interviz

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InterVizError {
    // Request validation errors
    #[error("Missing parameter: {name}")]
    MissingParameter { name: String },

    #[error("Invalid parameter {name}: {reason}")]
    Parameter { name: String, reason: String },

    #[error(
        "Requested point [{x}, {y}] is outside the allowed region \
         (xmin={west}, xmax={east}, ymin={south}, ymax={north})"
    )]
    OutOfBounds {
        x: f64,
        y: f64,
        west: f64,
        east: f64,
        south: f64,
        north: f64,
    },

    // Job errors
    #[error("{step} failed: {detail}")]
    Computation { step: String, detail: String },

    #[error("Job {job_id} did not complete within {seconds}s")]
    Timeout { job_id: String, seconds: u64 },

    // Startup errors
    #[error("Bootstrap failed: {reason}")]
    Bootstrap { reason: String },

    #[error("Invalid raster extent: {reason}")]
    InvalidExtent { reason: String },

    // Configuration errors
    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InterVizError {
    pub fn parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn computation(step: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Computation {
            step: step.into(),
            detail: detail.into(),
        }
    }

    pub fn bootstrap(reason: impl Into<String>) -> Self {
        Self::Bootstrap {
            reason: reason.into(),
        }
    }

    /// Errors caused by the request itself, detected before any dispatch
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingParameter { .. } | Self::Parameter { .. } | Self::OutOfBounds { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, InterVizError>;
