//! Error types for diligence scoring
//!
//! Errors are classified by how the caller should treat them:
//! - Validation: bad request, returned immediately with no state mutated
//! - BestEffort: enrichment, ingestion, CRM sync; logged and swallowed
//! - Fatal: the scoring path itself failed; surfaced as a 500-class error

use thiserror::Error;

/// Error types for the scoring and thesis-fit pipelines
#[derive(Debug, Error)]
pub enum DiligenceError {
    // Validation errors
    #[error("Missing diligenceId")]
    MissingDiligenceId,

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Diligence record not found: {0}")]
    RecordNotFound(String),

    // Best-effort errors
    #[error("Enrichment failed: {0}")]
    EnrichmentFailed(String),

    #[error("Document ingestion failed: {0}")]
    IngestionFailed(String),

    #[error("HubSpot error: {0}")]
    HubSpot(String),

    // Fatal errors
    #[error("Scoring failed: {0}")]
    ScoringFailed(String),

    #[error("Failed to parse model output: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    IoError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Validation,
    BestEffort,
    Fatal,
}

impl DiligenceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DiligenceError::MissingDiligenceId
            | DiligenceError::UnknownCategory(_)
            | DiligenceError::Validation(_)
            | DiligenceError::RecordNotFound(_) => ErrorKind::Validation,
            DiligenceError::EnrichmentFailed(_)
            | DiligenceError::IngestionFailed(_)
            | DiligenceError::HubSpot(_) => ErrorKind::BestEffort,
            _ => ErrorKind::Fatal,
        }
    }

    /// Returns true if this error was caused by the request rather than the system
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// HTTP status a route handler should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            DiligenceError::RecordNotFound(_) => 404,
            e if e.is_validation() => 400,
            DiligenceError::HubSpot(_) => 502,
            _ => 500,
        }
    }
}

impl From<std::io::Error> for DiligenceError {
    fn from(err: std::io::Error) -> Self {
        DiligenceError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for DiligenceError {
    fn from(err: serde_json::Error) -> Self {
        DiligenceError::ParseError(err.to_string())
    }
}

/// Serializable error body for route handlers
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub success: bool,
    pub error: String,
    pub error_type: ErrorKind,
}

impl From<&DiligenceError> for ErrorPayload {
    fn from(err: &DiligenceError) -> Self {
        ErrorPayload {
            success: false,
            error: err.to_string(),
            error_type: err.kind(),
        }
    }
}
