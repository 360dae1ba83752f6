use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

/// Outcome classification for one generation attempt.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("precondition violated: {0}")]
    Precondition(String),
    #[error("reference image fetch failed: {0}")]
    ReferenceFetch(String),
    #[error("image encoding failed: {0}")]
    Encoding(String),
    #[error("generation service unavailable: {0}")]
    Transport(String),
    #[error(transparent)]
    Semantic(#[from] SemanticFailure),
    #[error("unexpected failure: {0}")]
    Unknown(String),
}

/// The service answered but withheld a usable image.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SemanticFailure {
    #[error("request blocked by safety filters ({reason})")]
    SafetyBlocked { reason: String },
    #[error("generation quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("request rejected as invalid: {0}")]
    InvalidInput(String),
    #[error("service returned no image data{}", returned_text(.text))]
    NoImage { text: Option<String> },
}

fn returned_text(text: &Option<String>) -> String {
    text.as_deref().map(|t| format!(" (model said: {t})")).unwrap_or_default()
}

impl GenerationError {
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Precondition(_) => "precondition",
            GenerationError::ReferenceFetch(_) => "reference_fetch",
            GenerationError::Encoding(_) => "encoding",
            GenerationError::Transport(_) => "transport",
            GenerationError::Semantic(SemanticFailure::SafetyBlocked { .. }) => "safety_blocked",
            GenerationError::Semantic(SemanticFailure::QuotaExceeded(_)) => "quota_exceeded",
            GenerationError::Semantic(SemanticFailure::InvalidInput(_)) => "invalid_input",
            GenerationError::Semantic(SemanticFailure::NoImage { .. }) => "no_image",
            GenerationError::Unknown(_) => "unknown",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GenerationError::Precondition(_) | GenerationError::Encoding(_) => StatusCode::BAD_REQUEST,
            GenerationError::ReferenceFetch(_) | GenerationError::Transport(_) => StatusCode::BAD_GATEWAY,
            GenerationError::Semantic(SemanticFailure::SafetyBlocked { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            GenerationError::Semantic(SemanticFailure::QuotaExceeded(_)) => StatusCode::TOO_MANY_REQUESTS,
            GenerationError::Semantic(SemanticFailure::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            GenerationError::Semantic(SemanticFailure::NoImage { .. }) => StatusCode::BAD_GATEWAY,
            GenerationError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("catalog file missing: {0}")]
    Missing(&'static str),
    #[error("duplicate catalog id '{0}'")]
    DuplicateId(String),
}

/// Errors surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("a generation is already in progress for this user")]
    Busy,
    #[error("not found")]
    NotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ApiError::Generation(e) => (e.status_code(), e.kind()),
            ApiError::Busy => (StatusCode::CONFLICT, "busy"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        };
        (status, Json(json!({ "kind": kind, "message": self.to_string() }))).into_response()
    }
}
