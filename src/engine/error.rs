use crate::db::StoreError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Every way an engine operation can refuse. Each variant is detected before
/// any write is attempted, except [`EngineError::Store`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("assistant has already applied to this request")]
    AlreadyApplied,

    #[error("request is no longer accepting applications")]
    RequestUnavailable,

    #[error("an assistant profile is required")]
    NotAssistant,

    #[error("not eligible to rate: {0}")]
    NotEligible(String),

    #[error("a rating for this request has already been submitted")]
    DuplicateRating,

    #[error("score must be between 1 and 5, got {0}")]
    InvalidScore(i32),

    #[error("{0}")]
    Validation(String),

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Stable identifier for the presentation layer.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotAuthorized(_) => "not_authorized",
            EngineError::NotFound(_) => "not_found",
            EngineError::InvalidState(_) => "invalid_state",
            EngineError::AlreadyApplied => "already_applied",
            EngineError::RequestUnavailable => "request_unavailable",
            EngineError::NotAssistant => "not_assistant",
            EngineError::NotEligible(_) => "not_eligible",
            EngineError::DuplicateRating => "duplicate_rating",
            EngineError::InvalidScore(_) => "invalid_score",
            EngineError::Validation(_) => "validation",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::Store(_) => "store",
        }
    }

    pub(crate) fn not_authorized(message: impl Into<String>) -> Self {
        EngineError::NotAuthorized(message.into())
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        EngineError::InvalidState(message.into())
    }

    pub(crate) fn not_eligible(message: impl Into<String>) -> Self {
        EngineError::NotEligible(message.into())
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }
}
