//! Error types for persona-quiz.

use std::time::Duration;

use crate::quiz::state::Stage;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Quiz error: {0}")]
    Quiz(#[from] QuizError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors. These are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from the text-generation service.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned HTTP {status}: {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Response stream broken: {reason}")]
    StreamBroken { reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by the stage controller.
///
/// None of these change session state: the user can correct the input or
/// repeat the action.
#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    /// Missing form fields, no option chosen, and similar user-correctable input.
    #[error("{0}")]
    Validation(String),

    #[error("Action requires stage {expected}, session is in {actual}")]
    WrongStage { expected: Stage, actual: Stage },

    #[error("Session changed while the request was in flight, reload and try again")]
    Conflict,

    #[error("Service error: {0}")]
    Service(#[from] LlmError),
}

impl QuizError {
    /// Stable machine-readable kind for API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::WrongStage { .. } => "wrong_stage",
            Self::Conflict => "conflict",
            Self::Service(_) => "service",
        }
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
