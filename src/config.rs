//! Configuration types, read from the environment at startup.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL, LlmConfig};

/// Environment variable holding the service credential.
pub const API_KEY_VAR: &str = "DEEPSEEK_API_KEY";

/// How the question list is fetched when a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingMode {
    /// One call for the whole list.
    Whole,
    /// Small first batch; the remainder is fetched during the first answer.
    Deferred,
    /// Small first batch; the remainder is fetched by a spawned task as soon
    /// as the first batch is shown, joined during the first answer.
    Prefetch,
}

impl std::str::FromStr for LoadingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whole" => Ok(Self::Whole),
            "deferred" => Ok(Self::Deferred),
            "prefetch" => Ok(Self::Prefetch),
            other => Err(format!(
                "unknown loading mode '{other}' (expected whole, deferred or prefetch)"
            )),
        }
    }
}

/// Quiz shape.
#[derive(Debug, Clone)]
pub struct QuizConfig {
    /// Total number of scenario questions per run.
    pub question_count: usize,
    /// Size of the first batch in the two-phase modes.
    pub initial_batch: usize,
    pub loading_mode: LoadingMode,
    /// Language the generated questions and report are written in.
    pub language: String,
}

impl QuizConfig {
    /// Whether a run starts with a partial batch and loads the rest later.
    pub fn is_two_phase(&self) -> bool {
        self.loading_mode != LoadingMode::Whole && self.initial_batch < self.question_count
    }

    /// Number of questions requested by the first call.
    pub fn first_batch(&self) -> usize {
        if self.is_two_phase() {
            self.initial_batch
        } else {
            self.question_count
        }
    }
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            question_count: 20,
            initial_batch: 5,
            loading_mode: LoadingMode::Deferred,
            language: "Chinese".to_string(),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub quiz: QuizConfig,
    /// HTTP listen port.
    pub port: u16,
    /// Sessions idle longer than this are dropped by the sweep task.
    pub session_idle_timeout: Duration,
}

impl AppConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(API_KEY_VAR.to_string()))?;

        let base_url = lookup("PERSONA_QUIZ_BASE_URL")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = lookup("PERSONA_QUIZ_MODEL")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let port: u16 = parse_or(&lookup, "PERSONA_QUIZ_PORT", 8080)?;
        let timeout_secs: u64 = parse_or(&lookup, "PERSONA_QUIZ_HTTP_TIMEOUT_SECS", 300)?;
        let idle_secs: u64 = parse_or(&lookup, "PERSONA_QUIZ_SESSION_IDLE_SECS", 3600)?;

        let defaults = QuizConfig::default();
        let question_count: usize =
            parse_or(&lookup, "PERSONA_QUIZ_QUESTION_COUNT", defaults.question_count)?;
        if question_count == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PERSONA_QUIZ_QUESTION_COUNT".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        let initial_batch: usize =
            parse_or(&lookup, "PERSONA_QUIZ_INITIAL_BATCH", defaults.initial_batch)?;
        if initial_batch == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PERSONA_QUIZ_INITIAL_BATCH".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        let loading_mode: LoadingMode =
            parse_or(&lookup, "PERSONA_QUIZ_LOADING_MODE", defaults.loading_mode)?;
        let language = lookup("PERSONA_QUIZ_LANGUAGE")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.language);

        Ok(Self {
            llm: LlmConfig {
                api_key: SecretString::from(api_key),
                base_url,
                model,
                timeout: Duration::from_secs(timeout_secs),
            },
            quiz: QuizConfig {
                question_count,
                initial_batch: initial_batch.min(question_count),
                loading_mode,
                language,
            },
            port,
            session_idle_timeout: Duration::from_secs(idle_secs),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
    }
}
